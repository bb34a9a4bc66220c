//! Incremental diff of search results against the persisted set of seen identifiers.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::arxiv::types::Paper;

/// Earliest update time eligible for this run.
///
/// An explicit `lookback_days` wins; otherwise the last run's time minus the grace period.
/// A negative lookback puts the cutoff in the future. `None` when the result is not a
/// representable time.
pub fn resolve_cutoff(
    now: DateTime<Utc>,
    last_query_time: DateTime<Utc>,
    grace_days: u32,
    lookback_days: Option<i64>,
) -> Option<DateTime<Utc>> {
    let (anchor, days) = match lookback_days {
        Some(days) => (now, days),
        None => (last_query_time, i64::from(grace_days)),
    };
    anchor.checked_sub_signed(Duration::try_days(days)?)
}

/// Strip the version suffix from a full identifier.
///
/// The suffix is always taken to be the final two characters (`v1`..`v9`); identifiers
/// with a two-digit version are truncated the same way.
pub fn base_id(full_id: &str) -> &str {
    match full_id.char_indices().rev().nth(1) {
        Some((idx, _)) => &full_id[..idx],
        None => "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    New,
    Updated,
    Known,
}

/// Papers found by one run, each list in the order the API returned them.
#[derive(Debug, Default)]
pub struct Classified {
    pub new: Vec<Paper>,
    pub updated: Vec<Paper>,
    /// The persisted id list with this run's finds appended.
    pub found_ids: Vec<String>,
}

/// Step-wise classifier fed with results in descending update order.
///
/// The base-id set is a snapshot of the ids known before the run, so two versions of an
/// unseen paper in the same result set are both reported as new. The full-id set is
/// live, so a repeated result is recorded only once.
pub struct Classifier {
    cutoff: DateTime<Utc>,
    known_bases: HashSet<String>,
    known_ids: HashSet<String>,
    out: Classified,
}

impl Classifier {
    pub fn new(cutoff: DateTime<Utc>, found_ids: Vec<String>) -> Self {
        let known_bases = found_ids.iter().map(|id| base_id(id).to_string()).collect();
        let known_ids = found_ids.iter().cloned().collect();
        Self {
            cutoff,
            known_bases,
            known_ids,
            out: Classified {
                found_ids,
                ..Classified::default()
            },
        }
    }

    /// Classify one result. Returns `Stop` at the first paper updated before the cutoff;
    /// that paper is not recorded and nothing after it should be fed.
    pub fn observe(&mut self, paper: Paper) -> Step {
        if paper.updated < self.cutoff {
            return Step::Stop;
        }
        match self.verdict(&paper.entry_id) {
            Verdict::New => {
                self.record(&paper.entry_id);
                self.out.new.push(paper);
            }
            Verdict::Updated => {
                self.record(&paper.entry_id);
                self.out.updated.push(paper);
            }
            Verdict::Known => {}
        }
        Step::Continue
    }

    fn verdict(&self, entry_id: &str) -> Verdict {
        if self.known_ids.contains(entry_id) {
            Verdict::Known
        } else if !self.known_bases.contains(base_id(entry_id)) {
            Verdict::New
        } else {
            Verdict::Updated
        }
    }

    fn record(&mut self, entry_id: &str) {
        self.known_ids.insert(entry_id.to_string());
        self.out.found_ids.push(entry_id.to_string());
    }

    pub fn finish(self) -> Classified {
        self.out
    }
}

#[cfg(test)]
pub(crate) fn paper(entry_id: &str, updated: DateTime<Utc>) -> Paper {
    Paper {
        entry_id: entry_id.to_string(),
        title: format!("Title of {entry_id}"),
        authors: vec!["Ada Lovelace".into(), "Alan Turing".into()],
        summary: format!("Abstract of {entry_id}."),
        published: updated - Duration::days(30),
        updated,
        link: format!("http://arxiv.org/abs/{entry_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::parse_query_time;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    /// Classify an in-memory result sequence, stopping at the cutoff.
    fn classify(
        results: impl IntoIterator<Item = Paper>,
        cutoff: DateTime<Utc>,
        found_ids: Vec<String>,
    ) -> Classified {
        let mut classifier = Classifier::new(cutoff, found_ids);
        for paper in results {
            if classifier.observe(paper) == Step::Stop {
                break;
            }
        }
        classifier.finish()
    }

    fn ids(papers: &[Paper]) -> Vec<&str> {
        papers.iter().map(|p| p.entry_id.as_str()).collect()
    }

    #[test]
    fn base_id_drops_two_chars() {
        assert_eq!(base_id("abc123v1"), "abc123");
        assert_eq!(base_id("http://arxiv.org/abs/2401.00001v2"), "http://arxiv.org/abs/2401.00001");
        assert_eq!(base_id("2401.00001v12"), "2401.00001v");
        assert_eq!(base_id("v"), "");
        assert_eq!(base_id(""), "");
    }

    #[test]
    fn cutoff_from_last_query_minus_grace() {
        let last = at(2024, 1, 1, 0);
        let cutoff = resolve_cutoff(at(2024, 6, 1, 0), last, 2, None);
        assert_eq!(cutoff, Some(at(2023, 12, 30, 0)));
    }

    #[test]
    fn cutoff_from_explicit_lookback_ignores_state() {
        let now = at(2024, 6, 10, 12);
        let cutoff = resolve_cutoff(now, at(2020, 1, 1, 0), 2, Some(7));
        assert_eq!(cutoff, Some(at(2024, 6, 3, 12)));
    }

    #[test]
    fn cutoff_with_negative_lookback_is_in_the_future() {
        let now = at(2024, 6, 10, 12);
        assert_eq!(resolve_cutoff(now, now, 2, Some(-1)), Some(at(2024, 6, 11, 12)));
    }

    #[test]
    fn cutoff_out_of_range_is_none() {
        let now = at(2024, 6, 10, 12);
        assert_eq!(resolve_cutoff(now, now, 2, Some(i64::from(u32::MAX))), None);
        assert_eq!(resolve_cutoff(now, now, 2, Some(i64::MIN)), None);
        assert_eq!(resolve_cutoff(now, now, u32::MAX, None), None);
    }

    #[test]
    fn updated_version_then_stop_scenario() {
        let last = parse_query_time("01-01-24 00:00:00 +0000").unwrap();
        let cutoff = resolve_cutoff(at(2024, 1, 2, 0), last, 2, None).unwrap();
        let results = vec![
            paper("abc123v2", at(2024, 1, 1, 12)),
            paper("xyz789v1", at(2023, 12, 20, 0)),
        ];

        let out = classify(results, cutoff, vec!["abc123v1".into()]);
        assert!(out.new.is_empty());
        assert_eq!(ids(&out.updated), vec!["abc123v2"]);
        assert_eq!(out.found_ids, vec!["abc123v1", "abc123v2"]);
    }

    #[test]
    fn unseen_paper_is_new_and_recorded() {
        let out = classify(
            vec![paper("new001v1", at(2024, 1, 5, 0))],
            at(2024, 1, 1, 0),
            vec![],
        );
        assert_eq!(ids(&out.new), vec!["new001v1"]);
        assert!(out.updated.is_empty());
        assert_eq!(out.found_ids, vec!["new001v1"]);
    }

    #[test]
    fn known_full_id_is_skipped_and_not_readded() {
        let out = classify(
            vec![paper("abc123v1", at(2024, 1, 5, 0))],
            at(2024, 1, 1, 0),
            vec!["abc123v1".into()],
        );
        assert!(out.new.is_empty());
        assert!(out.updated.is_empty());
        assert_eq!(out.found_ids, vec!["abc123v1"]);
    }

    #[test]
    fn stops_at_first_old_entry_regardless_of_later_content() {
        let observed = std::cell::Cell::new(0);
        let results = [
            paper("a00001v1", at(2024, 1, 5, 0)),
            paper("b00001v1", at(2023, 6, 1, 0)),
            paper("c00001v1", at(2024, 1, 6, 0)),
        ]
        .into_iter()
        .inspect(|_| observed.set(observed.get() + 1));

        let out = classify(results, at(2024, 1, 1, 0), vec![]);
        assert_eq!(ids(&out.new), vec!["a00001v1"]);
        assert_eq!(observed.get(), 2);
    }

    #[test]
    fn entry_exactly_at_cutoff_is_included() {
        let cutoff = at(2024, 1, 1, 0);
        let out = classify(vec![paper("edge01v1", cutoff)], cutoff, vec![]);
        assert_eq!(ids(&out.new), vec!["edge01v1"]);
    }

    #[test]
    fn second_pass_over_same_results_finds_nothing() {
        let results = vec![
            paper("p00001v1", at(2024, 1, 5, 0)),
            paper("p00002v3", at(2024, 1, 4, 0)),
        ];
        let first = classify(results.clone(), at(2024, 1, 1, 0), vec!["p00002v2".into()]);
        assert_eq!(ids(&first.new), vec!["p00001v1"]);
        assert_eq!(ids(&first.updated), vec!["p00002v3"]);

        let second = classify(results, at(2024, 1, 1, 0), first.found_ids.clone());
        assert!(second.new.is_empty());
        assert!(second.updated.is_empty());
        assert_eq!(second.found_ids, first.found_ids);
    }

    #[test]
    fn duplicate_result_in_one_run_is_recorded_once() {
        let out = classify(
            vec![
                paper("dup001v1", at(2024, 1, 5, 0)),
                paper("dup001v1", at(2024, 1, 5, 0)),
            ],
            at(2024, 1, 1, 0),
            vec![],
        );
        assert_eq!(out.new.len(), 1);
        assert_eq!(out.found_ids, vec!["dup001v1"]);
    }

    #[test]
    fn two_versions_of_unseen_paper_are_both_new() {
        let out = classify(
            vec![
                paper("two001v2", at(2024, 1, 5, 0)),
                paper("two001v1", at(2024, 1, 4, 0)),
            ],
            at(2024, 1, 1, 0),
            vec![],
        );
        assert_eq!(ids(&out.new), vec!["two001v2", "two001v1"]);
        assert!(out.updated.is_empty());
    }

    #[test]
    fn observe_reports_stop() {
        let mut classifier = Classifier::new(at(2024, 1, 1, 0), vec![]);
        assert_eq!(classifier.observe(paper("a1v1", at(2024, 1, 2, 0))), Step::Continue);
        assert_eq!(classifier.observe(paper("b1v1", at(2023, 1, 2, 0))), Step::Stop);
        assert_eq!(classifier.finish().found_ids, vec!["a1v1"]);
    }
}
