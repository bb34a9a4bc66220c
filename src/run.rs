use std::pin::pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tracing::{info, warn};

use crate::arxiv::{self, ArxivError, PaperFeed};
use crate::classify::{Classifier, Step, resolve_cutoff};
use crate::config::Config;
use crate::deliver::{self, DeliveryError, Mailer, OutgoingMail};
use crate::digest::Digest;
use crate::state::{State, StateError, StateStore, format_query_time};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("state: {0}")]
    State(#[from] StateError),

    #[error("search window of {days} day(s) is out of range")]
    Cutoff { days: i64 },

    #[error("search: {0}")]
    Search(#[from] ArxivError),

    #[error("delivery: {0}")]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub in_window: usize,
    pub new: usize,
    pub updated: usize,
    pub notified: bool,
}

/// One complete poll: load state, search, classify, persist, then deliver.
///
/// State is saved before any sink runs, so a failed delivery is never re-reported.
/// The results file is written before mail goes out. `mailer` is consulted only when
/// `send_results_as_email` is set.
pub async fn run<F: PaperFeed, M: Mailer>(
    config: &Config,
    store: &StateStore,
    feed: &F,
    mailer: Option<&M>,
    lookback_days: Option<i64>,
    now: DateTime<Utc>,
) -> Result<RunReport, RunError> {
    let state = store.load(now)?;
    let cutoff = resolve_cutoff(
        now,
        state.last_query_time,
        config.search_days_before_last_query,
        lookback_days,
    )
    .ok_or(RunError::Cutoff {
        days: lookback_days.unwrap_or(i64::from(config.search_days_before_last_query)),
    })?;
    info!(
        query = %config.arxiv_query,
        cutoff = %format_query_time(cutoff),
        known = state.found_ids.len(),
        "searching arXiv"
    );

    let mut classifier = Classifier::new(cutoff, state.found_ids);
    let mut results = pin!(arxiv::papers(
        feed,
        &config.arxiv_query,
        config.arxiv_page_size,
        Duration::from_secs(config.arxiv_page_delay_secs),
    ));
    let mut in_window = 0;
    while let Some(paper) = results.try_next().await? {
        if classifier.observe(paper) == Step::Stop {
            break;
        }
        in_window += 1;
    }
    let classified = classifier.finish();

    let report = RunReport {
        in_window,
        new: classified.new.len(),
        updated: classified.updated.len(),
        notified: deliver::should_notify(
            classified.new.len(),
            classified.updated.len(),
            config.notify_on_updated_papers,
        ),
    };
    info!(in_window, new = report.new, updated = report.updated, "classification complete");

    store.save(&State {
        last_query_time: now,
        found_ids: classified.found_ids,
    })?;

    if !report.notified {
        info!("nothing to report");
        return Ok(report);
    }

    let digest = Digest {
        generated_at: now,
        new: &classified.new,
        updated: if config.notify_on_updated_papers {
            classified.updated.as_slice()
        } else {
            &[]
        },
    };

    if config.write_results_to_file
        && let Some(path) = &config.results_filename
    {
        deliver::prepend_to_file(path, &digest.to_text())?;
    }

    if config.send_results_as_email {
        match mailer {
            Some(mailer) => {
                let mail = OutgoingMail::digest(
                    now,
                    report.new + report.updated,
                    digest.to_text(),
                    digest.to_html(),
                );
                mailer.send(&mail).await.map_err(DeliveryError::from)?;
            }
            None => warn!("email delivery enabled but no mailer configured"),
        }
    }

    Ok(report)
}
