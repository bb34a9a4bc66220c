use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Timestamp layout shared by the state file and the digest banner.
pub const QUERY_TIME_FORMAT: &str = "%m-%d-%y %H:%M:%S %z";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed state file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn format_query_time(time: DateTime<Utc>) -> String {
    time.format(QUERY_TIME_FORMAT).to_string()
}

pub fn parse_query_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_str(s.trim(), QUERY_TIME_FORMAT).map(|t| t.with_timezone(&Utc))
}

mod query_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_query_time(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_query_time(&raw)
            .map_err(|e| de::Error::custom(format!("invalid last_query_time '{raw}': {e}")))
    }
}

/// Persisted record of the previous run.
///
/// `found_ids` is append-only: every full identifier ever reported stays in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(with = "query_time")]
    pub last_query_time: DateTime<Utc>,
    pub found_ids: Vec<String>,
}

impl State {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            last_query_time: now,
            found_ids: Vec::new(),
        }
    }
}

/// JSON file holding the [`State`] between runs.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the persisted state, or a fresh one stamped `now` if the file is absent.
    pub fn load(&self, now: DateTime<Utc>) -> Result<State, StateError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                return Ok(State::fresh(now));
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the state file atomically (temp file in the same directory, then rename).
    pub fn save(&self, state: &State) -> Result<(), StateError> {
        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };
        let body = serde_json::to_vec(state).map_err(|e| write_err(e.into()))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(path = %self.path.display(), ids = state.found_ids.len(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn query_time_uses_fixed_layout() {
        assert_eq!(format_query_time(at(2024, 1, 1, 0)), "01-01-24 00:00:00 +0000");
        assert_eq!(parse_query_time("01-01-24 00:00:00 +0000").unwrap(), at(2024, 1, 1, 0));
    }

    #[test]
    fn parse_query_time_honours_offset() {
        assert_eq!(parse_query_time("01-01-24 02:00:00 +0200").unwrap(), at(2024, 1, 1, 0));
    }

    #[test]
    fn load_missing_file_returns_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("data.json"));
        let now = at(2024, 3, 5, 12);

        let state = store.load(now).unwrap();
        assert_eq!(state, State::fresh(now));
    }

    #[test]
    fn load_reads_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{"last_query_time": "01-01-24 00:00:00 +0000", "found_ids": ["abc123v1"]}"#,
        )
        .unwrap();

        let state = StateStore::new(&path).load(at(2030, 1, 1, 0)).unwrap();
        assert_eq!(state.last_query_time, at(2024, 1, 1, 0));
        assert_eq!(state.found_ids, vec!["abc123v1".to_string()]);
    }

    #[test]
    fn load_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StateStore::new(&path).load(Utc::now()).unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }

    #[test]
    fn load_bad_timestamp_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{"last_query_time": "2024-01-01T00:00:00Z", "found_ids": []}"#,
        )
        .unwrap();

        let err = StateStore::new(&path).load(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("last_query_time"), "got: {err}");
    }

    #[test]
    fn save_overwrites_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "stale").unwrap();
        let store = StateStore::new(&path);

        let state = State {
            last_query_time: at(2024, 2, 1, 8),
            found_ids: vec!["a1v1".into(), "a1v2".into()],
        };
        store.save(&state).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"02-01-24 08:00:00 +0000\""));
        assert_eq!(store.load(Utc::now()).unwrap(), state);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nope").join("data.json"));

        let err = store.save(&State::fresh(Utc::now())).unwrap_err();
        assert!(matches!(err, StateError::Write { .. }));
    }
}
