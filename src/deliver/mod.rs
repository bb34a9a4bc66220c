//! Notification gate and the two digest sinks: results file and email.

pub mod mail;

use std::path::{Path, PathBuf};

use tracing::info;

pub use mail::{MailError, Mailer, OutgoingMail, SmtpMailer};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to update results file {path}: {source}")]
    ResultsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Whether a digest goes out at all.
///
/// New papers always notify; updated papers alone only when `notify_on_updated` is set.
pub fn should_notify(new_count: usize, updated_count: usize, notify_on_updated: bool) -> bool {
    new_count > 0 || (updated_count > 0 && notify_on_updated)
}

/// Write `digest` in front of whatever the results file already holds, creating it if needed.
pub fn prepend_to_file(path: &Path, digest: &str) -> Result<(), DeliveryError> {
    let io_err = |source: std::io::Error| DeliveryError::ResultsFile {
        path: path.to_path_buf(),
        source,
    };

    let previous = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(e)),
    };

    let mut content = String::with_capacity(digest.len() + previous.len());
    content.push_str(digest);
    content.push_str(&previous);
    std::fs::write(path, content).map_err(io_err)?;

    info!(path = %path.display(), bytes = digest.len(), "digest written to results file");
    Ok(())
}
