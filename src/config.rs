use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

const DEFAULT_SMTP_PORT: u16 = 465;
const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_PAGE_DELAY_SECS: u64 = 3;

/// Environment variable that overrides `smtp_pwd` from the config file.
pub const SMTP_PWD_ENV: &str = "ARXIV_NOTIFY_SMTP_PWD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("config field '{field}' is required when {reason}")]
    MissingField {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SmtpPassword(String);

impl SmtpPassword {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SmtpPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Settings loaded once per run from the YAML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub arxiv_query: String,
    /// Grace period subtracted from the last query time to tolerate indexing lag.
    pub search_days_before_last_query: u32,
    pub notify_on_updated_papers: bool,
    pub write_results_to_file: bool,
    #[serde(default)]
    pub results_filename: Option<PathBuf>,
    pub send_results_as_email: bool,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_login: Option<String>,
    #[serde(default)]
    pub smtp_pwd: Option<SmtpPassword>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub to_email: Option<String>,
    #[serde(default = "default_page_size")]
    pub arxiv_page_size: usize,
    #[serde(default = "default_page_delay_secs")]
    pub arxiv_page_delay_secs: u64,
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_page_delay_secs() -> u64 {
    DEFAULT_PAGE_DELAY_SECS
}

/// Everything the mail sink needs, present only when email delivery is enabled.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_login: String,
    pub smtp_pwd: SmtpPassword,
    pub from_email: String,
    pub to_email: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides(env::var(SMTP_PWD_ENV).ok());
        config.validate()?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    fn apply_env_overrides(&mut self, smtp_pwd: Option<String>) {
        if let Some(pwd) = smtp_pwd.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) {
            debug!("smtp password taken from {SMTP_PWD_ENV}");
            self.smtp_pwd = Some(SmtpPassword(pwd));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.write_results_to_file && self.results_filename.is_none() {
            return Err(ConfigError::MissingField {
                field: "results_filename",
                reason: "write_results_to_file is true",
            });
        }
        if self.send_results_as_email {
            self.mail_settings()?;
        }
        Ok(())
    }

    pub fn mail_settings(&self) -> Result<MailSettings, ConfigError> {
        fn require<T: Clone>(value: &Option<T>, field: &'static str) -> Result<T, ConfigError> {
            value.clone().ok_or(ConfigError::MissingField {
                field,
                reason: "send_results_as_email is true",
            })
        }

        Ok(MailSettings {
            smtp_server: require(&self.smtp_server, "smtp_server")?,
            smtp_port: self.smtp_port,
            smtp_login: require(&self.smtp_login, "smtp_login")?,
            smtp_pwd: require(&self.smtp_pwd, "smtp_pwd")?,
            from_email: require(&self.from_email, "from_email")?,
            to_email: require(&self.to_email, "to_email")?,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        arxiv_query: "cat:quant-ph".into(),
        search_days_before_last_query: 2,
        notify_on_updated_papers: false,
        write_results_to_file: false,
        results_filename: None,
        send_results_as_email: false,
        smtp_server: None,
        smtp_port: DEFAULT_SMTP_PORT,
        smtp_login: None,
        smtp_pwd: None,
        from_email: None,
        to_email: None,
        arxiv_page_size: DEFAULT_PAGE_SIZE,
        arxiv_page_delay_secs: 0,
    }
}
