use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::MailSettings;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid {field} address '{value}': {source}")]
    Address {
        field: &'static str,
        value: String,
        source: lettre::address::AddressError,
    },

    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A rendered digest ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

impl OutgoingMail {
    /// `total` counts new and updated papers, whether or not the updated section is shown.
    pub fn digest(now: DateTime<Utc>, total: usize, text_body: String, html_body: String) -> Self {
        Self {
            subject: subject_line(now, total),
            text_body,
            html_body,
        }
    }
}

pub fn subject_line(now: DateTime<Utc>, total: usize) -> String {
    format!("ArXiv Update {}: {total} new paper(s)", now.format("%d.%m.%y"))
}

/// Abstraction for digest email submission.
/// Implemented by `SmtpMailer` for production; mock implementations used in tests.
pub trait Mailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Submits mail to an SMTP relay over implicit TLS with login credentials.
pub struct SmtpMailer {
    from: Mailbox,
    to: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Validates addresses and prepares the transport; no connection is made until `send`.
    pub fn new(settings: &MailSettings) -> Result<Self, MailError> {
        let from = parse_mailbox("from_email", &settings.from_email)?;
        let to = parse_mailbox("to_email", &settings.to_email)?;
        let creds = Credentials::new(
            settings.smtp_login.clone(),
            settings.smtp_pwd.expose().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_server)?
            .port(settings.smtp_port)
            .credentials(creds)
            .build();
        Ok(Self { from, to, transport })
    }

    fn message(&self, mail: &OutgoingMail) -> Result<Message, MailError> {
        build_message(self.from.clone(), self.to.clone(), mail)
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = self.message(mail)?;
        self.transport.send(message).await?;
        info!(to = %self.to, subject = %mail.subject, "digest email sent");
        Ok(())
    }
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, MailError> {
    value.parse().map_err(|source| MailError::Address {
        field,
        value: value.to_string(),
        source,
    })
}

fn build_message(from: Mailbox, to: Mailbox, mail: &OutgoingMail) -> Result<Message, MailError> {
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.as_str())
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(mail.text_body.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(mail.html_body.clone()),
                ),
        )?;
    Ok(message)
}
