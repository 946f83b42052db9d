//! Email delivery of failure events.

use derive_more::{Display, Error, From};

use super::{CipherError, NotificationEvent, SecretCipher, UserNotificationSettings};

/// Connection parameters for one SMTP session.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// One outbound message. Sender identity is the transport's concern.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport failure, opaque to this crate.
#[derive(Debug, Display, Error)]
#[display("{_0}")]
pub struct MailError(#[error(ignore)] String);

impl MailError {
    pub fn new(message: impl Into<String>) -> Self {
        MailError(message.into())
    }
}

/// SMTP capability, implemented outside this crate.
pub trait MailTransport: Send + Sync {
    fn send(&self, config: &SmtpConfig, message: &MailMessage) -> Result<(), MailError>;
}

/// Why the email channel gave up. Logged by the delivery thread, never
/// surfaced to the dispatch caller.
#[derive(Debug, Display, Error, From)]
pub(crate) enum EmailChannelError {
    #[display("incomplete SMTP configuration: host, port, username and password are all required")]
    IncompleteConfig,

    #[display("decrypting the SMTP password failed: {_0}")]
    #[from]
    Decrypt(CipherError),

    #[display("sending failed: {_0}")]
    Send(MailError),
}

/// Sends the failure mail for one event.
pub(crate) fn deliver(
    transport: &dyn MailTransport,
    cipher: &dyn SecretCipher,
    settings: &UserNotificationSettings,
    event: &NotificationEvent,
) -> Result<(), EmailChannelError> {
    let recipient = settings
        .email
        .as_deref()
        .filter(|email| !email.is_empty())
        .ok_or(EmailChannelError::IncompleteConfig)?;
    let config = smtp_config(settings, cipher)?;

    let message = MailMessage {
        to: recipient.to_string(),
        subject: "Dumpwatch - Backup Failed".to_string(),
        body: format!(
            "Backup failed for database '{}'. Error: {}",
            event.database_name, event.error
        ),
    };

    transport
        .send(&config, &message)
        .map_err(EmailChannelError::Send)
}

/// Assembles the SMTP config. All four fields must be present; the password
/// is decrypted unless the provenance flag marks it as plaintext from process
/// configuration.
fn smtp_config(
    settings: &UserNotificationSettings,
    cipher: &dyn SecretCipher,
) -> Result<SmtpConfig, EmailChannelError> {
    let host = settings.smtp_host.as_deref().filter(|s| !s.is_empty());
    let username = settings.smtp_username.as_deref().filter(|s| !s.is_empty());
    let password = settings.smtp_password.as_deref().filter(|s| !s.is_empty());
    let (Some(host), Some(username), Some(password), Some(port)) =
        (host, username, password, settings.smtp_port)
    else {
        return Err(EmailChannelError::IncompleteConfig);
    };

    let password = if settings.smtp_password_is_plaintext() {
        password.to_string()
    } else {
        cipher.decrypt(password)?
    };

    Ok(SmtpConfig {
        host: host.to_string(),
        port,
        username: username.to_string(),
        password,
    })
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
