//! Failure alerting across independent best-effort channels.
//!
//! When a backup run fails, [`NotificationDispatcher::dispatch`] loads the
//! connection and its owner's settings, builds one immutable
//! [`NotificationEvent`] and fans it out to up to three channels: a dashboard
//! record written synchronously through the notification store, a webhook
//! POST and an email, both delivered on detached threads. Channels fail
//! independently; a send error is logged and never reaches the dispatch
//! caller. Only context gathering (unknown connection, missing owner or
//! settings, store failure) surfaces as an error.
//!
//! Dispatch returns as soon as fan-out is initiated. There is no delivery
//! guarantee and no join handle; callers must not assume the webhook or email
//! has left the process when dispatch returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::{ConnectionDescriptor, ConnectionStore, EngineKind, StoreError};

pub mod email;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use email::{MailError, MailMessage, MailTransport, SmtpConfig};

/// Per-user channel enablement and configuration.
///
/// The `env_configured` map records, per secret field, whether the stored
/// value is already plaintext because it was sourced from process
/// configuration. Persisted settings carry ciphertext instead and need the
/// [`SecretCipher`] before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotificationSettings {
    pub user_id: Uuid,
    #[serde(default)]
    pub notify_dashboard: bool,
    #[serde(default)]
    pub notify_webhook: bool,
    #[serde(default)]
    pub notify_email: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub env_configured: HashMap<String, bool>,
}

impl UserNotificationSettings {
    /// Whether the SMTP password is plaintext from process configuration.
    /// This flag decides decryption and must be consulted before every use of
    /// the password field.
    pub fn smtp_password_is_plaintext(&self) -> bool {
        self.env_configured
            .get("smtp_password")
            .copied()
            .unwrap_or(false)
    }
}

/// Source of notification settings, keyed by owner.
pub trait SettingsStore: Send + Sync {
    fn get_for_user(&self, user_id: Uuid)
        -> Result<Option<UserNotificationSettings>, StoreError>;
}

/// Sink for dashboard notification records.
pub trait NotificationStore: Send + Sync {
    fn create(&self, record: &NotificationRecord) -> Result<(), StoreError>;
}

/// Failure of the credential cipher, opaque to this crate.
#[derive(Debug, Display, Error)]
#[display("credential cipher failure: {_0}")]
pub struct CipherError(#[error(ignore)] String);

impl CipherError {
    pub fn new(message: impl Into<String>) -> Self {
        CipherError(message.into())
    }
}

/// Encryption-at-rest capability for stored secrets. Implemented outside this
/// crate; only `decrypt` is exercised here (for persisted SMTP passwords).
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// What failed, where, when. Built once per failed run and consumed by every
/// channel unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub connection_id: String,
    pub database_name: String,
    #[serde(rename = "database_type")]
    pub kind: EngineKind,
    pub error: String,
    /// RFC-3339, whole seconds.
    pub timestamp: String,
}

impl NotificationEvent {
    pub fn new(conn: &ConnectionDescriptor, failure: &str) -> Self {
        NotificationEvent {
            connection_id: conn.id.clone(),
            database_name: conn.database.clone(),
            kind: conn.engine,
            error: failure.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Chat-ops compatibility line carried in the webhook payload.
    pub fn webhook_text(&self) -> String {
        format!("[{}] - {}: {}", self.timestamp, self.database_name, self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BackupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

/// Dashboard artifact persisted through the [`NotificationStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    fn backup_failed(owner: Uuid, event: &NotificationEvent) -> Self {
        NotificationRecord {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "Backup Failed".to_string(),
            kind: NotificationKind::BackupFailed,
            status: NotificationStatus::Unread,
            message: format!(
                "Backup failed for database '{}': {}",
                event.database_name, event.error
            ),
            metadata: serde_json::to_value(event).unwrap_or_default(),
            created_at: Utc::now(),
        }
    }
}

/// Context gathering failed; nothing was fanned out.
#[derive(Debug, Display, Error, From)]
pub enum DispatchError {
    #[display("{_0}")]
    #[from]
    Store(StoreError),

    #[display("connection {_0} not found")]
    ConnectionNotFound(#[error(ignore)] String),

    /// The connection has no owner, so there is nobody whose settings could
    /// select channels.
    #[display("connection {_0} has no owner to notify")]
    OwnerUnknown(#[error(ignore)] String),

    #[display("no notification settings for user {_0}")]
    SettingsNotFound(#[error(ignore)] Uuid),
}

/// Fans failure events out to the configured channels.
pub struct NotificationDispatcher {
    connections: Arc<dyn ConnectionStore>,
    settings: Arc<dyn SettingsStore>,
    notifications: Arc<dyn NotificationStore>,
    mail: Arc<dyn MailTransport>,
    cipher: Arc<dyn SecretCipher>,
    http: reqwest::blocking::Client,
}

impl NotificationDispatcher {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        settings: Arc<dyn SettingsStore>,
        notifications: Arc<dyn NotificationStore>,
        mail: Arc<dyn MailTransport>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        NotificationDispatcher {
            connections,
            settings,
            notifications,
            mail,
            cipher,
            http,
        }
    }

    /// Reports one failed backup run to the connection owner's channels.
    ///
    /// Returns once the dashboard write is done and the detached channels are
    /// spawned. The error covers context gathering only; per-channel send
    /// failures are logged under `notify::webhook` / `notify::email`.
    pub fn dispatch(&self, connection_id: &str, failure: &str) -> Result<(), DispatchError> {
        let conn = match self.connections.get(connection_id)? {
            Some(conn) => conn,
            None => {
                let err = DispatchError::ConnectionNotFound(connection_id.to_string());
                log::warn!(target: "notify", "dispatch aborted: {err}");
                return Err(err);
            }
        };

        let owner = match conn.owner {
            Some(owner) if !owner.is_nil() => owner,
            _ => {
                let err = DispatchError::OwnerUnknown(conn.id.clone());
                log::warn!(target: "notify", "dispatch aborted: {err}");
                return Err(err);
            }
        };

        let settings = match self.settings.get_for_user(owner)? {
            Some(settings) => settings,
            None => {
                let err = DispatchError::SettingsNotFound(owner);
                log::warn!(target: "notify", "dispatch aborted: {err}");
                return Err(err);
            }
        };

        let event = NotificationEvent::new(&conn, failure);

        if settings.notify_dashboard {
            let record = NotificationRecord::backup_failed(owner, &event);
            if let Err(e) = self.notifications.create(&record) {
                log::error!(
                    target: "notify",
                    "persisting the dashboard notification for connection {} failed: {e}",
                    conn.id
                );
            }
        }

        self.spawn_webhook(&settings, &event);
        self.spawn_email(&settings, &event);

        Ok(())
    }

    fn spawn_webhook(&self, settings: &UserNotificationSettings, event: &NotificationEvent) {
        if !settings.notify_webhook {
            return;
        }
        let Some(url) = settings
            .webhook_url
            .as_deref()
            .filter(|url| !url.is_empty())
        else {
            log::debug!(target: "notify", "webhook channel enabled but no URL configured");
            return;
        };

        let client = self.http.clone();
        let url = url.to_string();
        let event = event.clone();
        let spawned = thread::Builder::new()
            .name("notify-webhook".to_string())
            .spawn(move || {
                if let Err(e) = webhook::post_event(&client, &url, &event) {
                    log::error!(
                        target: "notify::webhook",
                        "webhook notification for connection {} failed: {e}",
                        event.connection_id
                    );
                }
            });
        if let Err(e) = spawned {
            log::error!(target: "notify::webhook", "spawning webhook delivery failed: {e}");
        }
    }

    fn spawn_email(&self, settings: &UserNotificationSettings, event: &NotificationEvent) {
        let recipient_configured = settings
            .email
            .as_deref()
            .is_some_and(|email| !email.is_empty());
        if !settings.notify_email || !recipient_configured {
            log::debug!(
                target: "notify",
                "email channel skipped for connection {} (enabled: {}, recipient configured: {})",
                event.connection_id,
                settings.notify_email,
                recipient_configured
            );
            return;
        }

        let mail = Arc::clone(&self.mail);
        let cipher = Arc::clone(&self.cipher);
        let settings = settings.clone();
        let event = event.clone();
        let spawned = thread::Builder::new()
            .name("notify-email".to_string())
            .spawn(move || {
                if let Err(e) = email::deliver(mail.as_ref(), cipher.as_ref(), &settings, &event) {
                    log::error!(
                        target: "notify::email",
                        "email notification for connection {} failed: {e}",
                        event.connection_id
                    );
                }
            });
        if let Err(e) = spawned {
            log::error!(target: "notify::email", "spawning email delivery failed: {e}");
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
