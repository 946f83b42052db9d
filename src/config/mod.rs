//! TOML configuration of the shipped binary, plus the file-backed and inert
//! collaborator stand-ins it wires where an embedding service would plug in
//! real implementations.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::{
    ConnectionDescriptor, ConnectionStore, StoreError, TunnelSpec,
};
use crate::notify::{
    CipherError, MailError, MailMessage, MailTransport, NotificationRecord, NotificationStore,
    SecretCipher, SettingsStore, SmtpConfig, UserNotificationSettings,
};
use crate::tunnel::{TunnelError, TunnelHandle, TunnelTransport};

/// Starter config written when none exists yet. Parseable as-is, so a restart
/// right after writing it comes up with the defaults.
const DEFAULT_CONFIG: &str = r#"# dumpwatch configuration.
#
# Dumps land under <output_root>/<connection>/<connection>-<timestamp>.<ext>,
# one subdirectory per configured connection.

[backup]
output_root = "backups"
compress = false

# One entry per database to back up. Engines: postgresql, mysql, mariadb,
# mongodb, redis, mssql.
#
# [[connections]]
# id = "orders"
# name = "orders db"
# engine = "postgresql"
# host = "127.0.0.1"
# port = 5432
# username = "backup"
# password = ""
# database = "orders"
# ssl = false

# Failure alerting. The webhook receives the failure event as JSON; email
# additionally needs a mail transport wired by the embedding service.
#
# [notifications]
# dashboard = true
# webhook = false
# email = false
# webhook_url = ""
# email_to = ""
# smtp_host = ""
# smtp_port = 587
# smtp_username = ""
# smtp_password = ""
"#;

#[derive(Debug, Default, Serialize, Deserialize)]
/// Everything the binary reads from its TOML config file.
pub struct AppConfig {
    #[serde(default)]
    pub backup: BackupSettings,

    /// Connection inventory. Owner ids are assigned at load time; every
    /// connection belongs to the one profile below.
    #[serde(default)]
    pub connections: Vec<ConnectionDescriptor>,

    /// Single notification profile shared by all connections.
    #[serde(default)]
    pub notifications: Option<NotificationProfile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default)]
    pub compress: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            output_root: default_output_root(),
            compress: false,
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("backups")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Channel enablement and addresses, file-format view.
pub struct NotificationProfile {
    #[serde(default)]
    pub dashboard: bool,
    #[serde(default)]
    pub webhook: bool,
    #[serde(default)]
    pub email: bool,
    pub webhook_url: Option<String>,
    pub email_to: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

impl NotificationProfile {
    /// Materializes the profile as one user's settings. An SMTP password in
    /// the file is by definition process configuration, so the provenance
    /// flag marks it plaintext and the cipher is never consulted.
    fn settings_for(&self, owner: Uuid) -> UserNotificationSettings {
        let mut env_configured = HashMap::new();
        env_configured.insert("smtp_password".to_string(), true);
        UserNotificationSettings {
            user_id: owner,
            notify_dashboard: self.dashboard,
            notify_webhook: self.webhook,
            notify_email: self.email,
            webhook_url: self.webhook_url.clone(),
            email: self.email_to.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_username: self.smtp_username.clone(),
            smtp_password: self.smtp_password.clone(),
            env_configured,
        }
    }
}

/// Why the config file could not be loaded.
#[derive(Debug, Display, Error, From)]
pub enum ConfigError {
    #[display("reading the config file failed: {_0}")]
    #[from]
    Io(io::Error),

    #[display("parsing the config file failed: {_0}")]
    #[from]
    Parse(toml::de::Error),
}

/// Outcome of [`load_or_init`].
#[derive(Debug)]
pub enum LoadedConfig {
    /// The file existed and parsed.
    Loaded(AppConfig),
    /// No file was found; the starter template was written for editing.
    TemplateWritten(PathBuf),
}

/// Loads the config file, writing the starter template if none exists yet.
///
/// A template write is not an error, but the caller is expected to stop and
/// let the operator fill the file in.
pub fn load_or_init(path: &Path) -> Result<LoadedConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(LoadedConfig::Loaded(toml::from_str(&raw)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::write(path, DEFAULT_CONFIG)?;
            log::info!(
                target: "config",
                "no config found, wrote a starter template to {}",
                path.display()
            );
            Ok(LoadedConfig::TemplateWritten(path.to_path_buf()))
        }
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Connection inventory and notification profile from the config file, behind
/// the store traits.
///
/// The owner id binding connections to the profile does not exist in the file
/// and is synthesized once per construction.
pub struct FileStore {
    connections: HashMap<String, ConnectionDescriptor>,
    settings: Option<UserNotificationSettings>,
    owner: Uuid,
}

impl FileStore {
    pub fn new(config: &AppConfig) -> Self {
        let owner = Uuid::new_v4();
        let connections = config
            .connections
            .iter()
            .cloned()
            .map(|mut conn| {
                conn.owner = Some(owner);
                (conn.id.clone(), conn)
            })
            .collect();
        let settings = config
            .notifications
            .as_ref()
            .map(|profile| profile.settings_for(owner));

        FileStore {
            connections,
            settings,
            owner,
        }
    }

    /// Synthesized owner of every configured connection.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Ids of all configured connections, for "back up everything" runs.
    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl ConnectionStore for FileStore {
    fn get(&self, id: &str) -> Result<Option<ConnectionDescriptor>, StoreError> {
        Ok(self.connections.get(id).cloned())
    }
}

impl SettingsStore for FileStore {
    fn get_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserNotificationSettings>, StoreError> {
        Ok(self
            .settings
            .clone()
            .filter(|settings| settings.user_id == user_id))
    }
}

/// Appends dashboard records as JSON lines.
///
/// The binary has no dashboard, but the records still land somewhere an
/// operator can inspect or ship elsewhere.
pub struct JsonlNotificationStore {
    path: PathBuf,
}

impl JsonlNotificationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlNotificationStore { path: path.into() }
    }
}

impl NotificationStore for JsonlNotificationStore {
    fn create(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let line =
            serde_json::to_string(record).map_err(|e| StoreError::new(e.to_string()))?;
        // A run can fail before anything created the output root; the record
        // must still land.
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::new(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::new(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| StoreError::new(e.to_string()))?;
        Ok(())
    }
}

/// Stand-in until an embedding service provides SMTP. Every send fails, which
/// the email channel logs as a delivery error.
pub struct NoMailTransport;

impl MailTransport for NoMailTransport {
    fn send(&self, _config: &SmtpConfig, _message: &MailMessage) -> Result<(), MailError> {
        Err(MailError::new("no mail transport configured"))
    }
}

/// Stand-in until an embedding service provides SSH. Connections declaring a
/// tunnel fail their runs until then.
pub struct NoTunnelTransport;

impl TunnelTransport for NoTunnelTransport {
    fn open(
        &self,
        _spec: &TunnelSpec,
        _target_host: &str,
        _target_port: u16,
    ) -> Result<Box<dyn TunnelHandle>, TunnelError> {
        Err(TunnelError::unavailable("no tunnel transport configured"))
    }
}

/// Stand-in cipher. Unreachable during dispatch because file-sourced SMTP
/// passwords carry the plaintext provenance flag.
pub struct NoCipher;

impl SecretCipher for NoCipher {
    fn encrypt(&self, _plaintext: &str) -> Result<String, CipherError> {
        Err(CipherError::new("no credential cipher configured"))
    }

    fn decrypt(&self, _ciphertext: &str) -> Result<String, CipherError> {
        Err(CipherError::new("no credential cipher configured"))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
