//! Database connection descriptors and the store they are loaded from.

use std::str::FromStr;

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A database engine with a supported native dump tool.
///
/// The set is closed: every consumer dispatches with an exhaustive `match`,
/// so adding an engine means adding a variant and following the compiler.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[display("postgresql")]
    Postgresql,
    #[display("mysql")]
    Mysql,
    #[display("mariadb")]
    Mariadb,
    #[display("mongodb")]
    Mongodb,
    #[display("redis")]
    Redis,
    #[display("mssql")]
    Mssql,
}

impl EngineKind {
    /// Every supported engine, in the order they are reported by diagnostics.
    pub const ALL: [EngineKind; 6] = [
        EngineKind::Postgresql,
        EngineKind::Mysql,
        EngineKind::Mariadb,
        EngineKind::Mongodb,
        EngineKind::Redis,
        EngineKind::Mssql,
    ];
}

/// Engine kind outside the supported set.
#[derive(Debug, Display, Error)]
#[display("unsupported database engine: {_0}")]
pub struct UnsupportedEngine(#[error(ignore)] String);

impl FromStr for EngineKind {
    type Err = UnsupportedEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgresql" => Ok(Self::Postgresql),
            "mysql" => Ok(Self::Mysql),
            "mariadb" => Ok(Self::Mariadb),
            "mongodb" => Ok(Self::Mongodb),
            "redis" => Ok(Self::Redis),
            "mssql" => Ok(Self::Mssql),
            _ => Err(UnsupportedEngine(s.to_string())),
        }
    }
}

/// How the SSH session to the jump host authenticates.
///
/// Password and private key are mutually exclusive, which the variant split
/// enforces at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelAuth {
    Password(String),
    PrivateKey(String),
}

/// SSH jump host a connection's traffic is forwarded through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSpec {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: TunnelAuth,
}

/// Read-only snapshot of one configured database target.
///
/// Loaded fresh from the [`ConnectionStore`] for every backup run; nothing in
/// this crate caches or mutates it. Empty `username`/`password` mean the
/// engine is accessed anonymously where its tool allows that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub id: String,
    pub name: String,
    pub engine: EngineKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// TLS toward the database server, not toward the SSH jump host.
    #[serde(default)]
    pub ssl: bool,
    /// Account that owns the connection and receives failure alerts.
    #[serde(default)]
    pub owner: Option<Uuid>,
    #[serde(default)]
    pub tunnel: Option<TunnelSpec>,
}

impl ConnectionDescriptor {
    pub fn has_tunnel(&self) -> bool {
        self.tunnel.is_some()
    }
}

/// Backend failure of a store, opaque to this crate.
///
/// Implementations live outside the crate (SQL, HTTP, files), so the payload
/// is only a message.
#[derive(Debug, Display, Error)]
#[display("store backend failure: {_0}")]
pub struct StoreError(#[error(ignore)] String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError(message.into())
    }
}

/// Source of connection descriptors.
///
/// `Ok(None)` means the id is unknown; `Err` means the backend itself failed.
pub trait ConnectionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<ConnectionDescriptor>, StoreError>;
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
