//! One backup run end to end: tunnel routing, command construction, process
//! execution, optional compression and failure reporting.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::Local;
use derive_more::{Display, Error, From};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::connection::{ConnectionDescriptor, ConnectionStore, EngineKind, StoreError};
use crate::engines::{self, BuildError, Invocation};
use crate::notify::{DispatchError, NotificationDispatcher};
use crate::tools::ToolResolver;
use crate::tunnel::{self, TunnelError, TunnelTransport};
use crate::util::naming;

/// Why an external dump process produced no usable dump.
#[derive(Debug, Display, Error)]
pub enum ProcessError {
    /// The tool never started.
    #[display("spawning the dump tool failed: {_0}")]
    Spawn(io::Error),

    /// The tool ran and reported failure. The code is -1 when a signal killed
    /// the process; stderr is carried verbatim into notifications.
    #[display("dump tool exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Runs a prepared invocation to completion.
///
/// The seam exists so failure paths are testable without the real dump tools
/// installed; production wiring uses [`SystemProcessRunner`].
pub trait ProcessRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<(), ProcessError>;
}

/// Shells out through [`std::process::Command`].
///
/// Stdout is discarded (every supported tool writes the dump itself), stderr
/// is captured for the failure report. The child inherits the current process
/// environment plus the invocation's overrides.
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), ProcessError> {
        let output = Command::new(invocation.program())
            .args(invocation.argv())
            .envs(invocation.env_overrides().iter().map(|(k, v)| (k, v)))
            .output()
            .map_err(ProcessError::Spawn)?;

        if !output.status.success() {
            return Err(ProcessError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

/// Terminal failure of one backup run.
#[derive(Debug, Display, Error, From)]
pub enum BackupError {
    #[display("no connection with id '{_0}' is configured")]
    ConnectionNotFound(#[error(ignore)] String),

    #[display("loading the connection failed: {_0}")]
    #[from]
    Store(StoreError),

    #[display("{_0}")]
    #[from]
    Tunnel(TunnelError),

    #[display("{_0}")]
    #[from]
    Build(BuildError),

    #[display("{_0}")]
    #[from]
    Process(ProcessError),

    #[display("writing the dump failed: {_0}")]
    #[from]
    Io(io::Error),
}

/// Orchestrator knobs, fixed at construction.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory the dumps land under, one subdirectory per connection.
    pub output_root: PathBuf,
    /// Gzip single-file dumps after a successful run.
    pub compress: bool,
}

/// Sequences one backup run and owns its success or failure.
///
/// Callers schedule runs however they like (the shipped binary spawns one
/// thread per selected connection); the service itself only spawns the
/// detached notification threads of its dispatcher.
pub struct BackupService {
    connections: Arc<dyn ConnectionStore>,
    resolver: ToolResolver,
    tunnels: Arc<dyn TunnelTransport>,
    runner: Arc<dyn ProcessRunner>,
    dispatcher: NotificationDispatcher,
    config: BackupConfig,
}

impl BackupService {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        resolver: ToolResolver,
        tunnels: Arc<dyn TunnelTransport>,
        runner: Arc<dyn ProcessRunner>,
        dispatcher: NotificationDispatcher,
        config: BackupConfig,
    ) -> Self {
        BackupService {
            connections,
            resolver,
            tunnels,
            runner,
            dispatcher,
            config,
        }
    }

    /// Runs one backup for the connection and returns the dump path.
    ///
    /// Every failure after the connection resolves is reported through the
    /// notification dispatcher before this returns; dispatch problems are
    /// logged and never displace the backup's own error.
    pub fn run_backup(&self, connection_id: &str) -> Result<PathBuf, BackupError> {
        let conn = self
            .connections
            .get(connection_id)?
            .ok_or_else(|| BackupError::ConnectionNotFound(connection_id.to_string()))?;
        log::info!(
            target: "backup",
            "starting backup of connection {} ({} database '{}' on {}:{})",
            conn.id,
            conn.engine,
            conn.database,
            conn.host,
            conn.port
        );

        match self.execute(&conn) {
            Ok(output_path) => {
                log::info!(
                    target: "backup",
                    "finished backup of connection {}: {}",
                    conn.id,
                    output_path.display()
                );
                Ok(output_path)
            }
            Err(err) => {
                log::error!(target: "backup", "backup of connection {} failed: {err}", conn.id);
                if let Err(dispatch_err) = self.dispatcher.dispatch(&conn.id, &err.to_string()) {
                    log::error!(
                        target: "backup",
                        "the failure of connection {} was not reported: {dispatch_err}",
                        conn.id
                    );
                }
                Err(err)
            }
        }
    }

    /// Reports a failure on the connection owner's channels without running a
    /// backup. For failures that happen outside [`BackupService::run_backup`],
    /// e.g. in an external scheduler.
    pub fn notify_failure(
        &self,
        connection_id: &str,
        failure: &str,
    ) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(connection_id, failure)
    }

    fn execute(&self, conn: &ConnectionDescriptor) -> Result<PathBuf, BackupError> {
        let routed = tunnel::route_if_needed(self.tunnels.as_ref(), conn)?;

        let output_path = self.dump_output_path(conn);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let invocation = engines::dump_command(conn.engine).build(
            &self.resolver,
            conn,
            routed.host(),
            routed.port(),
            &output_path,
        )?;
        log::info!(target: "backup", "running {invocation}");
        self.runner.run(&invocation)?;

        if self.config.compress {
            return Ok(compress_dump(&output_path)?);
        }
        Ok(output_path)
    }

    /// `<output_root>/<slug>/<slug>-<timestamp>.<ext>`. The per-connection
    /// subdirectory keeps concurrent runs for different connections apart.
    fn dump_output_path(&self, conn: &ConnectionDescriptor) -> PathBuf {
        let slug = naming::sanitize_connection_name(&conn.name);
        let timestamp = Local::now().format("%Y-%m-%dT%H-%M-%S");
        let extension = dump_extension(conn.engine);
        self.config
            .output_root
            .join(&slug)
            .join(format!("{slug}-{timestamp}.{extension}"))
    }
}

/// File extension of the engine's dump artifact.
fn dump_extension(kind: EngineKind) -> &'static str {
    match kind {
        EngineKind::Postgresql | EngineKind::Mysql | EngineKind::Mariadb => "sql",
        EngineKind::Mongodb => "archive",
        EngineKind::Redis => "rdb",
        EngineKind::Mssql => "bak",
    }
}

/// Gzip-compresses a finished dump in place and removes the original.
///
/// Paths that are not a plain local file pass through untouched: mongodump
/// writes a directory tree and sqlcmd makes the server write the `.bak`,
/// possibly on another machine.
fn compress_dump(output_path: &Path) -> Result<PathBuf, io::Error> {
    if !output_path.is_file() {
        log::debug!(
            target: "backup",
            "not compressing {}, not a plain local file",
            output_path.display()
        );
        return Ok(output_path.to_path_buf());
    }

    let mut archive_path = output_path.as_os_str().to_owned();
    archive_path.push(".gz");
    let archive_path = PathBuf::from(archive_path);

    let mut reader = BufReader::new(File::open(output_path)?);
    let archive = File::create_new(&archive_path)?;
    let mut encoder = GzEncoder::new(archive, Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(output_path)?;
    log::debug!(target: "backup", "compressed dump to {}", archive_path.display());
    Ok(archive_path)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
