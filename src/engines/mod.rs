//! Construction of the per-engine dump tool invocations.
//!
//! Every supported engine has one [`DumpCommand`] implementation translating
//! a connection descriptor into the exact argv its native tool expects. The
//! builders perform no process execution and, apart from the MSSQL script
//! write, no I/O; running the result is the executor's job.

use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

use crate::connection::{ConnectionDescriptor, EngineKind};
use crate::tools::{install_hint, platform_executable_name, required_tool, ToolResolver};

pub mod mongodb;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod redis;

/// An external command ready to run: executable, argv, environment overrides
/// and any files that had to exist on disk before the tool starts.
///
/// `Display` renders the redacted command line; secret argv positions and all
/// environment override values are masked, so the rendering is safe to log.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    scratch_files: Vec<PathBuf>,
    secret_args: Vec<usize>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            scratch_files: Vec::new(),
            secret_args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// Appends an argument that carries a credential. The value still reaches
    /// the child process verbatim, only the logged rendering masks it.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Adds an environment override layered onto the inherited environment of
    /// the child process. Values are always masked when rendered.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Records a file the builder wrote for the tool (the MSSQL script). The
    /// file is left on disk after the run.
    pub fn scratch_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_files.push(path.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn env_overrides(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn scratch_files(&self) -> &[PathBuf] {
        &self.scratch_files
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, _) in &self.env {
            write!(f, "{key}=*** ")?;
        }
        write!(f, "{}", self.program.display())?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&i) {
                write!(f, " ***")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Why an invocation could not be constructed.
#[derive(Debug, Display, Error)]
pub enum BuildError {
    /// The engine's dump tool is installed nowhere we search.
    #[display("{tool} not found: {hint}")]
    ToolNotFound { tool: String, hint: &'static str },

    /// A file the tool needs before it can start could not be written.
    #[display("writing {} failed: {source}", script.display())]
    SetupFailed { script: PathBuf, source: io::Error },
}

/// Builds the dump invocation for one engine.
///
/// `routed_host`/`routed_port` are the effective endpoint after tunnel
/// routing; they equal the connection's own endpoint when no tunnel is
/// configured. `output_path` semantics vary by engine (single file for most,
/// parent-directory tree for mongodb).
pub trait DumpCommand: Sync {
    fn build(
        &self,
        resolver: &ToolResolver,
        conn: &ConnectionDescriptor,
        routed_host: &str,
        routed_port: u16,
        output_path: &Path,
    ) -> Result<Invocation, BuildError>;
}

/// Dispatch table over the closed engine set.
pub fn dump_command(kind: EngineKind) -> &'static dyn DumpCommand {
    match kind {
        EngineKind::Postgresql => &postgres::PgDump,
        EngineKind::Mysql | EngineKind::Mariadb => &mysql::MysqlDump,
        EngineKind::Mongodb => &mongodb::MongoDump,
        EngineKind::Redis => &redis::RedisCli,
        EngineKind::Mssql => &mssql::SqlCmd,
    }
}

/// Resolves the engine's tool executable or reports it missing with the
/// install hint.
pub(crate) fn resolved_tool(
    resolver: &ToolResolver,
    kind: EngineKind,
) -> Result<PathBuf, BuildError> {
    resolver
        .resolve_executable(kind)
        .ok_or_else(|| BuildError::ToolNotFound {
            tool: platform_executable_name(required_tool(kind)),
            hint: install_hint(kind),
        })
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_masks_secret_args_and_env_values() {
        let invocation = Invocation::new("/usr/bin/mysqldump")
            .args(["-h", "db1"])
            .secret_arg("-psecret")
            .env("PGPASSWORD", "secret")
            .arg("orders");

        let line = invocation.to_string();
        assert_eq!(line, "PGPASSWORD=*** /usr/bin/mysqldump -h db1 *** orders");
        assert!(!line.contains("secret"));
    }

    #[test]
    fn test_secret_args_reach_argv_unmasked() {
        let invocation = Invocation::new("redis-cli").secret_arg("-a").secret_arg("hunter2");
        assert_eq!(invocation.argv(), ["-a", "hunter2"]);
    }

    #[test]
    fn test_tool_not_found_names_tool_and_hint() {
        let resolver = ToolResolver::with_search_patterns(
            std::sync::Arc::new(crate::tools::ToolPathCache::new()),
            Vec::new(),
        )
        .path_fallback(false);
        let err = resolved_tool(&resolver, EngineKind::Mssql).unwrap_err();
        match err {
            BuildError::ToolNotFound { ref tool, hint } => {
                assert!(tool.starts_with("sqlcmd"));
                assert!(hint.contains("sqlcmd"));
            }
            other => panic!("expected ToolNotFound, got {other}"),
        }
    }
}
