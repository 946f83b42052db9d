//! MongoDB dumps via `mongodump`.

use std::path::Path;

use crate::connection::ConnectionDescriptor;
use crate::tools::ToolResolver;

use super::{resolved_tool, BuildError, DumpCommand, Invocation};

/// `mongodump` of a single database.
///
/// `--out` takes a directory, so the tool receives the *parent* of the
/// requested output path and writes its own `<database>/` tree underneath.
/// Credential flags are appended only when non-empty; anonymous access is a
/// supported deployment.
pub struct MongoDump;

impl DumpCommand for MongoDump {
    fn build(
        &self,
        resolver: &ToolResolver,
        conn: &ConnectionDescriptor,
        routed_host: &str,
        routed_port: u16,
        output_path: &Path,
    ) -> Result<Invocation, BuildError> {
        let program = resolved_tool(resolver, conn.engine)?;
        let out_dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut invocation = Invocation::new(program)
            .arg("--host")
            .arg(routed_host)
            .arg("--port")
            .arg(routed_port.to_string())
            .arg("--db")
            .arg(&conn.database)
            .arg("--out")
            .arg(out_dir.to_string_lossy());

        if !conn.username.is_empty() {
            invocation = invocation.arg("--username").arg(&conn.username);
        }
        if !conn.password.is_empty() {
            invocation = invocation.arg("--password").secret_arg(&conn.password);
        }

        Ok(invocation)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
