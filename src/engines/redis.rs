//! Redis dumps via `redis-cli --rdb`.

use std::path::Path;

use crate::connection::ConnectionDescriptor;
use crate::tools::ToolResolver;

use super::{resolved_tool, BuildError, DumpCommand, Invocation};

/// RDB snapshot transfer through `redis-cli`.
///
/// `-a` is appended only when a password is set and `-n` only when a logical
/// database index is configured; both are optional in common deployments.
pub struct RedisCli;

impl DumpCommand for RedisCli {
    fn build(
        &self,
        resolver: &ToolResolver,
        conn: &ConnectionDescriptor,
        routed_host: &str,
        routed_port: u16,
        output_path: &Path,
    ) -> Result<Invocation, BuildError> {
        let program = resolved_tool(resolver, conn.engine)?;

        let mut invocation = Invocation::new(program)
            .arg("-h")
            .arg(routed_host)
            .arg("-p")
            .arg(routed_port.to_string());

        if !conn.password.is_empty() {
            invocation = invocation.arg("-a").secret_arg(&conn.password);
        }
        if !conn.database.is_empty() {
            invocation = invocation.arg("-n").arg(&conn.database);
        }

        Ok(invocation.arg("--rdb").arg(output_path.to_string_lossy()))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
