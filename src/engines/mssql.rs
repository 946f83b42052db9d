//! SQL Server dumps via `sqlcmd` and a generated `BACKUP DATABASE` script.

use std::fs;
use std::path::{Path, PathBuf};

use crate::connection::ConnectionDescriptor;
use crate::tools::ToolResolver;

use super::{resolved_tool, BuildError, DumpCommand, Invocation};

/// `sqlcmd` run of a synthesized T-SQL backup script.
///
/// SQL Server has no client-side dump: the server itself writes the `.bak`
/// at the requested path, on *its* filesystem. The builder materializes the
/// script at `<output path>.sql` before returning and points `-i` at it; the
/// script stays on disk after the run. Database name and output path are
/// interpolated into the script text (a T-SQL script offers no parameter
/// binding), so the database name must be validated upstream.
pub struct SqlCmd;

impl DumpCommand for SqlCmd {
    fn build(
        &self,
        resolver: &ToolResolver,
        conn: &ConnectionDescriptor,
        routed_host: &str,
        routed_port: u16,
        output_path: &Path,
    ) -> Result<Invocation, BuildError> {
        let program = resolved_tool(resolver, conn.engine)?;

        let script_path = script_path_for(output_path);
        let script_sql = format!(
            "BACKUP DATABASE [{}]\nTO DISK = N'{}'\nWITH FORMAT, COMPRESSION, STATS = 10;\nGO",
            conn.database,
            output_path.display(),
        );
        fs::write(&script_path, script_sql).map_err(|source| BuildError::SetupFailed {
            script: script_path.clone(),
            source,
        })?;

        let mut invocation = Invocation::new(program)
            .arg("-S")
            .arg(format!("{routed_host},{routed_port}"))
            .arg("-U")
            .arg(&conn.username)
            .arg("-P")
            .secret_arg(&conn.password)
            .arg("-d")
            .arg("master")
            .arg("-i")
            .arg(script_path.to_string_lossy())
            .scratch_file(script_path);

        if conn.ssl {
            invocation = invocation.arg("-N");
        }

        Ok(invocation)
    }
}

/// The script lands next to the requested dump, with a literal `.sql` suffix
/// appended to the full name.
fn script_path_for(output_path: &Path) -> PathBuf {
    let mut raw = output_path.as_os_str().to_owned();
    raw.push(".sql");
    PathBuf::from(raw)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
