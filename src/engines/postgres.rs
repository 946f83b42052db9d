//! PostgreSQL dumps via `pg_dump`.

use std::path::Path;

use crate::connection::ConnectionDescriptor;
use crate::tools::ToolResolver;

use super::{resolved_tool, BuildError, DumpCommand, Invocation};

/// Plain-format `pg_dump` of a single database.
///
/// The password travels in the `PGPASSWORD` environment override; `pg_dump`
/// has no password flag and the environment keeps it out of the process list.
/// The invocation always targets the connection's own host and port, never
/// the routed endpoint: tunnel handling for PostgreSQL connections lives at
/// the connection layer, and this builder keeps that contract.
pub struct PgDump;

impl DumpCommand for PgDump {
    fn build(
        &self,
        resolver: &ToolResolver,
        conn: &ConnectionDescriptor,
        _routed_host: &str,
        _routed_port: u16,
        output_path: &Path,
    ) -> Result<Invocation, BuildError> {
        let program = resolved_tool(resolver, conn.engine)?;

        Ok(Invocation::new(program)
            .arg("-h")
            .arg(&conn.host)
            .arg("-p")
            .arg(conn.port.to_string())
            .arg("-U")
            .arg(&conn.username)
            .arg("-d")
            .arg(&conn.database)
            .arg("-f")
            .arg(output_path.to_string_lossy())
            .env("PGPASSWORD", &conn.password))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::EngineKind;
    use crate::engines::testutil::{connection, resolver_with_tool, tool_path};

    #[test]
    fn test_pg_dump_argv_and_password_env() {
        let (tmp, resolver) = resolver_with_tool(EngineKind::Postgresql);
        let conn = connection(EngineKind::Postgresql);

        let invocation = PgDump
            .build(&resolver, &conn, "db1", 5432, Path::new("/tmp/orders.dump"))
            .unwrap();

        assert_eq!(invocation.program(), tool_path(&tmp, EngineKind::Postgresql));
        let argv: Vec<&str> = invocation.argv().iter().map(String::as_str).collect();
        assert_eq!(
            argv,
            vec!["-h", "db1", "-p", "5432", "-U", "u", "-d", "orders", "-f", "/tmp/orders.dump"]
        );
        assert_eq!(
            invocation.env_overrides(),
            [("PGPASSWORD".to_string(), "p".to_string())]
        );
        assert!(invocation.scratch_files().is_empty());
    }

    #[test]
    fn test_pg_dump_ignores_routed_endpoint() {
        let (_tmp, resolver) = resolver_with_tool(EngineKind::Postgresql);
        let conn = connection(EngineKind::Postgresql);

        let invocation = PgDump
            .build(&resolver, &conn, "127.0.0.1", 55001, Path::new("/tmp/orders.dump"))
            .unwrap();

        let argv = invocation.argv();
        assert!(argv.contains(&"db1".to_string()));
        assert!(argv.contains(&"5432".to_string()));
        assert!(!argv.contains(&"127.0.0.1".to_string()));
        assert!(!argv.contains(&"55001".to_string()));
    }

    #[test]
    fn test_pg_dump_missing_tool() {
        let (tmp, resolver) = resolver_with_tool(EngineKind::Postgresql);
        std::fs::remove_file(tool_path(&tmp, EngineKind::Postgresql)).unwrap();
        let conn = connection(EngineKind::Postgresql);

        let err = PgDump
            .build(&resolver, &conn, "db1", 5432, Path::new("/tmp/orders.dump"))
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound { .. }));
    }
}
