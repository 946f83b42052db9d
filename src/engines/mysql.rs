//! MySQL and MariaDB dumps via `mysqldump`.

use std::path::Path;

use crate::connection::ConnectionDescriptor;
use crate::tools::ToolResolver;

use super::{resolved_tool, BuildError, DumpCommand, Invocation};

/// `mysqldump` of a single database, shared by the mysql and mariadb engine
/// kinds.
///
/// The password is inlined as `-p<password>` with no separating space; that
/// is the only non-interactive channel the tool offers, and it is visible in
/// the host's process list for the duration of the dump. Moving to a
/// credential file would change the tool contract and is a deliberate
/// migration, not something to slip in here. TLS is explicit either way:
/// `--skip-ssl` when disabled, `--ssl-mode=REQUIRED` when enabled.
pub struct MysqlDump;

impl DumpCommand for MysqlDump {
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
            .arg("-P")
            .arg(routed_port.to_string())
            .arg("-u")
            .arg(&conn.username)
            .secret_arg(format!("-p{}", conn.password));

        invocation = if conn.ssl {
            invocation.arg("--ssl-mode=REQUIRED")
        } else {
            invocation.arg("--skip-ssl")
        };

        Ok(invocation
            .arg(&conn.database)
            .arg("-r")
            .arg(output_path.to_string_lossy()))
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
    use crate::engines::dump_command;

    #[test]
    fn test_mysqldump_argv_without_tls() {
        let (tmp, resolver) = resolver_with_tool(EngineKind::Mysql);
        let mut conn = connection(EngineKind::Mysql);
        conn.port = 3306;

        let invocation = MysqlDump
            .build(&resolver, &conn, "db1", 3306, Path::new("/tmp/orders.sql"))
            .unwrap();

        assert_eq!(invocation.program(), tool_path(&tmp, EngineKind::Mysql));
        let argv: Vec<&str> = invocation.argv().iter().map(String::as_str).collect();
        assert_eq!(
            argv,
            vec!["-h", "db1", "-P", "3306", "-u", "u", "-pp", "--skip-ssl", "orders", "-r", "/tmp/orders.sql"]
        );
        assert!(invocation.env_overrides().is_empty());
    }

    #[test]
    fn test_tls_flags_are_mutually_exclusive() {
        let (_tmp, resolver) = resolver_with_tool(EngineKind::Mysql);
        let mut conn = connection(EngineKind::Mysql);

        for ssl in [false, true] {
            conn.ssl = ssl;
            let invocation = MysqlDump
                .build(&resolver, &conn, "db1", 3306, Path::new("/tmp/o.sql"))
                .unwrap();
            let argv = invocation.argv();

            let skip = argv.iter().filter(|a| *a == "--skip-ssl").count();
            let require = argv.iter().filter(|a| *a == "--ssl-mode=REQUIRED").count();
            if ssl {
                assert_eq!((skip, require), (0, 1));
            } else {
                assert_eq!((skip, require), (1, 0));
            }
        }
    }

    #[test]
    fn test_mysqldump_targets_routed_endpoint() {
        let (_tmp, resolver) = resolver_with_tool(EngineKind::Mysql);
        let conn = connection(EngineKind::Mysql);

        let invocation = MysqlDump
            .build(&resolver, &conn, "127.0.0.1", 55002, Path::new("/tmp/o.sql"))
            .unwrap();

        let argv = invocation.argv();
        assert!(argv.contains(&"127.0.0.1".to_string()));
        assert!(argv.contains(&"55002".to_string()));
        assert!(!argv.contains(&"db1".to_string()));
    }

    #[test]
    fn test_mariadb_dispatches_to_mysqldump() {
        let (tmp, resolver) = resolver_with_tool(EngineKind::Mariadb);
        let conn = connection(EngineKind::Mariadb);

        let invocation = dump_command(EngineKind::Mariadb)
            .build(&resolver, &conn, "db1", 3306, Path::new("/tmp/o.sql"))
            .unwrap();

        assert_eq!(invocation.program(), tool_path(&tmp, EngineKind::Mariadb));
    }

    #[test]
    fn test_password_is_masked_in_rendering() {
        let (_tmp, resolver) = resolver_with_tool(EngineKind::Mysql);
        let conn = connection(EngineKind::Mysql);

        let invocation = MysqlDump
            .build(&resolver, &conn, "db1", 3306, Path::new("/tmp/o.sql"))
            .unwrap();

        let line = invocation.to_string();
        assert!(!line.contains("-pp"));
        assert!(line.contains("***"));
    }

    #[test]
    fn test_empty_password_degenerates_to_bare_flag() {
        let (_tmp, resolver) = resolver_with_tool(EngineKind::Mysql);
        let mut conn = connection(EngineKind::Mysql);
        conn.password = String::new();

        let invocation = MysqlDump
            .build(&resolver, &conn, "db1", 3306, Path::new("/tmp/o.sql"))
            .unwrap();

        assert!(invocation.argv().contains(&"-p".to_string()));
    }
}
