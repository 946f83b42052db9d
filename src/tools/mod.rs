//! Discovery of the native dump tool binaries.
//!
//! Client tools are installed in wildly different places per platform
//! (versioned install directories on Windows, homebrew prefixes on macOS), so
//! resolution walks a platform-specific list of glob patterns and falls back
//! to `PATH`. Outcomes, including misses, are memoized in a process-wide
//! cache; a miss is only retried after [`ToolPathCache::clear`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::connection::EngineKind;

/// Executable (without platform suffix) that produces a dump for the engine.
pub fn required_tool(kind: EngineKind) -> &'static str {
    match kind {
        EngineKind::Postgresql => "pg_dump",
        EngineKind::Mysql | EngineKind::Mariadb => "mysqldump",
        EngineKind::Mongodb => "mongodump",
        EngineKind::Redis => "redis-cli",
        EngineKind::Mssql => "sqlcmd",
    }
}

/// Operator-facing hint attached to a missing-tool error.
pub fn install_hint(kind: EngineKind) -> &'static str {
    match kind {
        EngineKind::Postgresql => "install the PostgreSQL client tools",
        EngineKind::Mysql => "install the MySQL client tools",
        EngineKind::Mariadb => "install the MariaDB client tools",
        EngineKind::Mongodb => "install MongoDB Database Tools",
        EngineKind::Redis => "install the Redis CLI tools",
        EngineKind::Mssql => "install the SQL Server command line tools (sqlcmd)",
    }
}

/// Tool name qualified for the current platform (`.exe` suffix on Windows).
pub fn platform_executable_name(tool: &str) -> String {
    if cfg!(windows) {
        format!("{tool}.exe")
    } else {
        tool.to_string()
    }
}

/// Candidate directories searched before `PATH`, as glob patterns.
fn default_search_patterns() -> &'static [&'static str] {
    if cfg!(windows) {
        &[
            r"C:\Program Files\PostgreSQL\*\bin",
            r"C:\Program Files\MySQL\*\bin",
            r"C:\Program Files\MariaDB*\bin",
            r"C:\Program Files\MongoDB\*\bin",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/bin",
            "/usr/local/bin",
            "/opt/homebrew/opt/postgresql@*/bin",
            "/opt/homebrew/opt/mysql@*/bin",
        ]
    } else {
        &[
            "/usr/bin",
            "/usr/local/bin",
            "/opt/postgresql*/bin",
            "/opt/mysql*/bin",
        ]
    }
}

type CacheKey = (EngineKind, &'static str);

/// Process-wide memo of resolved tool directories.
///
/// `None` entries record a failed search; they are never retried within the
/// process, so installing a tool afterwards requires [`clear`](Self::clear)
/// (or a restart) to take effect. Constructed once at startup and shared via
/// `Arc` with every resolver.
#[derive(Debug, Default)]
pub struct ToolPathCache {
    inner: RwLock<HashMap<CacheKey, Option<PathBuf>>>,
}

impl ToolPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &CacheKey) -> Option<Option<PathBuf>> {
        // Entries are idempotent per key, so a poisoned lock still holds
        // usable data.
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(key).cloned()
    }

    fn store(&self, key: CacheKey, outcome: Option<PathBuf>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key, outcome);
    }

    /// Forgets every cached outcome, forcing the next lookup per key to
    /// search the filesystem again.
    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
    }
}

/// Locates the dump tool binary for an engine.
///
/// The search itself runs without holding the cache lock; two runs racing on
/// the same key may both search and the last write wins, which is harmless
/// because the outcome is deterministic for a given filesystem state.
pub struct ToolResolver {
    cache: std::sync::Arc<ToolPathCache>,
    search_patterns: Vec<String>,
    path_fallback: bool,
}

impl ToolResolver {
    /// Resolver over the platform's default search locations.
    pub fn new(cache: std::sync::Arc<ToolPathCache>) -> Self {
        let patterns = default_search_patterns()
            .iter()
            .map(|p| p.to_string())
            .collect();
        Self::with_search_patterns(cache, patterns)
    }

    /// Resolver over an explicit set of glob patterns, for deployments with
    /// nonstandard install prefixes.
    pub fn with_search_patterns(
        cache: std::sync::Arc<ToolPathCache>,
        search_patterns: Vec<String>,
    ) -> Self {
        Self {
            cache,
            search_patterns,
            path_fallback: true,
        }
    }

    /// Toggles the `PATH` fallback. Disabled, resolution only ever sees the
    /// configured search patterns, which keeps it hermetic for tests.
    pub fn path_fallback(mut self, enabled: bool) -> Self {
        self.path_fallback = enabled;
        self
    }

    /// Directory containing the engine's dump tool, or `None` when the tool
    /// cannot be found anywhere. Both outcomes are cached.
    pub fn resolve(&self, kind: EngineKind) -> Option<PathBuf> {
        let tool = required_tool(kind);
        let key = (kind, tool);

        if let Some(cached) = self.cache.lookup(&key) {
            log::trace!(target: "tools", "cached lookup for {tool} ({kind})");
            return cached;
        }

        let outcome = self.search(tool);
        match &outcome {
            Some(dir) => {
                log::debug!(target: "tools", "found {tool} for {kind} in {}", dir.display())
            }
            None => log::warn!(target: "tools", "{tool} for {kind} not found, caching the miss"),
        }
        self.cache.store(key, outcome.clone());
        outcome
    }

    /// Full path to the engine's dump tool executable.
    pub fn resolve_executable(&self, kind: EngineKind) -> Option<PathBuf> {
        let dir = self.resolve(kind)?;
        Some(dir.join(platform_executable_name(required_tool(kind))))
    }

    fn search(&self, tool: &str) -> Option<PathBuf> {
        let exec_name = platform_executable_name(tool);

        for pattern in &self.search_patterns {
            let candidates = match glob::glob(pattern) {
                Ok(paths) => paths,
                Err(e) => {
                    log::warn!(target: "tools", "skipping invalid search pattern {pattern}: {e}");
                    continue;
                }
            };
            for dir in candidates.flatten() {
                if dir.join(&exec_name).is_file() {
                    return Some(dir);
                }
            }
        }

        if self.path_fallback {
            search_path_env(&exec_name)
        } else {
            None
        }
    }
}

/// `PATH` fallback: the containing directory of the executable `which` finds.
/// Entries the current user cannot execute are skipped, so a plain file with
/// a colliding name earlier in `PATH` does not shadow the real tool.
fn search_path_env(exec_name: &str) -> Option<PathBuf> {
    let hit = which::which(exec_name).ok()?;
    Some(hit.parent()?.to_path_buf())
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
