use std::sync::Arc;
use std::thread;

use clap::Parser;
use dumpwatch_lib::backup::{BackupConfig, BackupService, SystemProcessRunner};
use dumpwatch_lib::cli::{Action, BackupArgs, Cli};
use dumpwatch_lib::config::{
    self, AppConfig, FileStore, JsonlNotificationStore, LoadedConfig, NoCipher, NoMailTransport,
    NoTunnelTransport,
};
use dumpwatch_lib::connection::EngineKind;
use dumpwatch_lib::notify::NotificationDispatcher;
use dumpwatch_lib::tools::{install_hint, required_tool, ToolPathCache, ToolResolver};

fn main() {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    env_logger.try_init().expect("env_logger should not fail");

    let mut config = match config::load_or_init(&cli.config) {
        Ok(LoadedConfig::Loaded(config)) => config,
        Ok(LoadedConfig::TemplateWritten(path)) => {
            log::warn!(
                "Add your connections to {} and run again",
                path.display()
            );
            return;
        }
        Err(e) => {
            log::error!("Reading the config file failed: {e}");
            return;
        }
    };
    if let Some(output_root) = cli.output_root {
        config.backup.output_root = output_root;
    }

    match cli.action.unwrap_or_default() {
        Action::Backup(args) => backup(config, args),
        Action::Tools => tools(),
    }
}

fn backup(config: AppConfig, args: BackupArgs) {
    if config.notifications.as_ref().is_some_and(|p| p.email) {
        log::warn!(
            "Email notifications are enabled but no mail transport is wired; sends will fail"
        );
    }
    if config.connections.iter().any(|conn| conn.has_tunnel()) {
        log::warn!(
            "Connections declare SSH tunnels but no tunnel transport is wired; their runs will fail"
        );
    }

    let store = Arc::new(FileStore::new(&config));
    let notifications = Arc::new(JsonlNotificationStore::new(
        config.backup.output_root.join("notifications.jsonl"),
    ));
    let dispatcher = NotificationDispatcher::new(
        store.clone(),
        store.clone(),
        notifications,
        Arc::new(NoMailTransport),
        Arc::new(NoCipher),
    );
    let resolver = ToolResolver::new(Arc::new(ToolPathCache::new()));
    let service = Arc::new(BackupService::new(
        store.clone(),
        resolver,
        Arc::new(NoTunnelTransport),
        Arc::new(SystemProcessRunner),
        dispatcher,
        BackupConfig {
            output_root: config.backup.output_root.clone(),
            compress: config.backup.compress,
        },
    ));

    let selected = if args.connections.is_empty() {
        store.connection_ids()
    } else {
        args.connections
    };
    if selected.is_empty() {
        log::warn!("No connections configured, nothing to back up");
        return;
    }

    // one worker per connection, joined in order
    let workers: Vec<_> = selected
        .into_iter()
        .map(|id| {
            let service = Arc::clone(&service);
            let worker_id = id.clone();
            let worker = thread::spawn(move || service.run_backup(&worker_id));
            (id, worker)
        })
        .collect();

    for (id, worker) in workers {
        let result = worker.join().expect("no panic in backup worker");
        if let Err(e) = result {
            log::error!(target: "backup", "Backup of connection {id} resulted in a fatal error: {e}");
        }
    }
}

fn tools() {
    let resolver = ToolResolver::new(Arc::new(ToolPathCache::new()));
    for kind in EngineKind::ALL {
        let tool = required_tool(kind);
        match resolver.resolve(kind) {
            Some(dir) => println!("{kind}: {tool} found in {}", dir.display()),
            None => println!("{kind}: {tool} not found, {}", install_hint(kind)),
        }
    }
}
