//! slservices - Straylight IRC Services
//!
//! Loads the configuration and database, then keeps the database saved
//! until asked to stop.

use anyhow::Context;
use parking_lot::Mutex;
use slircd_services::config::{self, Config, LogConfig, LogFormat};
use slircd_services::db::Database;
use slircd_services::persist::Persister;
use slircd_services::state::{LogNotifier, ServiceState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "services.toml";

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    match log.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    init_tracing(&config.log);

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    let flags = config::build_registry(&config.flags).context("building the access flag table")?;
    if let Err(errors) = config::validate_templates(&config.chanserv, &flags) {
        for e in &errors {
            error!(error = %e, "Invalid template");
        }
        anyhow::bail!("configuration has {} invalid template(s)", errors.len());
    }
    let settings = config.chanserv.acl_settings(&flags);
    info!(
        flags = flags.len(),
        templates = settings.templates.len(),
        maxchanacs = settings.maxchanacs,
        "Access flag table ready"
    );

    let mut state = ServiceState::new(flags, settings);
    let db = Database::from_config(&config.database, config.services.strict_mode);
    db.load(&mut state)
        .with_context(|| format!("loading database {}", db.path().display()))?;

    let repaired = state.repair_all();
    if repaired.stripped + repaired.deleted + repaired.founders_restored > 0 {
        warn!(
            stripped = repaired.stripped,
            deleted = repaired.deleted,
            founders = repaired.founders_restored,
            "Access lists repaired after load"
        );
    }

    let state = Arc::new(Mutex::new(state));
    let persister = Persister::new(Arc::new(db), Arc::clone(&state), Arc::new(LogNotifier));
    let (saver, save_task) =
        persister.spawn(Duration::from_secs(config.database.save_interval_secs));

    info!(
        name = %config.services.name,
        network = %config.services.network,
        "Services started"
    );

    shutdown_signal().await;
    info!("Shutting down");
    saver.shutdown().await;
    save_task.await.context("save task panicked")?;
    Ok(())
}
