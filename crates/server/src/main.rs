use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

use pizzeria_core::{
    create_notifier, load_config, load_config_from_env, validate_config, validate_role, Broker,
    Config, IntakeService, KitchenWorker, LivenessReaper, NotificationSubscriber, OrderStore,
    OrderType, ReceiptStore, ServiceRole, SqliteOrderStore, SqliteReceiptStore,
    SqliteWorkerRegistry, TrackingService, WorkerRegistry,
};
use pizzeria_server::api::create_router;
use pizzeria_server::logging::init_logging;
use pizzeria_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    /// HTTP intake and tracking, plus the liveness reaper
    Api,
    /// One kitchen worker
    Kitchen,
    /// Notification subscriber
    Notifier,
    /// Everything in one process
    All,
}

impl From<Role> for ServiceRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Api => ServiceRole::Api,
            Role::Kitchen => ServiceRole::Kitchen,
            Role::Notifier => ServiceRole::Notifier,
            Role::All => ServiceRole::All,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pizzeria", version, about = "Restaurant order pipeline")]
struct Cli {
    /// Configuration file. Missing files fall back to defaults plus environment.
    #[arg(long, env = "PIZZERIA_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Services to run in this process
    #[arg(value_enum)]
    role: Role,

    /// Kitchen worker name (overrides kitchen.worker_name)
    #[arg(long)]
    worker_name: Option<String>,

    /// Order types this kitchen accepts, e.g. dine_in,delivery
    #[arg(long, value_delimiter = ',')]
    order_types: Option<Vec<String>>,

    /// Kitchen heartbeat interval in milliseconds
    #[arg(long)]
    heartbeat_interval_ms: Option<u64>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(ref name) = self.worker_name {
            config.kitchen.worker_name = Some(name.clone());
        }
        if let Some(ref order_types) = self.order_types {
            config.kitchen.order_types = order_types
                .iter()
                .map(|s| s.parse::<OrderType>())
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid --order-types")?;
        }
        if let Some(interval) = self.heartbeat_interval_ms {
            config.kitchen.heartbeat_interval_ms = interval;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialised yet when configuration fails
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        load_config(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        load_config_from_env().context("Failed to load config from environment")?
    };
    cli.apply_overrides(&mut config)?;
    Ok(config)
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let role = ServiceRole::from(cli.role);

    let config = load(&cli)?;
    init_logging(config.logging.format);

    validate_config(&config).context("Configuration validation failed")?;
    validate_role(&config, role).context("Configuration invalid for role")?;

    info!(
        version = VERSION,
        role = role.as_str(),
        "Configuration loaded from {:?}",
        cli.config
    );
    info!("Database path: {:?}", config.database.path);

    let db_path = &config.database.path;
    let busy_timeout = config.database.busy_timeout();

    let orders: Arc<dyn OrderStore> = Arc::new(
        SqliteOrderStore::with_busy_timeout(db_path, busy_timeout)
            .context("Failed to open order store")?,
    );
    let registry: Arc<dyn WorkerRegistry> = Arc::new(
        SqliteWorkerRegistry::with_busy_timeout(db_path, busy_timeout)
            .context("Failed to open worker registry")?,
    );
    let broker = Broker::open(&config.broker, db_path, busy_timeout)
        .context("Failed to open message broker")?;
    info!(backend = ?config.broker.backend, "Stores and broker initialized");

    let window = config.liveness.window();

    // Kitchen worker
    let kitchen = if role.runs_kitchen() {
        let kitchen = KitchenWorker::new(
            config.kitchen.clone(),
            Arc::clone(&orders),
            Arc::clone(&registry),
            broker.clone(),
            window,
        );
        kitchen
            .start()
            .await
            .with_context(|| format!("Failed to start kitchen worker {}", kitchen.name()))?;
        info!(worker = kitchen.name(), "Kitchen worker started");
        Some(kitchen)
    } else {
        None
    };

    // Notification subscriber
    let subscriber = if role.runs_notifier() && config.notifier.enabled {
        let receipts: Arc<dyn ReceiptStore> = Arc::new(
            SqliteReceiptStore::with_busy_timeout(db_path, busy_timeout)
                .context("Failed to open receipt store")?,
        );
        let notifier = create_notifier(&config.notifier).context("Failed to create notifier")?;
        info!(notifier = notifier.name(), "Notification subscriber starting");

        let subscriber = Arc::new(
            NotificationSubscriber::new(
                broker.clone(),
                receipts,
                notifier,
                config.notifier.max_delivery_attempts,
            )
            .with_receipt_lease(config.notifier.receipt_lease()),
        );
        let handle = subscriber.start();
        Some((subscriber, handle))
    } else {
        if role.runs_notifier() {
            warn!("Notifier disabled in config");
        }
        None
    };

    // Liveness reaper runs alongside the API
    let reaper = if role.runs_api() && config.reaper.enabled {
        let reaper = Arc::new(LivenessReaper::new(
            Arc::clone(&orders),
            Arc::clone(&registry),
            broker.clone(),
            window,
            config.reaper.interval(),
        ));
        let handle = reaper.start();
        Some((reaper, handle))
    } else {
        None
    };

    if role.runs_api() {
        let intake = Arc::new(IntakeService::new(
            Arc::clone(&orders),
            broker.clone(),
            config.intake.clone(),
        ));
        let tracking = Arc::new(TrackingService::new(
            Arc::clone(&orders),
            Arc::clone(&registry),
            window,
        ));
        let state = Arc::new(AppState::new(config.clone(), intake, tracking));
        let app = create_router(state);

        let addr = SocketAddr::new(config.server.host, config.server.port);
        info!("Starting server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down...");

    if let Some((reaper, handle)) = reaper {
        reaper.stop();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    if let Some(kitchen) = kitchen {
        kitchen.stop().await;
        info!(worker = kitchen.name(), "Kitchen worker stopped");
    }

    if let Some((subscriber, handle)) = subscriber {
        subscriber.stop();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Notification subscriber stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
