use clap::{Parser, Subcommand};
use klaxon::adapters::{
    CrossChainAdapter, DefiYieldAdapter, MarketDataAdapter, PostgresStore, SourceAdapter,
    WhaleAlertAdapter,
};
use klaxon::config::LoggingConfig;
use klaxon::coordination::{install_signal_handlers, GracefulShutdown};
use klaxon::pipeline::{
    AlertEvaluator, AnalyticsRunner, DashboardAggregator, MetricDeriver, SyncRunner,
};
use klaxon::scheduler::Scheduler;
use klaxon::services::{OpsServer, OpsState};
use klaxon::{AppConfig, KlaxonError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "klaxon", about = "Crypto market-event pipeline daemon")]
struct Cli {
    /// Configuration directory
    #[arg(long, env = "KLAXON_CONFIG_DIR", default_value = "config")]
    config_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline daemon
    Run,
    /// Apply database migrations and exit
    Migrate,
    /// Print per-handler sync status
    Status,
    /// Print unacknowledged alerts
    Alerts {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Acknowledge an alert by id
    Ack { id: i64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = dispatch(cli.command, config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Command, config: AppConfig) -> Result<()> {
    match command {
        Command::Run => run_daemon(config).await,
        Command::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await
        }
        Command::Status => {
            let store = connect(&config).await?;
            let now = chrono::Utc::now();
            for status in store.get_sync_statuses().await? {
                let staleness = status
                    .staleness_secs(now)
                    .map(|s| format!("{s}s ago"))
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<20} {:<9} last_sync: {:<12} records: {:<8} {}",
                    status.handler_name,
                    status.status.as_str(),
                    staleness,
                    status.records_synced,
                    status.error_message.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Command::Alerts { limit } => {
            let store = connect(&config).await?;
            for alert in store.unacknowledged_alerts(limit).await? {
                println!(
                    "#{:<6} {:<22} {:<8} {:<10} {}",
                    alert.id.unwrap_or(0),
                    alert.alert_type.as_str(),
                    alert.severity.as_str(),
                    alert.symbol,
                    alert.message
                );
            }
            Ok(())
        }
        Command::Ack { id } => {
            let store = connect(&config).await?;
            if store.acknowledge_alert(id).await? {
                println!("Alert {id} acknowledged");
                Ok(())
            } else {
                Err(KlaxonError::Internal(format!("no alert with id {id}")))
            }
        }
    }
}

async fn connect(config: &AppConfig) -> Result<PostgresStore> {
    PostgresStore::new(&config.database.url, config.database.max_connections).await
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {e}");
        }
        return Err(KlaxonError::Internal(
            "configuration validation failed".to_string(),
        ));
    }

    let store = connect(&config).await?;
    store.migrate().await?;

    let shutdown = Arc::new(GracefulShutdown::new());
    install_signal_handlers(Arc::clone(&shutdown)).await;

    let mut scheduler = Scheduler::new(Duration::from_millis(config.scheduler.stagger_ms));
    let store_handle = Arc::new(store.clone());

    // One sync job per source adapter; a degraded job flips its handler's
    // SyncStatus row without stopping the ticks.
    let sync_jobs: Vec<(Arc<dyn SourceAdapter>, u64)> = vec![
        (
            Arc::new(MarketDataAdapter::new(config.sources.market.clone())?),
            config.scheduler.market_sync_secs,
        ),
        (
            Arc::new(WhaleAlertAdapter::new(config.sources.whale.clone())?),
            config.scheduler.whale_sync_secs,
        ),
        (
            Arc::new(DefiYieldAdapter::new(config.sources.defi.clone())?),
            config.scheduler.defi_sync_secs,
        ),
        (
            Arc::new(CrossChainAdapter::new(config.sources.cross_chain.clone())?),
            config.scheduler.cross_chain_sync_secs,
        ),
    ];

    for (adapter, period_secs) in sync_jobs {
        let runner = Arc::new(SyncRunner::new(adapter, Arc::clone(&store_handle)));
        let name = runner.handler_name();
        let degraded_store = store.clone();

        scheduler.register_with_hook(
            name,
            Duration::from_secs(period_secs),
            move || {
                let runner = Arc::clone(&runner);
                Box::pin(async move { runner.run().await })
            },
            move |job_name: String| {
                let store = degraded_store.clone();
                Box::pin(async move {
                    if let Err(e) = store
                        .record_sync_degraded(&job_name, "3 consecutive sync failures")
                        .await
                    {
                        warn!("Could not record degraded status for {job_name}: {e}");
                    }
                })
            },
        )?;
    }

    let analytics = Arc::new(AnalyticsRunner::new(
        store.clone(),
        MetricDeriver::new(config.alerting.anomaly.clone()),
        AlertEvaluator::new(config.alerting.clone()),
        config.sources.cross_chain.notional_usd,
    ));
    scheduler.register(
        "analytics",
        Duration::from_secs(config.scheduler.analytics_secs),
        move || {
            let analytics = Arc::clone(&analytics);
            Box::pin(async move { analytics.run().await })
        },
    )?;

    let dashboard = Arc::new(DashboardAggregator::new(store.clone()));
    scheduler.register(
        "dashboard",
        Duration::from_secs(config.scheduler.dashboard_secs),
        move || {
            let dashboard = Arc::clone(&dashboard);
            Box::pin(async move { dashboard.run().await })
        },
    )?;

    let prune_store = store.clone();
    let retention_days = config.retention.price_days;
    scheduler.register(
        "prune",
        Duration::from_secs(config.scheduler.prune_secs),
        move || {
            let store = prune_store.clone();
            Box::pin(async move {
                let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
                store.prune_price_points(cutoff).await
            })
        },
    )?;

    let registry = scheduler.registry();
    let handle = scheduler.spawn(shutdown.subscribe());

    if let Some(port) = config.health_port {
        let ops = OpsServer::new(Arc::new(OpsState::new(store.clone(), registry)), port);
        tokio::spawn(async move {
            if let Err(e) = ops.run().await {
                error!("Ops server exited: {e}");
            }
        });
    }

    info!("Market-event pipeline running");
    handle.join().await;
    info!("All jobs drained, exiting");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("info,klaxon={},sqlx=warn", config.level))
    });

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so preflight writability before enabling it.
    let file_layer = config.dir.as_ref().and_then(|log_dir| {
        if std::fs::create_dir_all(log_dir).is_err() {
            eprintln!("Warning: could not create log directory {log_dir}, file logging disabled");
            return None;
        }
        let test_path = std::path::Path::new(log_dir).join(".klaxon_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(log_dir, "klaxon.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Keep the guard alive for the process lifetime
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: could not write to log directory {log_dir} ({e}), file logging disabled"
                );
                None
            }
        }
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
