use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use well_pits::{PitRegistry, RegistryConfig, run_sweeper};

#[derive(Parser)]
#[command(name = "welld", about = "welld — ephemeral real-time collaboration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pit server.
    Serve {
        /// Bind address; overrides config and HOST.
        #[arg(long)]
        bind: Option<String>,
        /// Port; overrides config and PORT.
        #[arg(long)]
        port: Option<u16>,
        /// Pits directory; overrides config and PITS_DIR.
        #[arg(long)]
        pits_dir: Option<PathBuf>,
        /// Idle TTL in minutes; overrides config and PIT_TTL_MINUTES.
        #[arg(long)]
        ttl_minutes: Option<u64>,
        /// Sweep interval in minutes; overrides config and
        /// CLEANUP_INTERVAL_MINUTES.
        #[arg(long)]
        cleanup_minutes: Option<u64>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "welld starting");

    match cli.command {
        Commands::Serve {
            bind,
            port,
            pits_dir,
            ttl_minutes,
            cleanup_minutes,
        } => serve(bind, port, pits_dir, ttl_minutes, cleanup_minutes).await,
    }
}

async fn serve(
    bind: Option<String>,
    port: Option<u16>,
    pits_dir: Option<PathBuf>,
    ttl_minutes: Option<u64>,
    cleanup_minutes: Option<u64>,
) -> anyhow::Result<()> {
    // Precedence: config file < environment < command line.
    let mut config = well_config::discover_and_load();
    well_config::apply_env_overrides(&mut config);
    if let Some(bind) = bind {
        config.server.host = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = pits_dir {
        config.pits.dir = dir.display().to_string();
    }
    if let Some(minutes) = ttl_minutes {
        config.pits.ttl_ms = minutes * 60 * 1000;
    }
    if let Some(minutes) = cleanup_minutes {
        config.pits.cleanup_interval_ms = minutes * 60 * 1000;
    }

    let registry = Arc::new(
        PitRegistry::open(RegistryConfig {
            dir: config.pits.dir.clone().into(),
            ttl: Duration::from_millis(config.pits.ttl_ms),
            cleanup_interval: Duration::from_millis(config.pits.cleanup_interval_ms),
        })
        .await?,
    );

    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&registry)));

    well_gateway::server::serve(
        Arc::clone(&registry),
        &config.server.host,
        config.server.port,
        shutdown_signal(),
    )
    .await?;

    // The listener is closed. Flush every pit to disk; shutdown is a flush,
    // never an eviction.
    sweeper.abort();
    registry.flush_all().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
