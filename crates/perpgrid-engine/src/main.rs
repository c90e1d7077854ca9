/*
[INPUT]:  CLI arguments, GRID_* environment, OS shutdown signals
[OUTPUT]: A running grid engine with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use perpgrid_adapter::{ExchangeAdapter, SimAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use perpgrid_engine::runtime::ensure_panic_hook_installed;
use perpgrid_engine::{Engine, GridSettings, JsonlOrderSink, NullSink, OrderSink};

#[derive(Parser, Debug)]
#[command(
    name = "perpgrid",
    version,
    about = "Symmetric grid-trading engine for perpetual futures"
)]
struct Cli {
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Validate configuration and exit without connecting.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;
    ensure_panic_hook_installed();

    let settings = GridSettings::from_env().context("load configuration from environment")?;
    log_settings(&settings);

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let adapter = build_adapter(&settings.exchange)?;
    let sink = build_sink(&settings)?;

    let mut engine = Engine::new(settings, adapter, sink);
    let shutdown = engine.shutdown_token();
    setup_signal_handlers(shutdown.clone());

    engine.start().await.context("start engine")?;

    shutdown.cancelled().await;
    info!("shutdown signal received");

    engine.stop().await.context("stop engine")?;
    Ok(())
}

fn build_adapter(exchange: &str) -> Result<Arc<dyn ExchangeAdapter>> {
    match exchange {
        "sim" => Ok(Arc::new(SimAdapter::new())),
        other => bail!("unsupported EXCHANGE tag: {other} (supported: sim)"),
    }
}

fn build_sink(settings: &GridSettings) -> Result<Arc<dyn OrderSink>> {
    match &settings.db_path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create sink directory {}", parent.display()))?;
            }
            info!(path = %path.display(), "order records will be appended as JSON lines");
            Ok(Arc::new(JsonlOrderSink::create(path.clone())))
        }
        None => {
            info!("DB_PATH not set; order records will not be persisted");
            Ok(Arc::new(NullSink))
        }
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    let log_dir = std::env::current_dir()
        .context("resolve current directory")?
        .join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;
    let file_appender = rolling::daily(&log_dir, "perpgrid.log");
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(filter.clone());
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(filter);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn log_settings(settings: &GridSettings) {
    info!(
        strategy_id = %settings.strategy_id,
        symbol = %settings.symbol,
        exchange = %settings.exchange,
        levels_per_side = settings.levels_per_side,
        spacing = ?settings.spacing,
        order_qty = %settings.order_qty,
        post_only = settings.post_only,
        cancel_timeout_ms = settings.cancel_timeout.as_millis() as u64,
        max_position = %settings.max_position,
        max_open_orders = settings.max_open_orders,
        "grid configuration confirmed"
    );
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
