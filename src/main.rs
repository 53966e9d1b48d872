use anyhow::{Context, Result};
use clap::Parser;
use mtfbot::api::{HistoryProvider, KrakenRestClient};
use mtfbot::engine::{DecisionLoop, EngineContext};
use mtfbot::execution::{CandleBuffer, PaperBroker, PositionManager};
use mtfbot::feed::{KrakenStream, StreamSupervisor};
use mtfbot::indicators::IndicatorPipeline;
use mtfbot::settings::{BotConfig, TriggerMode};
use mtfbot::strategy::SignalClassifier;
use mtfbot::TimeframeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Multi-timeframe trading bot for a single Kraken pair
#[derive(Parser)]
#[command(name = "mtfbot")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML/YAML); environment variables MTFBOT__* override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// When to run a decision cycle
    #[arg(long, value_enum)]
    trigger: Option<TriggerMode>,

    /// Seconds between cycles in interval mode
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Trade for real instead of paper trading
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut config =
        BotConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(trigger) = cli.trigger {
        config.engine.trigger = trigger;
    }
    if let Some(secs) = cli.interval_secs {
        config.engine.interval_secs = secs;
    }
    if cli.live {
        config.paper.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    if !config.paper.enabled {
        anyhow::bail!(
            "Live trading needs an authenticated order executor and account provider; \
             none is available, run in paper mode"
        );
    }

    tracing::info!(
        pair = %config.instrument.ws_pair,
        short = %config.timeframes.short,
        long = %config.timeframes.long,
        confirm = %config.timeframes.confirm,
        trigger = ?config.engine.trigger,
        paper_balance = config.paper.balance,
        "mtfbot starting"
    );

    let buffer = CandleBuffer::new(&config.timeframes.all(), config.engine.required_history);
    let rest = KrakenRestClient::new(
        &config.instrument.rest_url,
        &config.instrument.rest_pair,
        config.risk.min_quantity,
    )
    .context("Failed to create Kraken REST client")?;
    seed_history(&rest, &buffer, config.timeframes).await;

    let broker = Arc::new(PaperBroker::new(config.paper.balance));
    let position = Arc::new(Mutex::new(PositionManager::new(config.risk.clone())));
    let ctx = EngineContext {
        buffer: buffer.clone(),
        timeframes: config.timeframes,
        instrument: config.instrument.clone(),
        pipeline: IndicatorPipeline::new(config.indicators.clone()),
        classifier: SignalClassifier::new(config.strategy.clone()),
        position: position.clone(),
        executor: broker.clone(),
        account: broker.clone(),
        precision: Arc::new(rest),
    };

    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = StreamSupervisor::new(config.stream.clone(), config.timeframes);
    let stream_state = supervisor.watch_state();
    let mut stream = KrakenStream::new(&config.instrument.ws_url, &config.instrument.ws_pair);
    let feed_shutdown = shutdown_rx.clone();
    let feed_task = tokio::spawn(async move {
        supervisor
            .run(&mut stream, &buffer, &updates_tx, feed_shutdown)
            .await
    });

    let decision_loop = DecisionLoop::new(ctx, config.engine.clone());
    let decision_task =
        tokio::spawn(async move { decision_loop.run(updates_rx, shutdown_rx).await });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let feed_result = feed_task.await.context("Stream task panicked")?;
    let decision_result = decision_task.await.context("Decision task panicked")?;

    {
        let position = position.lock().await;
        let ledger = broker.ledger()?;
        let final_stream_state = *stream_state.borrow();
        tracing::info!(
            stream_state = ?final_stream_state,
            round_trips = position.round_trips(),
            realized_pnl = position.total_pnl(),
            still_long = position.is_long(),
            quote = ledger.quote,
            base = ledger.base,
            "Session summary"
        );
    }

    feed_result.context("Market stream failed")?;
    decision_result.context("Decision loop failed")?;
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mtfbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Seed every timeframe from REST history; a timeframe that cannot be seeded
/// fills up from the stream instead
async fn seed_history(rest: &KrakenRestClient, buffer: &CandleBuffer, timeframes: TimeframeSet) {
    for timeframe in timeframes.all() {
        let seeded = match rest.fetch(timeframe, None).await {
            Ok(candles) => buffer.seed(timeframe, candles),
            Err(e) => Err(e),
        };
        match seeded {
            Ok(()) => tracing::info!(
                %timeframe,
                candles = buffer.candle_count(timeframe).unwrap_or(0),
                "Seeded history"
            ),
            Err(e) => tracing::warn!(
                %timeframe,
                error = %e,
                "Could not seed history, waiting for the stream to fill it"
            ),
        }
    }
}
