// ===============================
// src/main.rs
// ===============================
/*
 # jalankan 2 menit dengan strategi MACD, journal ke file
 # SYMBOL dan ACCOUNT wajib (tidak ada default)
 SYMBOL=BTCUSDT ACCOUNT=paper STRATEGY=macd RUN_SECS=120 RECORD_FILE=data/events.jsonl cargo run --release

 # state controller
curl -s localhost:9898/metrics | egrep '^(config_strategy|positions_|pnl_|controller_stops)'
curl -s localhost:9898/metrics | grep '^gate_skips_total'
*/
/*
=============================================================================
Project : cross_bot — indicator-driven position controller in Rust
Module  : main.rs
Version : 0.1.0
Authors : cross_bot contributors
License : MIT (see LICENSE)

Summary : Watches one instrument/account pair, turns closed-bar indicator
          crosses (MA, MACD histogram, RSI) into market entries and
          flatten requests, gates duplicates until the venue confirms,
          accumulates PnL, exposes Prometheus metrics, and records JSONL
          events.

(c) 2025 cross_bot contributors.
=============================================================================
*/
use clap::Parser;
use std::process::ExitCode;
use tokio::{
    select,
    sync::{broadcast, mpsc, watch},
    time::{sleep, Duration},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cross_bot::{
    config::{self, Cli},
    controller::Controller,
    domain::{Event, MdTick, VenueEvent},
    feed,
    gateway::MockVenue,
    metrics, recorder,
    session::{self, Subscriptions},
    strategy::SignalStrategy,
};

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let cli = Cli::parse();
    let settings = match config::load(&cli) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "config error");
            return ExitCode::FAILURE;
        }
    };

    // ---- Buses ----
    let (md_tx, _md_rx) = broadcast::channel::<MdTick>(4096);
    let (venue_tx, venue_rx) = mpsc::channel::<VenueEvent>(1024);
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ---- Venue + startup checks ----
    let venue = MockVenue::new(settings.venue_cfg(), venue_tx);
    let instrument = match settings.validate(&venue) {
        Ok(i) => i,
        Err(e) => {
            error!(error = %e, "startup validation failed, controller not started");
            return ExitCode::FAILURE;
        }
    };

    // ---- Metrics ----
    metrics::init();
    metrics::serve_metrics(settings.metrics_port);

    info!(
        symbol = %settings.symbol,
        account = %settings.account,
        strategy = settings.strategy.name(),
        qty = settings.quantity,
        bar_secs = settings.period_secs,
        warmup = settings.warmup_bars,
        sl_ticks = ?settings.stop_loss_ticks,
        tp_ticks = ?settings.take_profit_ticks,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (journal, rec_task) = match settings.record_file.clone() {
        Some(path) => (Some(rec_tx), Some(tokio::spawn(recorder::run(rec_rx, path)))),
        None => (None, None),
    };

    // ---- Controller ----
    let history = feed::mock_history(&settings.symbol, settings.period_secs, settings.warmup_bars, settings.start_px);
    if let Some(last) = history.last() {
        venue.mark_price(&settings.symbol, last.close);
    }
    let _price_task = venue.track_prices(md_tx.subscribe());

    let strategy = SignalStrategy::from_config(&settings.strategy);
    let mut ctl = Controller::new(settings.trading_params(), strategy, venue, settings.period_secs);
    if let Some(tx) = journal.clone() {
        ctl = ctl.with_journal(tx);
    }
    if let Err(e) = ctl.start(&instrument, &history) {
        error!(error = %e, "strategy initialization failed, controller not started");
        return ExitCode::FAILURE;
    }

    // ---- Session ----
    let subs = Subscriptions::new(md_tx.subscribe(), venue_rx);
    let mut session = tokio::spawn(session::run(ctl, subs, shutdown_rx));

    // ---- FEED (Market Data) ----
    let start_px = history.last().map(|b| b.close).unwrap_or(settings.start_px);
    tokio::spawn(feed::run_mock(md_tx.clone(), settings.symbol.clone(), start_px));

    // ---- Shutdown: ctrl-c atau RUN_SECS ----
    let run_secs = settings.run_secs;
    tokio::spawn(async move {
        match run_secs {
            Some(secs) => {
                select! {
                    _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
                    _ = sleep(Duration::from_secs(secs)) => info!(secs, "run duration reached"),
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(?e, "ctrl-c handler failed");
                }
            }
        }
        let _ = shutdown_tx.send(true);
    });

    // ---- Heartbeat + record MD ----
    let mut md_rx_metrics = md_tx.subscribe();
    let mut tick_count: u64 = 0;
    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));

    let ctl = loop {
        select! {
            done = &mut session => match done {
                Ok(ctl) => break ctl,
                Err(e) => {
                    error!(?e, "session task failed");
                    return ExitCode::FAILURE;
                }
            },
            Ok(md) = md_rx_metrics.recv() => {
                tick_count += 1;
                if let Some(tx) = &journal {
                    let _ = tx.try_send(Event::Md(md));
                }
            },
            _ = heartbeat.tick() => {
                info!(ticks = tick_count, "heartbeat");
                tick_count = 0;
            }
        }
    };

    let totals = ctl.totals();
    let counts = ctl.counts();
    info!(
        state = ?ctl.state(),
        reason = ?ctl.stop_reason(),
        trades = totals.trades,
        net_pnl = totals.net_pnl,
        gross_pnl = totals.gross_pnl,
        fee = totals.fee,
        long = counts.long,
        short = counts.short,
        "stopped"
    );

    // tutup semua sender journal supaya recorder flush lalu selesai
    drop(ctl);
    drop(journal);
    if let Some(task) = rec_task {
        let _ = task.await;
    }
    ExitCode::SUCCESS
}
