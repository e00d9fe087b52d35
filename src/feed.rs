// ===============================
// src/feed.rs
// ===============================
//
// Market data adapters:
// - run_mock     : random-walk generator (~200 ticks/s)
// - mock_history : bar warm-up sintetis untuk inisialisasi indikator
//
// Notes:
// - Harga f64, spread 1 tick tetap.
//
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tokio::{sync::broadcast, time::sleep};

use crate::domain::{Bar, MdTick};
use crate::metrics::TICKS;

pub const MOCK_TICK_SIZE: f64 = 0.01;

pub fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}

/// Generator market data mock (random walk) ~200 ticks/s. Stops when every receiver is gone.
pub async fn run_mock(md_tx: broadcast::Sender<MdTick>, symbol: String, start_px: f64) {
    let floor = (start_px / 2.0).max(MOCK_TICK_SIZE);
    let mut px_bid = start_px;
    loop {
        // jangan simpan ThreadRng melewati .await
        let step = rand::thread_rng().gen_range(-3..=3) as f64 * MOCK_TICK_SIZE;
        px_bid = (px_bid + step).max(floor);
        let tick = MdTick {
            ts_ns: now_ns(),
            symbol: symbol.clone(),
            best_bid: px_bid,
            best_ask: px_bid + MOCK_TICK_SIZE,
        };
        if md_tx.send(tick).is_err() {
            break;
        }
        TICKS.inc();
        sleep(Duration::from_millis(5)).await;
    }
}

/// `bars` closed bars ending right before the current period. Shape is a slow
/// sine swing plus noise so every indicator gets crossings to chew on.
pub fn mock_history(symbol: &str, period_secs: u64, bars: usize, start_px: f64) -> Vec<Bar> {
    let period_ns = (period_secs.max(1) as i128) * 1_000_000_000;
    let current = now_ns().div_euclid(period_ns) * period_ns;
    let mut rng = rand::thread_rng();
    let mut prev_close = start_px;

    (0..bars)
        .map(|i| {
            let open_ts_ns = current - (bars - i) as i128 * period_ns;
            let swing = (i as f64 / 12.0).sin() * start_px * 0.01;
            let noise = rng.gen_range(-2..=2) as f64 * MOCK_TICK_SIZE;
            let close = (start_px + swing + noise).max(MOCK_TICK_SIZE);
            let open = prev_close;
            prev_close = close;
            Bar {
                symbol: symbol.to_string(),
                open_ts_ns,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
            }
        })
        .collect()
}
