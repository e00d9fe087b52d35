// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market data --------
pub static TICKS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ticks_total", "market data ticks").unwrap());

pub static BARS_CLOSED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("bars_closed_total", "closed bars fed to indicators").unwrap());

// -------- Decisions & trading actions --------
pub static DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("decisions_total", "update loop decisions (label: decision)"),
        &["decision"],
    )
    .unwrap()
});

pub static ORDERS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_submitted_total", "entry orders submitted (label: side)"),
        &["side"],
    )
    .unwrap()
});

pub static FLATTENS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("flatten_requests_total", "flatten requests issued").unwrap());

pub static REFUSALS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trading_refusals_total", "refusals seen (label: origin = sync|async)"),
        &["origin"],
    )
    .unwrap()
});

pub static GATE_SKIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gate_skips_total", "passes skipped while awaiting confirmation (label: waiting)"),
        &["waiting"],
    )
    .unwrap()
});

pub static VENUE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("venue_events_total", "venue confirmations handled (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static STOPS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("controller_stops_total", "controller stop transitions").unwrap());

// -------- Positions & PnL --------
pub static POSITIONS_LONG: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("positions_long", "open long positions").unwrap());

pub static POSITIONS_SHORT: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("positions_short", "open short positions").unwrap());

pub static PNL_NET: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_net_total", "net PnL after fees").unwrap());

pub static PNL_GROSS: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_gross_total", "gross PnL before fees").unwrap());

pub static FEES: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("fees_total", "cumulative trading fees").unwrap());

// ---- Config visibility ----
pub static CONFIG_STRATEGY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_strategy", "active strategy (labels: strategy, symbol)"),
        &["strategy", "symbol"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(TICKS.clone())),
        REGISTRY.register(Box::new(BARS_CLOSED.clone())),
        REGISTRY.register(Box::new(DECISIONS.clone())),
        REGISTRY.register(Box::new(ORDERS_SUBMITTED.clone())),
        REGISTRY.register(Box::new(FLATTENS.clone())),
        REGISTRY.register(Box::new(REFUSALS.clone())),
        REGISTRY.register(Box::new(GATE_SKIPS.clone())),
        REGISTRY.register(Box::new(VENUE_EVENTS.clone())),
        REGISTRY.register(Box::new(STOPS.clone())),
        REGISTRY.register(Box::new(POSITIONS_LONG.clone())),
        REGISTRY.register(Box::new(POSITIONS_SHORT.clone())),
        REGISTRY.register(Box::new(PNL_NET.clone())),
        REGISTRY.register(Box::new(PNL_GROSS.clone())),
        REGISTRY.register(Box::new(FEES.clone())),
        REGISTRY.register(Box::new(CONFIG_STRATEGY.clone())),
    ] {
        // double registration only happens in tests
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Tiny HTTP 1.1 responder, headers are drained but not parsed
fn handle_client(mut stream: TcpStream) {
    let mut req_buf = [0u8; 1024];
    let _ = stream.read(&mut req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Serves metrics from a dedicated OS thread. Port 0 disables the endpoint.
pub fn serve_metrics(port: u16) {
    if port == 0 {
        info!("metrics endpoint disabled");
        return;
    }
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
