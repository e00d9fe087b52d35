// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

use crate::order::OrderRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side {
    pub fn sign(&self) -> f64 { match self { Side::Buy => 1.0, Side::Sell => -1.0 } }
    pub fn label(&self) -> &'static str { match self { Side::Buy => "long", Side::Sell => "short" } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdTick { pub ts_ns: i128, pub symbol: String, pub best_bid: f64, pub best_ask: f64 }
impl MdTick {
    pub fn mid(&self) -> f64 { (self.best_bid + self.best_ask) / 2.0 }
}

/// Closed OHLC bar. `open_ts_ns` is the start of the bar period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar { pub symbol: String, pub open_ts_ns: i128, pub open: f64, pub high: f64, pub low: f64, pub close: f64 }

/// What the strategy wants on this pass. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision { OpenLong, OpenShort, Close, Hold }
impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::OpenLong => "open_long",
            Decision::OpenShort => "open_short",
            Decision::Close => "close",
            Decision::Hold => "hold",
        }
    }
}

// Venue metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument { pub symbol: String, pub connection_id: String, pub tick_size: f64 }
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account { pub id: String, pub connection_id: String }

/// Open position as reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position { pub id: u64, pub symbol: String, pub account: String, pub side: Side, pub qty: f64, pub open_px: f64 }

/// Trade confirmation. PnL and fee are reported independently and may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub account: String,
    pub side: Side,
    pub qty: f64,
    pub px: f64,
    pub net_pnl: Option<f64>,
    pub gross_pnl: Option<f64>,
    pub fee: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejected { pub order_id: String, pub symbol: String, pub account: String, pub source: String, pub reason: String }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitStatus { Success, Failure }

/// Synchronous acknowledgment of a submit/flatten call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult { pub status: SubmitStatus, pub order_id: Option<String>, pub message: Option<String> }
impl SubmitResult {
    pub fn success(order_id: impl Into<String>) -> Self {
        Self { status: SubmitStatus::Success, order_id: Some(order_id.into()), message: None }
    }
    pub fn failure(message: impl Into<String>) -> Self {
        Self { status: SubmitStatus::Failure, order_id: None, message: Some(message.into()) }
    }
    pub fn is_success(&self) -> bool { self.status == SubmitStatus::Success }
}

/// Asynchronous confirmations pushed by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VenueEvent {
    PositionAdded(Position),
    PositionRemoved(Position),
    OrderRejected(OrderRejected),
    TradeConfirmed(Trade),
}
impl VenueEvent {
    pub fn symbol(&self) -> &str {
        match self {
            VenueEvent::PositionAdded(p) | VenueEvent::PositionRemoved(p) => &p.symbol,
            VenueEvent::OrderRejected(r) => &r.symbol,
            VenueEvent::TradeConfirmed(t) => &t.symbol,
        }
    }
    pub fn account(&self) -> &str {
        match self {
            VenueEvent::PositionAdded(p) | VenueEvent::PositionRemoved(p) => &p.account,
            VenueEvent::OrderRejected(r) => &r.account,
            VenueEvent::TradeConfirmed(t) => &t.account,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            VenueEvent::PositionAdded(_) => "position_added",
            VenueEvent::PositionRemoved(_) => "position_removed",
            VenueEvent::OrderRejected(_) => "order_rejected",
            VenueEvent::TradeConfirmed(_) => "trade_confirmed",
        }
    }
}

// Journal entries (recorder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Md(MdTick),
    Bar(Bar),
    Decision { ts_ns: i128, symbol: String, decision: Decision },
    Ord(OrderRequest),
    Venue(VenueEvent),
    Note(String),
}
