// ===============================
// src/executor.rs
// ===============================
//
// Terjemahkan keputusan ke request venue:
// - open  : gate.mark_opening(true) DULU, baru submit market order
// - close : gate.mark_closing(true) DULU, baru satu flatten untuk pair ini
// Flag tidak di-clear di sini walau ditolak; yang clear hanya event konfirmasi.
//
use tracing::{error, info};

use crate::domain::{Position, Side, SubmitResult};
use crate::gate::TradingGate;
use crate::gateway::Venue;
use crate::metrics::{FLATTENS, ORDERS_SUBMITTED, REFUSALS};
use crate::order::{source_tag, OrderRequest};

pub const SOURCE_PREFIX: &str = "MA_Cross";

#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Submitted { source: String, order_id: Option<String> },
    Flattening { source: String, positions: usize },
    Refused { source: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct OrderExecutor {
    symbol: String,
    account: String,
    qty: f64,
    strategy_id: u32,
    stop_loss_ticks: Option<u32>,
    take_profit_ticks: Option<u32>,
}

impl OrderExecutor {
    pub fn new(symbol: impl Into<String>, account: impl Into<String>, qty: f64, strategy_id: u32) -> Self {
        Self {
            symbol: symbol.into(),
            account: account.into(),
            qty,
            strategy_id,
            stop_loss_ticks: None,
            take_profit_ticks: None,
        }
    }

    pub fn with_brackets(mut self, stop_loss_ticks: Option<u32>, take_profit_ticks: Option<u32>) -> Self {
        self.stop_loss_ticks = stop_loss_ticks;
        self.take_profit_ticks = take_profit_ticks;
        self
    }

    fn source(&self, action: &str) -> String {
        source_tag(SOURCE_PREFIX, self.strategy_id, &self.symbol, action)
    }

    pub fn entry_request(&self, side: Side, source: &str) -> OrderRequest {
        OrderRequest::market(self.account.as_str(), self.symbol.as_str(), side, self.qty)
            .with_source(source)
            .with_stop_loss(self.stop_loss_ticks)
            .with_take_profit(self.take_profit_ticks)
    }

    pub fn execute_open<V: Venue + ?Sized>(&self, side: Side, gate: &mut TradingGate, venue: &mut V) -> ExecOutcome {
        let source = self.source("open");
        gate.mark_opening(true);
        info!(source = %source, side = side.label(), qty = self.qty, "opening position");

        let req = self.entry_request(side, &source);
        let res = venue.submit(&req);
        ORDERS_SUBMITTED.with_label_values(&[side.label()]).inc();
        Self::interpret(res, source, |order_id, source| ExecOutcome::Submitted { source, order_id })
    }

    pub fn execute_close<V: Venue + ?Sized>(&self, positions: &[Position], gate: &mut TradingGate, venue: &mut V) -> ExecOutcome {
        let source = self.source("close");
        gate.mark_closing(true);
        info!(source = %source, positions = positions.len(), "flattening positions");

        let res = venue.flatten(&self.symbol, &self.account, &source);
        FLATTENS.inc();
        let n = positions.len();
        Self::interpret(res, source, move |_, source| ExecOutcome::Flattening { source, positions: n })
    }

    fn interpret(
        res: SubmitResult,
        source: String,
        ok: impl FnOnce(Option<String>, String) -> ExecOutcome,
    ) -> ExecOutcome {
        if res.is_success() {
            info!(source = %source, order_id = ?res.order_id, "request accepted");
            ok(res.order_id, source)
        } else {
            let reason = res.message.filter(|m| !m.is_empty()).unwrap_or_else(|| "Failure".to_string());
            error!(source = %source, %reason, "request refused by venue");
            REFUSALS.with_label_values(&["sync"]).inc();
            ExecOutcome::Refused { source, reason }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, Instrument, VenueEvent};
    use crate::gateway::{MockVenue, MockVenueCfg};
    use crate::order::{OrderBehavior, OrderKind};
    use tokio::sync::mpsc;

    fn venue() -> (MockVenue, mpsc::Receiver<VenueEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let cfg = MockVenueCfg {
            instruments: vec![Instrument { symbol: "BTCUSDT".into(), connection_id: "sim".into(), tick_size: 0.01 }],
            accounts: vec![Account { id: "paper".into(), connection_id: "sim".into() }],
            supported: vec![OrderBehavior::Market],
            fill_ms: 0,
            fee_per_trade: 0.0,
        };
        (MockVenue::new(cfg, tx), rx)
    }

    #[test]
    fn test_open_marks_gate_and_tags_source() {
        let (mut v, _rx) = venue();
        let ex = OrderExecutor::new("BTCUSDT", "paper", 1.0, 3).with_brackets(Some(20), None);
        let mut gate = TradingGate::new();

        let out = ex.execute_open(Side::Buy, &mut gate, &mut v);
        assert!(matches!(out, ExecOutcome::Submitted { ref source, .. } if source == "MA_Cross_3_BTCUSDT_open"));
        assert!(gate.awaiting_open());

        let sent = v.submitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, OrderKind::Market);
        assert_eq!(sent[0].stop_loss_ticks, Some(20));
        assert_eq!(sent[0].take_profit_ticks, None);
    }

    #[test]
    fn test_refused_open_keeps_flag() {
        let (mut v, _rx) = venue();
        v.arm_refusal("not enough margin");
        let ex = OrderExecutor::new("BTCUSDT", "paper", 1.0, 1);
        let mut gate = TradingGate::new();

        let out = ex.execute_open(Side::Sell, &mut gate, &mut v);
        assert_eq!(
            out,
            ExecOutcome::Refused { source: "MA_Cross_1_BTCUSDT_open".into(), reason: "not enough margin".into() }
        );
        assert!(gate.awaiting_open());
    }

    #[test]
    fn test_close_issues_single_flatten() {
        let (mut v, _rx) = venue();
        let ex = OrderExecutor::new("BTCUSDT", "paper", 1.0, 1);
        let mut gate = TradingGate::new();
        ex.execute_open(Side::Buy, &mut gate, &mut v);
        ex.execute_open(Side::Buy, &mut gate, &mut v);
        let positions = v.positions();
        assert_eq!(positions.len(), 2);

        let out = ex.execute_close(&positions, &mut gate, &mut v);
        assert!(matches!(out, ExecOutcome::Flattening { positions: 2, .. }));
        assert!(gate.awaiting_close());
        assert_eq!(v.flatten_count(), 1);
        assert!(v.positions().is_empty());
    }
}
