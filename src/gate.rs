// ===============================
// src/gate.rs
// ===============================
//
// Trading gate: dua flag independen, bukan satu enum, karena alur open dan
// close dipicu dari jalur kode yang berbeda.
// - set true tepat sebelum submit
// - di-clear hanya oleh event konfirmasi (bukan oleh ACK sinkron)
//
use serde::Serialize;
use tracing::{debug, info};

use crate::metrics::GATE_SKIPS;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TradingGate {
    awaiting_open: bool,
    awaiting_close: bool,
}

impl TradingGate {
    pub fn new() -> Self { Self::default() }

    /// False while any confirmation is pending. A skip is logged, never an error.
    pub fn can_trade(&self) -> bool {
        if self.awaiting_open {
            debug!("awaiting open confirmation, skip signal");
            GATE_SKIPS.with_label_values(&["open"]).inc();
            return false;
        }
        if self.awaiting_close {
            debug!("awaiting close confirmation, skip signal");
            GATE_SKIPS.with_label_values(&["close"]).inc();
            return false;
        }
        true
    }

    pub fn mark_opening(&mut self, waiting: bool) {
        let was = self.awaiting_open;
        self.awaiting_open = waiting;
        if was && !waiting {
            info!("open confirmed, gate released");
        }
    }

    pub fn mark_closing(&mut self, waiting: bool) {
        let was = self.awaiting_close;
        self.awaiting_close = waiting;
        if was && !waiting {
            info!("all positions closed, gate released");
        }
    }

    pub fn awaiting_open(&self) -> bool { self.awaiting_open }
    pub fn awaiting_close(&self) -> bool { self.awaiting_close }

    pub fn label(&self) -> &'static str {
        match (self.awaiting_open, self.awaiting_close) {
            (false, false) => "idle",
            (true, false) => "awaiting_open",
            (false, true) => "awaiting_close",
            (true, true) => "awaiting_both",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_gate_allows_trading() {
        let gate = TradingGate::new();
        assert!(gate.can_trade());
        assert_eq!(gate.label(), "idle");
    }

    #[test]
    fn test_either_flag_blocks() {
        let mut gate = TradingGate::new();
        gate.mark_opening(true);
        assert!(!gate.can_trade());
        gate.mark_opening(false);
        gate.mark_closing(true);
        assert!(!gate.can_trade());
        assert_eq!(gate.label(), "awaiting_close");
    }

    #[test]
    fn test_flags_are_independent() {
        let mut gate = TradingGate::new();
        gate.mark_opening(true);
        gate.mark_closing(true);
        gate.mark_closing(false);
        assert!(gate.awaiting_open());
        assert!(!gate.can_trade());
    }

    #[test]
    fn test_clearing_is_idempotent() {
        let mut gate = TradingGate::new();
        gate.mark_opening(false);
        gate.mark_closing(false);
        gate.mark_closing(false);
        assert_eq!(gate, TradingGate::default());
        assert!(gate.can_trade());
    }
}
