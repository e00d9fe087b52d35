// ===============================
// src/bars.rs
// ===============================
use tracing::debug;

use crate::domain::{Bar, MdTick};

/// Aggregates ticks into fixed-period bars. A bar is only handed out once a
/// tick from a later period arrives, so callers never see the forming bar.
#[derive(Debug, Clone)]
pub struct BarBuilder {
    symbol: String,
    period_ns: i128,
    forming: Option<Bar>,
}

impl BarBuilder {
    pub fn new(symbol: impl Into<String>, period_secs: u64) -> Self {
        let period_ns = (period_secs.max(1) as i128) * 1_000_000_000;
        Self { symbol: symbol.into(), period_ns, forming: None }
    }

    pub fn forming(&self) -> Option<&Bar> { self.forming.as_ref() }

    /// Returns the bar that closed because of this tick, if any.
    pub fn on_tick(&mut self, md: &MdTick) -> Option<Bar> {
        if md.symbol != self.symbol { return None; }
        let px = md.mid();
        let start = md.ts_ns.div_euclid(self.period_ns) * self.period_ns;

        match self.forming.as_mut() {
            Some(bar) if start == bar.open_ts_ns => {
                bar.high = bar.high.max(px);
                bar.low = bar.low.min(px);
                bar.close = px;
                None
            }
            Some(bar) if start < bar.open_ts_ns => {
                debug!(ts_ns = md.ts_ns, "late tick for a closed bar, ignored");
                None
            }
            _ => {
                let next = Bar { symbol: self.symbol.clone(), open_ts_ns: start, open: px, high: px, low: px, close: px };
                self.forming.replace(next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts_s: i128, px: f64) -> MdTick {
        MdTick { ts_ns: ts_s * 1_000_000_000, symbol: "BTC".into(), best_bid: px, best_ask: px }
    }

    #[test]
    fn test_bar_closes_on_next_period() {
        let mut b = BarBuilder::new("BTC", 60);
        assert_eq!(b.on_tick(&tick(0, 10.0)), None);
        assert_eq!(b.on_tick(&tick(30, 12.0)), None);
        assert_eq!(b.on_tick(&tick(59, 9.0)), None);

        let closed = b.on_tick(&tick(60, 11.0)).unwrap();
        assert_eq!((closed.open, closed.high, closed.low, closed.close), (10.0, 12.0, 9.0, 9.0));
        assert_eq!(closed.open_ts_ns, 0);
        assert_eq!(b.forming().map(|f| f.close), Some(11.0));
    }

    #[test]
    fn test_late_and_foreign_ticks_ignored() {
        let mut b = BarBuilder::new("BTC", 60);
        b.on_tick(&tick(120, 10.0));
        assert_eq!(b.on_tick(&tick(30, 50.0)), None);
        let mut eth = tick(200, 1.0);
        eth.symbol = "ETH".into();
        assert_eq!(b.on_tick(&eth), None);
        assert_eq!(b.forming().map(|f| f.high), Some(10.0));
    }
}
