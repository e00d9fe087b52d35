// ===============================
// src/order.rs
// ===============================
//
// Order request builder. One constructor for every order kind, with
// stop-loss / take-profit expressed as tick distance from the entry price.
//
use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Order behaviour as advertised by the venue (used for capability checks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderBehavior { Market, Limit, Stop }

impl OrderBehavior {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" | "mkt" => Some(OrderBehavior::Market),
            "limit" | "lmt" => Some(OrderBehavior::Limit),
            "stop" | "stp" => Some(OrderBehavior::Stop),
            _ => None,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            OrderBehavior::Market => "market",
            OrderBehavior::Limit => "limit",
            OrderBehavior::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
    Stop { trigger: f64 },
}

impl OrderKind {
    pub fn behavior(&self) -> OrderBehavior {
        match self {
            OrderKind::Market => OrderBehavior::Market,
            OrderKind::Limit { .. } => OrderBehavior::Limit,
            OrderKind::Stop { .. } => OrderBehavior::Stop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub kind: OrderKind,
    pub source: String,
    pub stop_loss_ticks: Option<u32>,
    pub take_profit_ticks: Option<u32>,
}

impl OrderRequest {
    pub fn new(account: impl Into<String>, symbol: impl Into<String>, side: Side, qty: f64, kind: OrderKind) -> Self {
        Self {
            account: account.into(),
            symbol: symbol.into(),
            side,
            qty,
            kind,
            source: String::new(),
            stop_loss_ticks: None,
            take_profit_ticks: None,
        }
    }

    pub fn market(account: impl Into<String>, symbol: impl Into<String>, side: Side, qty: f64) -> Self {
        Self::new(account, symbol, side, qty, OrderKind::Market)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_stop_loss(mut self, ticks: Option<u32>) -> Self {
        self.stop_loss_ticks = ticks;
        self
    }

    pub fn with_take_profit(mut self, ticks: Option<u32>) -> Self {
        self.take_profit_ticks = ticks;
        self
    }

    /// Absolute stop-loss price for a given fill price. Below entry for longs, above for shorts.
    pub fn stop_loss_price(&self, entry_px: f64, tick_size: f64) -> Option<f64> {
        self.stop_loss_ticks
            .map(|t| entry_px - self.side.sign() * t as f64 * tick_size)
    }

    pub fn take_profit_price(&self, entry_px: f64, tick_size: f64) -> Option<f64> {
        self.take_profit_ticks
            .map(|t| entry_px + self.side.sign() * t as f64 * tick_size)
    }
}

/// Source tag attached to every request for attribution in venue logs.
pub fn source_tag(prefix: &str, strategy_id: u32, symbol: &str, action: &str) -> String {
    let symbol = if symbol.is_empty() { "Unknown" } else { symbol };
    format!("{prefix}_{strategy_id}_{symbol}_{action}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_reads_back_inputs() {
        let req = OrderRequest::new("ACC-1", "BTCUSDT", Side::Sell, 2.5, OrderKind::Limit { price: 101.25 });
        assert_eq!(req.account, "ACC-1");
        assert_eq!(req.symbol, "BTCUSDT");
        assert_eq!(req.side, Side::Sell);
        assert_eq!(req.qty, 2.5);
        assert_eq!(req.kind, OrderKind::Limit { price: 101.25 });
        assert_eq!(req.kind.behavior(), OrderBehavior::Limit);
        assert!(req.source.is_empty());
        assert_eq!(req.stop_loss_ticks, None);
        assert_eq!(req.take_profit_ticks, None);
    }

    #[test]
    fn test_sl_tp_prices_follow_side() {
        let long = OrderRequest::market("A", "X", Side::Buy, 1.0)
            .with_stop_loss(Some(10))
            .with_take_profit(Some(20));
        assert_eq!(long.stop_loss_price(100.0, 0.5), Some(95.0));
        assert_eq!(long.take_profit_price(100.0, 0.5), Some(110.0));

        let short = OrderRequest::market("A", "X", Side::Sell, 1.0).with_stop_loss(Some(4));
        assert_eq!(short.stop_loss_price(100.0, 0.25), Some(101.0));
        assert_eq!(short.take_profit_price(100.0, 0.25), None);
    }

    #[test]
    fn test_source_tag() {
        assert_eq!(source_tag("MA_Cross", 7, "ETHUSDT", "open"), "MA_Cross_7_ETHUSDT_open");
        assert_eq!(source_tag("MA_Cross", 1, "", "close"), "MA_Cross_1_Unknown_close");
    }

    #[test]
    fn test_behavior_parse() {
        assert_eq!(OrderBehavior::parse(" Market "), Some(OrderBehavior::Market));
        assert_eq!(OrderBehavior::parse("stp"), Some(OrderBehavior::Stop));
        assert_eq!(OrderBehavior::parse("iceberg"), None);
    }
}
