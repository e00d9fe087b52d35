// ===============================
// src/strategy.rs
// ===============================
//
// Tiga varian sinyal, dipilih sekali saat konstruksi (bukan runtime switch):
// 1) MA Cross        -> fast SMA vs slow SMA
// 2) MACD Histogram  -> histogram ganti tanda
// 3) RSI Threshold   -> keluar dari zona oversold/overbought
//
// Semua query dievaluasi pada dua bar CLOSE terakhir (bars back 2 dan 1),
// tidak pernah pada bar yang masih berjalan.
//
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Bar, Decision, Instrument};
use crate::indicators::{Macd, Rsi, Sma, HISTOGRAM_LINE};

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("instrument symbol is empty")]
    EmptyInstrument,
    #[error("invalid indicator parameter: {0}")]
    InvalidParameter(String),
    #[error("history bar for {found} does not belong to {expected}")]
    ForeignHistory { expected: String, found: String },
}

/// How the MA variant decides to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaCloseRule {
    /// Close whenever fast != slow on the last closed bar. Practically always true.
    AnyOrdering,
    /// Close only when the fast/slow ordering flipped between the last two closed bars.
    FreshCross,
}

impl MaCloseRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any_ordering" | "any" => Some(MaCloseRule::AnyOrdering),
            "fresh_cross" | "cross" => Some(MaCloseRule::FreshCross),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyConfig {
    MaCross { fast: usize, slow: usize, close_rule: MaCloseRule },
    MacdHistogram { fast: usize, slow: usize, signal: usize },
    RsiThreshold { period: usize, overbought: f64, oversold: f64, neutral_low: f64, neutral_high: f64 },
}

impl StrategyConfig {
    pub fn ma_cross_default() -> Self {
        StrategyConfig::MaCross { fast: 5, slow: 10, close_rule: MaCloseRule::AnyOrdering }
    }
    pub fn macd_default() -> Self {
        StrategyConfig::MacdHistogram { fast: 12, slow: 26, signal: 9 }
    }
    pub fn rsi_default() -> Self {
        StrategyConfig::RsiThreshold { period: 14, overbought: 70.0, oversold: 30.0, neutral_low: 45.0, neutral_high: 55.0 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::MaCross { .. } => "ma_cross",
            StrategyConfig::MacdHistogram { .. } => "macd_histogram",
            StrategyConfig::RsiThreshold { .. } => "rsi_threshold",
        }
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        let bad = |msg: String| Err(StrategyError::InvalidParameter(msg));
        match *self {
            StrategyConfig::MaCross { fast, slow, .. } => {
                if fast == 0 || slow == 0 { return bad(format!("ma periods must be > 0 (fast={fast}, slow={slow})")); }
            }
            StrategyConfig::MacdHistogram { fast, slow, signal } => {
                if fast == 0 || slow == 0 || signal == 0 {
                    return bad(format!("macd periods must be > 0 ({fast}/{slow}/{signal})"));
                }
            }
            StrategyConfig::RsiThreshold { period, overbought, oversold, neutral_low, neutral_high } => {
                if period == 0 { return bad("rsi period must be > 0".into()); }
                let in_range = |v: f64| (0.0..=100.0).contains(&v);
                if ![overbought, oversold, neutral_low, neutral_high].into_iter().all(in_range) {
                    return bad("rsi levels must be within 0..=100".into());
                }
                if oversold >= overbought {
                    return bad(format!("oversold {oversold} must be below overbought {overbought}"));
                }
                if neutral_low >= neutral_high {
                    return bad(format!("neutral band {neutral_low}..{neutral_high} is empty"));
                }
            }
        }
        Ok(())
    }
}

// a[2] < b[2] && a[1] > b[1]
fn crossed_above(prev_a: f64, prev_b: f64, cur_a: f64, cur_b: f64) -> bool {
    prev_a < prev_b && cur_a > cur_b
}

fn crossed_below(prev_a: f64, prev_b: f64, cur_a: f64, cur_b: f64) -> bool {
    prev_a > prev_b && cur_a < cur_b
}

#[derive(Debug, Clone)]
pub struct MaCrossStrategy {
    fast: Sma,
    slow: Sma,
    fast_period: usize,
    slow_period: usize,
    close_rule: MaCloseRule,
}

impl MaCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize, close_rule: MaCloseRule) -> Self {
        Self { fast: Sma::new(fast_period), slow: Sma::new(slow_period), fast_period, slow_period, close_rule }
    }

    // (fast[2], slow[2], fast[1], slow[1])
    fn last_two(&self) -> Option<(f64, f64, f64, f64)> {
        Some((self.fast.value(2)?, self.slow.value(2)?, self.fast.value(1)?, self.slow.value(1)?))
    }

    fn on_close(&mut self, close: f64) {
        self.fast.update(close);
        self.slow.update(close);
    }

    fn is_long(&self) -> bool {
        self.last_two().is_some_and(|(f2, s2, f1, s1)| crossed_above(f2, s2, f1, s1))
    }

    fn is_short(&self) -> bool {
        self.last_two().is_some_and(|(f2, s2, f1, s1)| crossed_below(f2, s2, f1, s1))
    }

    fn should_close(&self) -> bool {
        match self.close_rule {
            MaCloseRule::AnyOrdering => match (self.fast.value(1), self.slow.value(1)) {
                (Some(f1), Some(s1)) => f1 < s1 || f1 > s1,
                _ => false,
            },
            MaCloseRule::FreshCross => self.is_long() || self.is_short(),
        }
    }

    fn clear(&mut self) {
        self.fast.clear();
        self.slow.clear();
    }
}

#[derive(Debug, Clone)]
pub struct MacdStrategy {
    macd: Macd,
    periods: (usize, usize, usize),
}

impl MacdStrategy {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { macd: Macd::new(fast, slow, signal), periods: (fast, slow, signal) }
    }

    fn histogram(&self) -> Option<(f64, f64)> {
        Some((self.macd.value(2, HISTOGRAM_LINE)?, self.macd.value(1, HISTOGRAM_LINE)?))
    }

    fn is_long(&self) -> bool {
        self.histogram().is_some_and(|(prev, cur)| prev < 0.0 && cur > 0.0)
    }

    fn is_short(&self) -> bool {
        self.histogram().is_some_and(|(prev, cur)| prev > 0.0 && cur < 0.0)
    }

    fn should_close(&self) -> bool {
        self.is_long() || self.is_short()
    }
}

#[derive(Debug, Clone)]
pub struct RsiStrategy {
    rsi: Rsi,
    period: usize,
    overbought: f64,
    oversold: f64,
    neutral_low: f64,
    neutral_high: f64,
}

impl RsiStrategy {
    pub fn new(period: usize, overbought: f64, oversold: f64, neutral_low: f64, neutral_high: f64) -> Self {
        Self { rsi: Rsi::new(period), period, overbought, oversold, neutral_low, neutral_high }
    }

    fn last_two(&self) -> Option<(f64, f64)> {
        Some((self.rsi.value(2)?, self.rsi.value(1)?))
    }

    fn is_long(&self) -> bool {
        self.last_two().is_some_and(|(prev, cur)| prev < self.oversold && cur > self.oversold)
    }

    fn is_short(&self) -> bool {
        self.last_two().is_some_and(|(prev, cur)| prev > self.overbought && cur < self.overbought)
    }

    fn should_close(&self) -> bool {
        self.rsi.value(1).is_some_and(|cur| cur > self.neutral_low && cur < self.neutral_high)
    }
}

/// The active signal strategy for one controller.
#[derive(Debug, Clone)]
pub enum SignalStrategy {
    MaCross(MaCrossStrategy),
    MacdHistogram(MacdStrategy),
    RsiThreshold(RsiStrategy),
}

impl SignalStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        match *cfg {
            StrategyConfig::MaCross { fast, slow, close_rule } => {
                SignalStrategy::MaCross(MaCrossStrategy::new(fast, slow, close_rule))
            }
            StrategyConfig::MacdHistogram { fast, slow, signal } => {
                SignalStrategy::MacdHistogram(MacdStrategy::new(fast, slow, signal))
            }
            StrategyConfig::RsiThreshold { period, overbought, oversold, neutral_low, neutral_high } => {
                SignalStrategy::RsiThreshold(RsiStrategy::new(period, overbought, oversold, neutral_low, neutral_high))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalStrategy::MaCross(_) => "ma_cross",
            SignalStrategy::MacdHistogram(_) => "macd_histogram",
            SignalStrategy::RsiThreshold(_) => "rsi_threshold",
        }
    }

    pub fn config(&self) -> StrategyConfig {
        match self {
            SignalStrategy::MaCross(s) => StrategyConfig::MaCross {
                fast: s.fast_period,
                slow: s.slow_period,
                close_rule: s.close_rule,
            },
            SignalStrategy::MacdHistogram(s) => {
                let (fast, slow, signal) = s.periods;
                StrategyConfig::MacdHistogram { fast, slow, signal }
            }
            SignalStrategy::RsiThreshold(s) => StrategyConfig::RsiThreshold {
                period: s.period,
                overbought: s.overbought,
                oversold: s.oversold,
                neutral_low: s.neutral_low,
                neutral_high: s.neutral_high,
            },
        }
    }

    /// Prepares indicator state from warm-up history. Errors are fatal for the controller.
    pub fn initialize(&mut self, instrument: &Instrument, history: &[Bar]) -> Result<(), StrategyError> {
        if instrument.symbol.trim().is_empty() {
            return Err(StrategyError::EmptyInstrument);
        }
        self.config().validate()?;
        if let Some(bar) = history.iter().find(|b| b.symbol != instrument.symbol) {
            return Err(StrategyError::ForeignHistory {
                expected: instrument.symbol.clone(),
                found: bar.symbol.clone(),
            });
        }
        self.dispose();
        for bar in history {
            self.on_bar_closed(bar);
        }
        info!(strategy = self.name(), symbol = %instrument.symbol, bars = history.len(), "indicators initialized");
        Ok(())
    }

    pub fn on_bar_closed(&mut self, bar: &Bar) {
        match self {
            SignalStrategy::MaCross(s) => s.on_close(bar.close),
            SignalStrategy::MacdHistogram(s) => s.macd.update(bar.close),
            SignalStrategy::RsiThreshold(s) => {
                s.rsi.update(bar.close);
            }
        }
    }

    pub fn is_long_signal(&self) -> bool {
        match self {
            SignalStrategy::MaCross(s) => s.is_long(),
            SignalStrategy::MacdHistogram(s) => s.is_long(),
            SignalStrategy::RsiThreshold(s) => s.is_long(),
        }
    }

    pub fn is_short_signal(&self) -> bool {
        match self {
            SignalStrategy::MaCross(s) => s.is_short(),
            SignalStrategy::MacdHistogram(s) => s.is_short(),
            SignalStrategy::RsiThreshold(s) => s.is_short(),
        }
    }

    pub fn should_close_position(&self) -> bool {
        match self {
            SignalStrategy::MaCross(s) => s.should_close(),
            SignalStrategy::MacdHistogram(s) => s.should_close(),
            SignalStrategy::RsiThreshold(s) => s.should_close(),
        }
    }

    /// Decision for one pass. Long is checked before short, so long wins a tie.
    pub fn decide(&self, has_positions: bool) -> Decision {
        if has_positions {
            if self.should_close_position() { Decision::Close } else { Decision::Hold }
        } else if self.is_long_signal() {
            Decision::OpenLong
        } else if self.is_short_signal() {
            Decision::OpenShort
        } else {
            Decision::Hold
        }
    }

    /// Drops all indicator history. Every query returns false afterwards.
    pub fn dispose(&mut self) {
        match self {
            SignalStrategy::MaCross(s) => s.clear(),
            SignalStrategy::MacdHistogram(s) => s.macd.clear(),
            SignalStrategy::RsiThreshold(s) => s.rsi.clear(),
        }
        debug!(strategy = self.name(), "indicators disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sma_with(values: &[f64]) -> Sma {
        let mut s = Sma::new(1);
        for v in values { s.update(*v); }
        s
    }

    fn ma(fast: &[f64], slow: &[f64], rule: MaCloseRule) -> SignalStrategy {
        SignalStrategy::MaCross(MaCrossStrategy {
            fast: sma_with(fast),
            slow: sma_with(slow),
            fast_period: 1,
            slow_period: 1,
            close_rule: rule,
        })
    }

    fn macd(hist: &[f64]) -> SignalStrategy {
        SignalStrategy::MacdHistogram(MacdStrategy { macd: Macd::with_histogram(hist), periods: (12, 26, 9) })
    }

    fn rsi(values: &[f64]) -> SignalStrategy {
        SignalStrategy::RsiThreshold(RsiStrategy {
            rsi: Rsi::with_values(values),
            period: 14,
            overbought: 70.0,
            oversold: 30.0,
            neutral_low: 45.0,
            neutral_high: 55.0,
        })
    }

    fn instrument(sym: &str) -> Instrument {
        Instrument { symbol: sym.into(), connection_id: "sim".into(), tick_size: 0.01 }
    }

    fn bar(sym: &str, i: i128, close: f64) -> Bar {
        Bar { symbol: sym.into(), open_ts_ns: i, open: close, high: close, low: close, close }
    }

    #[test]
    fn test_ma_cross_up_is_long() {
        let s = ma(&[9.0, 11.0], &[10.0, 10.0], MaCloseRule::AnyOrdering);
        assert!(s.is_long_signal());
        assert!(!s.is_short_signal());
        assert_eq!(s.decide(false), Decision::OpenLong);
    }

    #[test]
    fn test_ma_cross_down_is_short() {
        let s = ma(&[11.0, 9.0], &[10.0, 10.0], MaCloseRule::AnyOrdering);
        assert!(!s.is_long_signal());
        assert!(s.is_short_signal());
        assert_eq!(s.decide(false), Decision::OpenShort);
    }

    #[test]
    fn test_ma_any_ordering_close_is_true_unless_equal() {
        // literal close rule: fires on any non-equal ordering, even without a cross
        let s = ma(&[12.0, 12.0], &[10.0, 10.0], MaCloseRule::AnyOrdering);
        assert!(s.should_close_position());
        assert_eq!(s.decide(true), Decision::Close);

        let eq = ma(&[9.0, 10.0], &[10.0, 10.0], MaCloseRule::AnyOrdering);
        assert!(!eq.should_close_position());
        assert_eq!(eq.decide(true), Decision::Hold);
    }

    #[test]
    fn test_ma_fresh_cross_close_needs_flip() {
        let trending = ma(&[12.0, 12.0], &[10.0, 10.0], MaCloseRule::FreshCross);
        assert!(!trending.should_close_position());
        let flipped = ma(&[12.0, 9.0], &[10.0, 10.0], MaCloseRule::FreshCross);
        assert!(flipped.should_close_position());
    }

    #[test]
    fn test_macd_histogram_cross() {
        let up = macd(&[-0.5, 0.3]);
        assert!(up.is_long_signal());
        assert!(!up.is_short_signal());
        assert!(up.should_close_position());

        let down = macd(&[0.3, -0.5]);
        assert!(down.is_short_signal());
        assert!(!down.is_long_signal());
        assert!(down.should_close_position());

        let flat = macd(&[0.2, 0.3]);
        assert!(!flat.should_close_position());
        assert_eq!(flat.decide(false), Decision::Hold);
    }

    #[test]
    fn test_rsi_threshold() {
        let long = rsi(&[25.0, 35.0]);
        assert!(long.is_long_signal());
        assert!(!long.is_short_signal());

        let short = rsi(&[75.0, 65.0]);
        assert!(short.is_short_signal());

        let neutral = rsi(&[60.0, 50.0]);
        assert!(neutral.should_close_position());
        // band is exclusive
        assert!(!rsi(&[60.0, 55.0]).should_close_position());
        assert!(!rsi(&[40.0, 45.0]).should_close_position());
    }

    #[test]
    fn test_insufficient_history_never_signals() {
        let s = ma(&[11.0], &[10.0], MaCloseRule::FreshCross);
        assert!(!s.is_long_signal());
        assert!(!s.is_short_signal());
        assert!(!s.should_close_position());
        assert!(!macd(&[]).should_close_position());
    }

    #[test]
    fn test_initialize_replays_history() {
        let mut s = SignalStrategy::from_config(&StrategyConfig::MaCross {
            fast: 1,
            slow: 2,
            close_rule: MaCloseRule::AnyOrdering,
        });
        // closes 10,10,8,12 -> fast[2]=8 < slow[2]=9, fast[1]=12 > slow[1]=10
        let hist: Vec<Bar> = [10.0, 10.0, 8.0, 12.0].iter().enumerate().map(|(i, c)| bar("BTC", i as i128, *c)).collect();
        s.initialize(&instrument("BTC"), &hist).unwrap();
        assert!(s.is_long_signal());

        s.dispose();
        assert!(!s.is_long_signal());
        assert!(!s.should_close_position());
    }

    #[test]
    fn test_initialize_rejects_bad_context() {
        let mut s = SignalStrategy::from_config(&StrategyConfig::ma_cross_default());
        assert_eq!(s.initialize(&instrument(""), &[]), Err(StrategyError::EmptyInstrument));

        let foreign = vec![bar("ETH", 0, 1.0)];
        assert!(matches!(
            s.initialize(&instrument("BTC"), &foreign),
            Err(StrategyError::ForeignHistory { .. })
        ));

        let mut zero = SignalStrategy::from_config(&StrategyConfig::MaCross {
            fast: 0,
            slow: 10,
            close_rule: MaCloseRule::AnyOrdering,
        });
        assert!(matches!(zero.initialize(&instrument("BTC"), &[]), Err(StrategyError::InvalidParameter(_))));
    }

    #[test]
    fn test_validate_rsi_levels() {
        let bad = StrategyConfig::RsiThreshold { period: 14, overbought: 30.0, oversold: 70.0, neutral_low: 45.0, neutral_high: 55.0 };
        assert!(bad.validate().is_err());
        assert!(StrategyConfig::rsi_default().validate().is_ok());
        assert!(StrategyConfig::macd_default().validate().is_ok());
    }
}
