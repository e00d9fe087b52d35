// ===============================
// src/indicators.rs
// ===============================
//
// Indicator series dihitung hanya dari bar yang sudah close.
// Akses nilai pakai "bars back": 1 = bar close terakhir, 2 = sebelumnya.
//
// - Sma  : rolling sum window
// - Ema  : seed pakai SMA periode pertama
// - Macd : line 0 = macd, 1 = signal, 2 = histogram
// - Rsi  : simple mode (rata-rata gain/loss biasa, bukan Wilder)
//
use std::collections::VecDeque;

pub const HISTORY_CAP: usize = 512;

/// Bounded value history addressable by bars back.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    values: VecDeque<f64>,
    cap: usize,
}

impl Default for IndicatorSeries {
    fn default() -> Self { Self::with_capacity(HISTORY_CAP) }
}

impl IndicatorSeries {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(2);
        Self { values: VecDeque::with_capacity(cap), cap }
    }

    /// Build from values ordered oldest first.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut s = Self::default();
        for v in values { s.push(v); }
        s
    }

    pub fn push(&mut self, v: f64) {
        if self.values.len() == self.cap {
            self.values.pop_front();
        }
        self.values.push_back(v);
    }

    pub fn value(&self, bars_back: usize) -> Option<f64> {
        let len = self.values.len();
        if bars_back == 0 || bars_back > len { return None; }
        self.values.get(len - bars_back).copied()
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
    pub fn clear(&mut self) { self.values.clear(); }
}

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
    series: IndicatorSeries,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { period, window: VecDeque::with_capacity(period), sum: 0.0, series: IndicatorSeries::default() }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 { return None; }
        if self.window.len() == self.period {
            if let Some(x) = self.window.pop_front() { self.sum -= x; }
        }
        self.window.push_back(close);
        self.sum += close;
        if self.window.len() < self.period { return None; }
        let v = self.sum / self.period as f64;
        self.series.push(v);
        Some(v)
    }

    pub fn value(&self, bars_back: usize) -> Option<f64> { self.series.value(bars_back) }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.series.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    seed: Vec<f64>,
    last: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self { period, k: 2.0 / (period as f64 + 1.0), seed: Vec::with_capacity(period), last: None }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        if self.period == 0 { return None; }
        let next = match self.last {
            Some(prev) => (x - prev) * self.k + prev,
            None => {
                self.seed.push(x);
                if self.seed.len() < self.period { return None; }
                self.seed.iter().sum::<f64>() / self.period as f64
            }
        };
        self.last = Some(next);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.seed.clear();
        self.last = None;
    }
}

pub const MACD_LINE: usize = 0;
pub const SIGNAL_LINE: usize = 1;
pub const HISTOGRAM_LINE: usize = 2;

#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    lines: [IndicatorSeries; 3],
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            lines: Default::default(),
        }
    }

    pub fn update(&mut self, close: f64) {
        let f = self.fast.update(close);
        let s = self.slow.update(close);
        let (Some(f), Some(s)) = (f, s) else { return };
        let macd = f - s;
        self.lines[MACD_LINE].push(macd);
        if let Some(sig) = self.signal.update(macd) {
            self.lines[SIGNAL_LINE].push(sig);
            self.lines[HISTOGRAM_LINE].push(macd - sig);
        }
    }

    pub fn value(&self, bars_back: usize, line: usize) -> Option<f64> {
        self.lines.get(line).and_then(|l| l.value(bars_back))
    }

    pub fn clear(&mut self) {
        self.fast.clear();
        self.slow.clear();
        self.signal.clear();
        for l in self.lines.iter_mut() { l.clear(); }
    }

    #[cfg(test)]
    pub(crate) fn with_histogram(values: &[f64]) -> Self {
        let mut m = Self::new(12, 26, 9);
        m.lines[HISTOGRAM_LINE] = IndicatorSeries::from_values(values.iter().copied());
        m
    }
}

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    gains: VecDeque<f64>,
    losses: VecDeque<f64>,
    gain_sum: f64,
    loss_sum: f64,
    series: IndicatorSeries,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            gains: VecDeque::with_capacity(period),
            losses: VecDeque::with_capacity(period),
            gain_sum: 0.0,
            loss_sum: 0.0,
            series: IndicatorSeries::default(),
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close);
        let prev = prev?;
        if self.period == 0 { return None; }

        let change = close - prev;
        if self.gains.len() == self.period {
            if let Some(g) = self.gains.pop_front() { self.gain_sum -= g; }
            if let Some(l) = self.losses.pop_front() { self.loss_sum -= l; }
        }
        let (g, l) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        self.gains.push_back(g);
        self.losses.push_back(l);
        self.gain_sum += g;
        self.loss_sum += l;

        if self.gains.len() < self.period { return None; }
        let avg_gain = self.gain_sum / self.period as f64;
        let avg_loss = self.loss_sum / self.period as f64;
        let rsi = if avg_loss <= f64::EPSILON {
            if avg_gain <= f64::EPSILON { 50.0 } else { 100.0 }
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
        self.series.push(rsi);
        Some(rsi)
    }

    pub fn value(&self, bars_back: usize) -> Option<f64> { self.series.value(bars_back) }

    pub fn clear(&mut self) {
        self.prev_close = None;
        self.gains.clear();
        self.losses.clear();
        self.gain_sum = 0.0;
        self.loss_sum = 0.0;
        self.series.clear();
    }

    #[cfg(test)]
    pub(crate) fn with_values(values: &[f64]) -> Self {
        let mut r = Self::new(14);
        r.series = IndicatorSeries::from_values(values.iter().copied());
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_bars_back() {
        let s = IndicatorSeries::from_values([1.0, 2.0, 3.0]);
        assert_eq!(s.value(1), Some(3.0));
        assert_eq!(s.value(3), Some(1.0));
        assert_eq!(s.value(0), None);
        assert_eq!(s.value(4), None);
    }

    #[test]
    fn test_series_is_bounded() {
        let mut s = IndicatorSeries::with_capacity(3);
        for v in 0..10 { s.push(v as f64); }
        assert_eq!(s.len(), 3);
        assert_eq!(s.value(3), Some(7.0));
    }

    #[test]
    fn test_sma() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(1.0), None);
        assert_eq!(sma.update(2.0), None);
        assert_eq!(sma.update(3.0), Some(2.0));
        assert_eq!(sma.update(7.0), Some(4.0));
        assert_eq!(sma.value(2), Some(2.0));
        sma.clear();
        assert_eq!(sma.value(1), None);
    }

    #[test]
    fn test_ema_seeds_with_sma() {
        let mut ema = Ema::new(3);
        ema.update(2.0);
        ema.update(4.0);
        assert_eq!(ema.update(6.0), Some(4.0));
        // k = 0.5
        assert_eq!(ema.update(8.0), Some(6.0));
    }

    #[test]
    fn test_macd_histogram_turns_positive_on_rally() {
        let mut macd = Macd::new(3, 6, 3);
        for _ in 0..20 { macd.update(100.0); }
        assert_eq!(macd.value(1, HISTOGRAM_LINE), Some(0.0));
        for i in 1..=3 { macd.update(100.0 + i as f64 * 5.0); }
        assert!(macd.value(1, HISTOGRAM_LINE).unwrap() > 0.0);
        assert_eq!(macd.value(1, 7), None);
    }

    #[test]
    fn test_rsi_extremes() {
        let mut up = Rsi::new(3);
        for px in [1.0, 2.0, 3.0, 4.0] { up.update(px); }
        assert_eq!(up.value(1), Some(100.0));

        let mut flat = Rsi::new(3);
        for _ in 0..5 { flat.update(10.0); }
        assert_eq!(flat.value(1), Some(50.0));

        let mut mixed = Rsi::new(2);
        for px in [10.0, 12.0, 11.0] { mixed.update(px); }
        // avg gain 1, avg loss 0.5 -> rs 2 -> 66.67
        let v = mixed.value(1).unwrap();
        assert!((v - 66.666_666).abs() < 1e-3);
    }
}
