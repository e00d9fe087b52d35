// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : cross_bot — indicator-driven position controller in Rust
Module  : config.rs
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
use dotenvy::dotenv;
use std::{env, str::FromStr};
use thiserror::Error;

use crate::controller::TradingParams;
use crate::domain::{Account, Instrument};
use crate::gateway::{MockVenueCfg, Venue};
use crate::order::OrderBehavior;
use crate::strategy::{MaCloseRule, StrategyConfig, StrategyError};

/// Command line overrides. Semua opsional; yang kosong jatuh ke ENV / default.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "cross_bot", version, about = "Indicator cross position controller")]
pub struct Cli {
    /// Instrument symbol (ENV: SYMBOL)
    #[arg(long)]
    pub symbol: Option<String>,
    /// Trading account id (ENV: ACCOUNT)
    #[arg(long)]
    pub account: Option<String>,
    /// ma_cross | macd | rsi (ENV: STRATEGY)
    #[arg(long)]
    pub strategy: Option<String>,
    /// Order quantity (ENV: QUANTITY)
    #[arg(long)]
    pub quantity: Option<f64>,
    /// JSONL journal path (ENV: RECORD_FILE)
    #[arg(long)]
    pub record_file: Option<String>,
    /// Stop after N seconds (ENV: RUN_SECS)
    #[arg(long)]
    pub run_secs: Option<u64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("instrument is not set")]
    MissingInstrument,
    #[error("instrument {0} is not known by the venue")]
    UnknownInstrument(String),
    #[error("account is not set")]
    MissingAccount,
    #[error("account {0} is not known by the venue")]
    UnknownAccount(String),
    #[error("instrument connection {symbol_conn} differs from account connection {account_conn}")]
    ConnectionMismatch { symbol_conn: String, account_conn: String },
    #[error("order kind {0} is not supported")]
    UnsupportedOrderKind(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

// ===== Strategi =====
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyMode {
    MaCross,
    MacdHistogram,
    RsiThreshold,
}

impl StrategyMode {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ma_cross" | "macross" | "ma" => Some(StrategyMode::MaCross),
            "macd" | "macd_histogram" => Some(StrategyMode::MacdHistogram),
            "rsi" | "rsi_threshold" => Some(StrategyMode::RsiThreshold),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // pair
    pub symbol: String,
    pub account: String,
    pub symbol_connection: String,
    pub account_connection: String,

    // order
    pub order_kind: OrderBehavior,
    pub quantity: f64,
    pub strategy_id: u32,
    pub stop_loss_ticks: Option<u32>,
    pub take_profit_ticks: Option<u32>,

    // strategy
    pub strategy: StrategyConfig,
    pub period_secs: u64,
    pub warmup_bars: usize,

    // simulated venue
    pub venue_symbols: Vec<String>,
    pub venue_accounts: Vec<String>,
    pub venue_order_kinds: Vec<OrderBehavior>,
    pub fill_ms: u64,
    pub fee_per_trade: f64,
    pub start_px: f64,

    // files/metrics/run
    pub metrics_port: u16,
    pub record_file: Option<String>,
    pub run_secs: Option<u64>,
}

fn list(raw: Option<String>, default: &str) -> Vec<String> {
    raw.unwrap_or_else(|| default.to_string())
        .split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

struct Env<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    // kosong dianggap tidak di-set
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn str_or(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn opt<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.raw(key) {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue { key, value: v }),
        }
    }

    fn num<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        Ok(self.opt(key)?.unwrap_or(default))
    }
}

/// Baca `.env` + ENV + argumen CLI.
pub fn load(cli: &Cli) -> Result<Settings, ConfigError> {
    let _ = dotenv();
    load_from(|k| env::var(k).ok(), cli)
}

pub fn load_from(lookup: impl Fn(&str) -> Option<String>, cli: &Cli) -> Result<Settings, ConfigError> {
    let env = Env(lookup);

    // ===== Pair =====
    // Tanpa default: instrument/account kosong = MissingInstrument/MissingAccount di validate()
    let symbol = cli.symbol.clone().or_else(|| env.raw("SYMBOL")).unwrap_or_default();
    let account = cli.account.clone().or_else(|| env.raw("ACCOUNT")).unwrap_or_default();
    let symbol_connection = env.str_or("SYMBOL_CONNECTION", "sim");
    let account_connection = env.str_or("ACCOUNT_CONNECTION", "sim");

    // ===== Order =====
    let kind_raw = env.str_or("ORDER_KIND", "market");
    let order_kind = OrderBehavior::parse(&kind_raw)
        .ok_or(ConfigError::InvalidValue { key: "ORDER_KIND", value: kind_raw })?;
    let quantity = match cli.quantity {
        Some(q) => q,
        None => env.num("QUANTITY", 1.0)?,
    };
    let strategy_id = env.num("STRATEGY_ID", 1)?;
    let stop_loss_ticks = env.opt("SL_TICKS")?;
    let take_profit_ticks = env.opt("TP_TICKS")?;

    // ===== Strategy =====
    // Contoh:
    //   STRATEGY=ma_cross MA_FAST=5 MA_SLOW=10 MA_CLOSE_RULE=fresh_cross
    //   STRATEGY=macd     MACD_FAST=12 MACD_SLOW=26 MACD_SIGNAL=9
    //   STRATEGY=rsi      RSI_PERIOD=14 RSI_OVERBOUGHT=70 RSI_OVERSOLD=30
    let mode_raw = cli.strategy.clone().or_else(|| env.raw("STRATEGY")).unwrap_or_else(|| "ma_cross".to_string());
    let mode = StrategyMode::parse_one(&mode_raw)
        .ok_or(ConfigError::InvalidValue { key: "STRATEGY", value: mode_raw })?;
    let strategy = match mode {
        StrategyMode::MaCross => {
            let rule_raw = env.str_or("MA_CLOSE_RULE", "any_ordering");
            let close_rule = MaCloseRule::parse(&rule_raw)
                .ok_or(ConfigError::InvalidValue { key: "MA_CLOSE_RULE", value: rule_raw })?;
            StrategyConfig::MaCross { fast: env.num("MA_FAST", 5)?, slow: env.num("MA_SLOW", 10)?, close_rule }
        }
        StrategyMode::MacdHistogram => StrategyConfig::MacdHistogram {
            fast: env.num("MACD_FAST", 12)?,
            slow: env.num("MACD_SLOW", 26)?,
            signal: env.num("MACD_SIGNAL", 9)?,
        },
        StrategyMode::RsiThreshold => StrategyConfig::RsiThreshold {
            period: env.num("RSI_PERIOD", 14)?,
            overbought: env.num("RSI_OVERBOUGHT", 70.0)?,
            oversold: env.num("RSI_OVERSOLD", 30.0)?,
            neutral_low: env.num("RSI_NEUTRAL_LOW", 45.0)?,
            neutral_high: env.num("RSI_NEUTRAL_HIGH", 55.0)?,
        },
    };
    let period_secs = env.num("BAR_SECS", 5)?;
    let warmup_bars = env.num("WARMUP_BARS", 100)?;

    // ===== Simulated venue =====
    let venue_symbols = list(env.raw("VENUE_SYMBOLS"), "BTCUSDT,ETHUSDT,SOLUSDT");
    let venue_accounts = list(env.raw("VENUE_ACCOUNTS"), "paper");
    let venue_order_kinds = list(env.raw("VENUE_ORDER_KINDS"), "market,limit")
        .into_iter()
        .map(|k| OrderBehavior::parse(&k).ok_or(ConfigError::InvalidValue { key: "VENUE_ORDER_KINDS", value: k }))
        .collect::<Result<Vec<_>, _>>()?;
    let fill_ms = env.num("FILL_MS", 50)?;
    let fee_per_trade = env.num("FEE_PER_TRADE", 0.0)?;
    let start_px = env.num("START_PX", 60_000.0)?;

    // ===== Files / metrics =====
    let metrics_port = env.num("METRICS_PORT", 9898)?;
    let record_file = cli.record_file.clone().or_else(|| env.raw("RECORD_FILE"));
    let run_secs = match cli.run_secs {
        Some(s) => Some(s),
        None => env.opt("RUN_SECS")?,
    };

    Ok(Settings {
        symbol,
        account,
        symbol_connection,
        account_connection,
        order_kind,
        quantity,
        strategy_id,
        stop_loss_ticks,
        take_profit_ticks,
        strategy,
        period_secs,
        warmup_bars,
        venue_symbols,
        venue_accounts,
        venue_order_kinds,
        fill_ms,
        fee_per_trade,
        start_px,
        metrics_port,
        record_file,
        run_secs,
    })
}

impl Settings {
    /// Startup checks against the venue. The returned instrument is what the controller trades.
    pub fn validate<V: Venue + ?Sized>(&self, venue: &V) -> Result<Instrument, ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::MissingInstrument);
        }
        if self.account.trim().is_empty() {
            return Err(ConfigError::MissingAccount);
        }
        let instrument = venue
            .instrument(&self.symbol)
            .ok_or_else(|| ConfigError::UnknownInstrument(self.symbol.clone()))?;
        let account = venue
            .account(&self.account)
            .ok_or_else(|| ConfigError::UnknownAccount(self.account.clone()))?;
        if instrument.connection_id != account.connection_id {
            return Err(ConfigError::ConnectionMismatch {
                symbol_conn: instrument.connection_id,
                account_conn: account.connection_id,
            });
        }
        // entry selalu market order
        if self.order_kind != OrderBehavior::Market || !venue.supports(self.order_kind) {
            return Err(ConfigError::UnsupportedOrderKind(self.order_kind.label().to_string()));
        }
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(ConfigError::InvalidValue { key: "QUANTITY", value: self.quantity.to_string() });
        }
        if self.period_secs == 0 {
            return Err(ConfigError::InvalidValue { key: "BAR_SECS", value: "0".into() });
        }
        self.strategy.validate()?;
        Ok(instrument)
    }

    pub fn trading_params(&self) -> TradingParams {
        TradingParams {
            symbol: self.symbol.clone(),
            account: self.account.clone(),
            quantity: self.quantity,
            strategy_id: self.strategy_id,
            stop_loss_ticks: self.stop_loss_ticks,
            take_profit_ticks: self.take_profit_ticks,
        }
    }

    pub fn venue_cfg(&self) -> MockVenueCfg {
        MockVenueCfg {
            instruments: self
                .venue_symbols
                .iter()
                .map(|s| Instrument { symbol: s.clone(), connection_id: self.symbol_connection.clone(), tick_size: 0.01 })
                .collect(),
            accounts: self
                .venue_accounts
                .iter()
                .map(|a| Account { id: a.clone(), connection_id: self.account_connection.clone() })
                .collect(),
            supported: self.venue_order_kinds.clone(),
            fill_ms: self.fill_ms,
            fee_per_trade: self.fee_per_trade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockVenue;
    use ahash::AHashMap as HashMap;
    use tokio::sync::mpsc;

    fn raw_settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        load_from(move |k| map.get(k).cloned(), &Cli::default())
    }

    // pair BTCUSDT/paper, overridable
    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let mut all = vec![("SYMBOL", "BTCUSDT"), ("ACCOUNT", "paper")];
        all.extend_from_slice(pairs);
        raw_settings(&all)
    }

    fn venue_for(s: &Settings) -> MockVenue {
        let (tx, _rx) = mpsc::channel(4);
        MockVenue::new(s.venue_cfg(), tx)
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.symbol, "BTCUSDT");
        assert_eq!(s.strategy, StrategyConfig::ma_cross_default());
        assert_eq!(s.quantity, 1.0);
        assert_eq!(s.stop_loss_ticks, None);
        let inst = s.validate(&venue_for(&s)).unwrap();
        assert_eq!(inst.connection_id, "sim");
    }

    #[test]
    fn test_missing_pair_is_fatal() {
        let s = raw_settings(&[]).unwrap();
        assert_eq!(s.symbol, "");
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::MissingInstrument);

        let s = raw_settings(&[("SYMBOL", ""), ("ACCOUNT", "paper")]).unwrap();
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::MissingInstrument);

        let s = raw_settings(&[("SYMBOL", "BTCUSDT"), ("ACCOUNT", "  ")]).unwrap();
        assert_eq!(s.account, "");
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::MissingAccount);
    }

    #[test]
    fn test_cli_overrides_env() {
        let map: HashMap<String, String> = [("STRATEGY", "rsi"), ("QUANTITY", "2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let cli = Cli { strategy: Some("macd".into()), quantity: Some(3.0), ..Cli::default() };
        let s = load_from(move |k| map.get(k).cloned(), &cli).unwrap();
        assert_eq!(s.strategy, StrategyConfig::macd_default());
        assert_eq!(s.quantity, 3.0);
    }

    #[test]
    fn test_bad_numbers_are_errors() {
        assert_eq!(
            settings(&[("QUANTITY", "lots")]).unwrap_err(),
            ConfigError::InvalidValue { key: "QUANTITY", value: "lots".into() }
        );
        assert!(matches!(settings(&[("STRATEGY", "magic")]), Err(ConfigError::InvalidValue { key: "STRATEGY", .. })));
    }

    #[test]
    fn test_validate_startup_errors() {
        let s = settings(&[("SYMBOL", "DOGEUSDT")]).unwrap();
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::UnknownInstrument("DOGEUSDT".into()));

        let s = settings(&[("ACCOUNT", "live")]).unwrap();
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::UnknownAccount("live".into()));

        let s = settings(&[("ACCOUNT_CONNECTION", "other")]).unwrap();
        assert!(matches!(s.validate(&venue_for(&s)), Err(ConfigError::ConnectionMismatch { .. })));

        let s = settings(&[("ORDER_KIND", "limit")]).unwrap();
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::UnsupportedOrderKind("limit".into()));

        let s = settings(&[("VENUE_ORDER_KINDS", "limit")]).unwrap();
        assert_eq!(s.validate(&venue_for(&s)).unwrap_err(), ConfigError::UnsupportedOrderKind("market".into()));

        let s = settings(&[("QUANTITY", "0")]).unwrap();
        assert!(matches!(s.validate(&venue_for(&s)), Err(ConfigError::InvalidValue { key: "QUANTITY", .. })));

        let s = settings(&[("MA_FAST", "0")]).unwrap();
        assert!(matches!(s.validate(&venue_for(&s)), Err(ConfigError::Strategy(_))));

    }
}
