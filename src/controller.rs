// ===============================
// src/controller.rs
// ===============================
//
// Satu controller = satu pasangan (instrument, account) + satu strategi.
// Semua handler dipanggil serial dari session::run, jadi state di sini
// tidak perlu lock.
//
// Alur per tick:
//   tick -> BarBuilder -> (bar closed? strategy.on_bar_closed) -> update()
// update():
//   positions <- ledger; gate tertutup -> skip; ada posisi -> cek close;
//   kosong -> long dulu, baru short.
//
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bars::BarBuilder;
use crate::domain::{Bar, Decision, Event, Instrument, MdTick, OrderRejected, Position, Side, Trade, VenueEvent};
use crate::executor::{ExecOutcome, OrderExecutor};
use crate::feed::now_ns;
use crate::gate::TradingGate;
use crate::gateway::Venue;
use crate::metrics::{BARS_CLOSED, CONFIG_STRATEGY, DECISIONS, REFUSALS, STOPS, VENUE_EVENTS};
use crate::positions::{net_quantity, position_counts, PositionCounts, PositionLedger};
use crate::posttrade::RunningTotals;
use crate::strategy::{SignalStrategy, StrategyError};

const QTY_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState { Created, Running, Stopped }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Submit or flatten refused synchronously.
    Refused(String),
    /// Venue rejected an order for the tracked pair after acknowledging it.
    Rejected(String),
    Shutdown,
    FeedClosed,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Refused(_) => "refused",
            StopReason::Rejected(_) => "rejected",
            StopReason::Shutdown => "shutdown",
            StopReason::FeedClosed => "feed_closed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradingParams {
    pub symbol: String,
    pub account: String,
    pub quantity: f64,
    pub strategy_id: u32,
    pub stop_loss_ticks: Option<u32>,
    pub take_profit_ticks: Option<u32>,
}

pub struct Controller<V: Venue> {
    params: TradingParams,
    strategy: SignalStrategy,
    venue: V,
    ledger: PositionLedger,
    executor: OrderExecutor,
    gate: TradingGate,
    totals: RunningTotals,
    counts: PositionCounts,
    bars: BarBuilder,
    state: ControllerState,
    stop_reason: Option<StopReason>,
    journal: Option<mpsc::Sender<Event>>,
}

impl<V: Venue> Controller<V> {
    pub fn new(params: TradingParams, strategy: SignalStrategy, venue: V, period_secs: u64) -> Self {
        let ledger = PositionLedger::new(params.symbol.as_str(), params.account.as_str());
        let executor = OrderExecutor::new(params.symbol.as_str(), params.account.as_str(), params.quantity, params.strategy_id)
            .with_brackets(params.stop_loss_ticks, params.take_profit_ticks);
        let bars = BarBuilder::new(params.symbol.as_str(), period_secs);
        Self {
            params,
            strategy,
            venue,
            ledger,
            executor,
            gate: TradingGate::new(),
            totals: RunningTotals::default(),
            counts: PositionCounts::default(),
            bars,
            state: ControllerState::Created,
            stop_reason: None,
            journal: None,
        }
    }

    pub fn with_journal(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.journal = Some(tx);
        self
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.journal {
            let _ = tx.try_send(ev);
        }
    }

    /// Warms up the strategy and moves to Running. A failed warm-up leaves the controller Created.
    pub fn start(&mut self, instrument: &Instrument, history: &[Bar]) -> Result<(), StrategyError> {
        if self.state != ControllerState::Created {
            warn!(state = ?self.state, "start ignored");
            return Ok(());
        }
        self.strategy.initialize(instrument, history)?;
        CONFIG_STRATEGY.with_label_values(&[self.strategy.name(), self.params.symbol.as_str()]).set(1);

        let positions = self.ledger.current_positions(&self.venue);
        self.refresh_counts(&positions);
        self.state = ControllerState::Running;
        info!(
            symbol = %self.params.symbol,
            account = %self.params.account,
            strategy = self.strategy.name(),
            qty = self.params.quantity,
            open_positions = positions.len(),
            "controller started"
        );
        self.record(Event::Note(format!("started {} on {}", self.strategy.name(), self.params.symbol)));
        Ok(())
    }

    /// Feeds one tick; a closed bar reaches the strategy before the update pass runs.
    pub fn on_tick(&mut self, md: &MdTick) -> Decision {
        if self.state != ControllerState::Running {
            return Decision::Hold;
        }
        if let Some(bar) = self.bars.on_tick(md) {
            self.on_bar_closed(bar);
        }
        self.update()
    }

    pub fn on_bar_closed(&mut self, bar: Bar) {
        if self.state != ControllerState::Running {
            return;
        }
        self.strategy.on_bar_closed(&bar);
        BARS_CLOSED.inc();
        debug!(open_ts_ns = bar.open_ts_ns, close = bar.close, "bar closed");
        self.record(Event::Bar(bar));
    }

    /// One decision pass. Returns what was acted on (Hold when skipped).
    pub fn update(&mut self) -> Decision {
        if self.state != ControllerState::Running {
            return Decision::Hold;
        }
        let positions = self.ledger.current_positions(&self.venue);
        if !self.gate.can_trade() {
            return Decision::Hold;
        }

        let decision = self.strategy.decide(!positions.is_empty());
        DECISIONS.with_label_values(&[decision.label()]).inc();
        if decision == Decision::Hold {
            return decision;
        }
        self.record(Event::Decision { ts_ns: now_ns(), symbol: self.params.symbol.clone(), decision });

        let outcome = match decision {
            Decision::Close => self.executor.execute_close(&positions, &mut self.gate, &mut self.venue),
            _ => {
                let side = if decision == Decision::OpenLong { Side::Buy } else { Side::Sell };
                let out = self.executor.execute_open(side, &mut self.gate, &mut self.venue);
                if let ExecOutcome::Submitted { source, .. } = &out {
                    self.record(Event::Ord(self.executor.entry_request(side, source)));
                }
                out
            }
        };

        if let ExecOutcome::Refused { source, reason } = outcome {
            self.stop(StopReason::Refused(format!("{source}: {reason}")));
        }
        decision
    }

    pub fn on_venue_event(&mut self, ev: VenueEvent) {
        if self.state != ControllerState::Running {
            debug!(kind = ev.kind(), "controller not running, venue event ignored");
            return;
        }
        if !self.ledger.tracks(ev.symbol(), ev.account()) {
            debug!(kind = ev.kind(), symbol = ev.symbol(), account = ev.account(), "event for another pair, ignored");
            return;
        }
        VENUE_EVENTS.with_label_values(&[ev.kind()]).inc();
        self.record(Event::Venue(ev.clone()));
        match ev {
            VenueEvent::PositionAdded(p) => self.on_position_added(&p),
            VenueEvent::PositionRemoved(p) => self.on_position_removed(&p),
            VenueEvent::OrderRejected(r) => self.on_order_rejected(&r),
            VenueEvent::TradeConfirmed(t) => self.on_trade_confirmed(&t),
        }
    }

    fn on_position_added(&mut self, pos: &Position) {
        let positions = self.ledger.current_positions(&self.venue);
        self.refresh_counts(&positions);
        let net = net_quantity(&positions);
        info!(position_id = pos.id, side = pos.side.label(), qty = pos.qty, net, "position added");
        if (net.abs() - self.params.quantity).abs() < QTY_EPS {
            self.gate.mark_opening(false);
        }
    }

    fn on_position_removed(&mut self, pos: &Position) {
        let positions = self.ledger.current_positions(&self.venue);
        self.refresh_counts(&positions);
        info!(position_id = pos.id, remaining = positions.len(), "position removed");
        if positions.is_empty() {
            self.gate.mark_closing(false);
        }
    }

    fn on_order_rejected(&mut self, rej: &OrderRejected) {
        error!(order_id = %rej.order_id, source = %rej.source, reason = %rej.reason, "order rejected by venue");
        REFUSALS.with_label_values(&["async"]).inc();
        self.stop(StopReason::Rejected(rej.reason.clone()));
    }

    fn on_trade_confirmed(&mut self, trade: &Trade) {
        self.totals.on_trade_confirmed(trade);
    }

    fn refresh_counts(&mut self, positions: &[Position]) {
        self.counts = position_counts(positions);
        self.counts.publish();
    }

    /// Idempotent. Only the first reason is kept; returns false when already stopped.
    pub fn stop(&mut self, reason: StopReason) -> bool {
        if self.state == ControllerState::Stopped {
            debug!(reason = reason.label(), "already stopped");
            return false;
        }
        match &reason {
            StopReason::Refused(msg) | StopReason::Rejected(msg) => {
                error!(reason = reason.label(), detail = %msg, "controller stopping")
            }
            _ => warn!(reason = reason.label(), "controller stopping"),
        }
        STOPS.inc();
        self.record(Event::Note(format!("stopped: {}", reason.label())));
        self.state = ControllerState::Stopped;
        self.stop_reason = Some(reason);
        true
    }

    /// Final teardown after the subscriptions are released: dispose indicators, log the summary.
    pub fn shutdown(&mut self) {
        if self.state != ControllerState::Stopped {
            self.stop(StopReason::Shutdown);
        }
        self.strategy.dispose();
        info!(
            reason = self.stop_reason.as_ref().map(|r| r.label()).unwrap_or("none"),
            gate = self.gate.label(),
            long = self.counts.long,
            short = self.counts.short,
            trades = self.totals.trades,
            net_pnl = self.totals.net_pnl,
            gross_pnl = self.totals.gross_pnl,
            fee = self.totals.fee,
            "controller summary"
        );
    }

    pub fn is_stopped(&self) -> bool { self.state == ControllerState::Stopped }
    pub fn state(&self) -> ControllerState { self.state }
    pub fn stop_reason(&self) -> Option<&StopReason> { self.stop_reason.as_ref() }
    pub fn gate(&self) -> TradingGate { self.gate }
    pub fn totals(&self) -> RunningTotals { self.totals }
    pub fn counts(&self) -> PositionCounts { self.counts }
    pub fn params(&self) -> &TradingParams { &self.params }
    pub fn strategy(&self) -> &SignalStrategy { &self.strategy }
    pub fn venue(&self) -> &V { &self.venue }
    pub fn venue_mut(&mut self) -> &mut V { &mut self.venue }
}
