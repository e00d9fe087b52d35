// ===============================
// src/gateway.rs
// ===============================
//
// Venue interface + simulated venue.
// - submit/flatten dijawab sinkron (ACK atau refuse)
// - fill / close datang belakangan lewat channel VenueEvent setelah `fill_ms`
// - buku posisi di-share (Arc<Mutex>) supaya positions() selalu baca state terbaru
//
use ahash::AHashMap as HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{debug, info, warn};

use crate::domain::{Account, Instrument, MdTick, OrderRejected, Position, Side, SubmitResult, Trade, VenueEvent};
use crate::order::{OrderBehavior, OrderRequest};

/// Order gateway, position source and metadata lookup for one venue.
pub trait Venue {
    fn instrument(&self, symbol: &str) -> Option<Instrument>;
    fn account(&self, id: &str) -> Option<Account>;
    fn supports(&self, behavior: OrderBehavior) -> bool;
    /// All open positions on the venue, every instrument and account.
    fn positions(&self) -> Vec<Position>;
    fn submit(&mut self, req: &OrderRequest) -> SubmitResult;
    fn flatten(&mut self, symbol: &str, account: &str, source: &str) -> SubmitResult;
}

#[derive(Debug, Clone)]
pub struct MockVenueCfg {
    pub instruments: Vec<Instrument>,
    pub accounts: Vec<Account>,
    pub supported: Vec<OrderBehavior>,
    pub fill_ms: u64,
    pub fee_per_trade: f64,
}

// Harga absolut SL/TP per posisi, dihitung saat fill dari tick_size instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bracket {
    stop: Option<f64>,
    take: Option<f64>,
}

impl Bracket {
    fn hit(&self, side: Side, px: f64) -> Option<&'static str> {
        let (stop_hit, take_hit) = match side {
            Side::Buy => (self.stop.is_some_and(|s| px <= s), self.take.is_some_and(|t| px >= t)),
            Side::Sell => (self.stop.is_some_and(|s| px >= s), self.take.is_some_and(|t| px <= t)),
        };
        if stop_hit {
            Some("stop_loss")
        } else if take_hit {
            Some("take_profit")
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct Book {
    positions: HashMap<u64, Position>,
    brackets: HashMap<u64, Bracket>,
    last_px: HashMap<String, f64>,
    next_id: u64,
    refuse_next: Option<String>,
    reject_next: Option<String>,
    submitted: Vec<OrderRequest>,
    flattens: u32,
}

impl Book {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Removes the position at `px` and returns PositionRemoved + the realizing TradeConfirmed.
    fn close_position(&mut self, id: u64, px: f64, fee: f64) -> Vec<VenueEvent> {
        let Some(pos) = self.positions.remove(&id) else { return Vec::new() };
        self.brackets.remove(&id);
        let gross = (px - pos.open_px) * pos.qty * pos.side.sign();
        let trade = Trade {
            id: self.next_id(),
            symbol: pos.symbol.clone(),
            account: pos.account.clone(),
            side: match pos.side { Side::Buy => Side::Sell, Side::Sell => Side::Buy },
            qty: pos.qty,
            px,
            net_pnl: Some(gross - fee),
            gross_pnl: Some(gross),
            fee: Some(fee),
        };
        vec![VenueEvent::PositionRemoved(pos), VenueEvent::TradeConfirmed(trade)]
    }

    /// New price for `symbol`; closes every position whose bracket it crosses.
    fn on_price(&mut self, symbol: &str, px: f64, fee: f64) -> Vec<VenueEvent> {
        self.last_px.insert(symbol.to_string(), px);
        let mut hits: Vec<(u64, &'static str)> = self
            .positions
            .values()
            .filter(|p| p.symbol == symbol)
            .filter_map(|p| {
                let bracket = self.brackets.get(&p.id)?;
                bracket.hit(p.side, px).map(|why| (p.id, why))
            })
            .collect();
        hits.sort_unstable_by_key(|(id, _)| *id);

        let mut events = Vec::with_capacity(hits.len() * 2);
        for (id, why) in hits {
            info!(position_id = id, px, exit = why, "mock venue: bracket triggered");
            events.extend(self.close_position(id, px, fee));
        }
        events
    }
}

#[derive(Clone)]
pub struct MockVenue {
    cfg: Arc<MockVenueCfg>,
    book: Arc<Mutex<Book>>,
    event_tx: mpsc::Sender<VenueEvent>,
}

fn lock(book: &Mutex<Book>) -> MutexGuard<'_, Book> {
    book.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockVenue {
    pub fn new(cfg: MockVenueCfg, event_tx: mpsc::Sender<VenueEvent>) -> Self {
        Self { cfg: Arc::new(cfg), book: Arc::new(Mutex::new(Book::default())), event_tx }
    }

    /// Keeps the last mid per symbol so fills and PnL use a live price, and
    /// exits positions whose stop-loss / take-profit the price crosses.
    pub fn track_prices(&self, mut md_rx: broadcast::Receiver<MdTick>) -> JoinHandle<()> {
        let book = Arc::clone(&self.book);
        let tx = self.event_tx.clone();
        let fee = self.cfg.fee_per_trade;
        tokio::spawn(async move {
            loop {
                match md_rx.recv().await {
                    Ok(md) => {
                        let events = lock(&book).on_price(&md.symbol, md.mid(), fee);
                        for ev in events {
                            if tx.send(ev).await.is_err() {
                                debug!("venue event receiver closed, drop event");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => debug!(n, "price tracker lagged"),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn mark_price(&self, symbol: &str, px: f64) {
        lock(&self.book).last_px.insert(symbol.to_string(), px);
    }

    /// Next submit or flatten is refused synchronously.
    pub fn arm_refusal(&self, reason: impl Into<String>) {
        lock(&self.book).refuse_next = Some(reason.into());
    }

    /// Next accepted submit is rejected asynchronously instead of filled.
    pub fn arm_rejection(&self, reason: impl Into<String>) {
        lock(&self.book).reject_next = Some(reason.into());
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        lock(&self.book).submitted.clone()
    }

    pub fn flatten_count(&self) -> u32 {
        lock(&self.book).flattens
    }

    fn check_request(&self, req: &OrderRequest) -> Result<(), String> {
        if req.qty <= 0.0 || !req.qty.is_finite() {
            return Err(format!("invalid quantity {}", req.qty));
        }
        if self.instrument(&req.symbol).is_none() {
            return Err(format!("unknown instrument {}", req.symbol));
        }
        if self.account(&req.account).is_none() {
            return Err(format!("unknown account {}", req.account));
        }
        if !self.supports(req.kind.behavior()) {
            return Err(format!("order kind {} not supported", req.kind.behavior().label()));
        }
        Ok(())
    }

    // Delayed action on the tokio runtime; applied inline when there is none.
    fn schedule<F>(&self, f: F)
    where
        F: FnOnce(&mut Book) -> Vec<VenueEvent> + Send + 'static,
    {
        let book = Arc::clone(&self.book);
        let tx = self.event_tx.clone();
        let fill_ms = self.cfg.fill_ms;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if fill_ms > 0 {
                        sleep(Duration::from_millis(fill_ms)).await;
                    }
                    let events = {
                        let mut guard = lock(&book);
                        f(&mut *guard)
                    };
                    for ev in events {
                        if tx.send(ev).await.is_err() {
                            debug!("venue event receiver closed, drop event");
                            break;
                        }
                    }
                });
            }
            Err(_) => {
                let events = {
                    let mut guard = lock(&book);
                    f(&mut *guard)
                };
                for ev in events {
                    if tx.try_send(ev).is_err() {
                        debug!("venue event channel unavailable, drop event");
                    }
                }
            }
        }
    }
}

impl Venue for MockVenue {
    fn instrument(&self, symbol: &str) -> Option<Instrument> {
        self.cfg.instruments.iter().find(|i| i.symbol == symbol).cloned()
    }

    fn account(&self, id: &str) -> Option<Account> {
        self.cfg.accounts.iter().find(|a| a.id == id).cloned()
    }

    fn supports(&self, behavior: OrderBehavior) -> bool {
        self.cfg.supported.contains(&behavior)
    }

    fn positions(&self) -> Vec<Position> {
        let mut out: Vec<Position> = lock(&self.book).positions.values().cloned().collect();
        out.sort_by_key(|p| p.id);
        out
    }

    fn submit(&mut self, req: &OrderRequest) -> SubmitResult {
        if let Err(reason) = self.check_request(req) {
            warn!(source = %req.source, %reason, "mock venue: order refused");
            return SubmitResult::failure(reason);
        }
        let (order_id, reject) = {
            let mut book = lock(&self.book);
            if let Some(reason) = book.refuse_next.take() {
                warn!(source = %req.source, %reason, "mock venue: order refused");
                return SubmitResult::failure(reason);
            }
            book.submitted.push(req.clone());
            (format!("SIM-{}", book.next_id()), book.reject_next.take())
        };

        let fill = req.clone();
        let fee = self.cfg.fee_per_trade;
        let tick_size = self.instrument(&req.symbol).map(|i| i.tick_size).unwrap_or(0.0);
        let oid = order_id.clone();
        self.schedule(move |book| {
            let req = fill;
            if let Some(reason) = reject {
                return vec![VenueEvent::OrderRejected(OrderRejected {
                    order_id: oid,
                    symbol: req.symbol,
                    account: req.account,
                    source: req.source,
                    reason,
                })];
            }
            let px = book.last_px.get(&req.symbol).copied().unwrap_or(0.0);
            let pos = Position {
                id: book.next_id(),
                symbol: req.symbol.clone(),
                account: req.account.clone(),
                side: req.side,
                qty: req.qty,
                open_px: px,
            };
            let bracket = Bracket {
                stop: req.stop_loss_price(px, tick_size),
                take: req.take_profit_price(px, tick_size),
            };
            if bracket != Bracket::default() {
                debug!(position_id = pos.id, ?bracket, "mock venue: bracket armed");
                book.brackets.insert(pos.id, bracket);
            }
            book.positions.insert(pos.id, pos.clone());
            let trade = Trade {
                id: book.next_id(),
                symbol: req.symbol,
                account: req.account,
                side: req.side,
                qty: req.qty,
                px,
                net_pnl: Some(-fee),
                gross_pnl: None,
                fee: Some(fee),
            };
            vec![VenueEvent::PositionAdded(pos), VenueEvent::TradeConfirmed(trade)]
        });
        info!(%order_id, side = ?req.side, qty = req.qty, "mock venue: ACK");
        SubmitResult::success(order_id)
    }

    fn flatten(&mut self, symbol: &str, account: &str, source: &str) -> SubmitResult {
        let order_id = {
            let mut book = lock(&self.book);
            if let Some(reason) = book.refuse_next.take() {
                warn!(%source, %reason, "mock venue: flatten refused");
                return SubmitResult::failure(reason);
            }
            book.flattens += 1;
            format!("SIM-{}", book.next_id())
        };
        let (symbol, account) = (symbol.to_string(), account.to_string());
        let fee = self.cfg.fee_per_trade;
        self.schedule(move |book| {
            let px = book.last_px.get(&symbol).copied().unwrap_or(0.0);
            let mut ids: Vec<u64> = book
                .positions
                .values()
                .filter(|p| p.symbol == symbol && p.account == account)
                .map(|p| p.id)
                .collect();
            ids.sort_unstable();
            ids.into_iter().flat_map(|id| book.close_position(id, px, fee)).collect()
        });
        info!(%order_id, %source, "mock venue: flatten ACK");
        SubmitResult::success(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderKind;

    fn venue() -> (MockVenue, mpsc::Receiver<VenueEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let cfg = MockVenueCfg {
            instruments: vec![Instrument { symbol: "BTCUSDT".into(), connection_id: "sim".into(), tick_size: 0.01 }],
            accounts: vec![Account { id: "paper".into(), connection_id: "sim".into() }],
            supported: vec![OrderBehavior::Market],
            fill_ms: 0,
            fee_per_trade: 0.5,
        };
        (MockVenue::new(cfg, tx), rx)
    }

    // no runtime: fills are applied inline
    #[test]
    fn test_submit_fills_inline_without_runtime() {
        let (mut v, mut rx) = venue();
        v.mark_price("BTCUSDT", 100.0);
        let res = v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Buy, 2.0));
        assert!(res.is_success());
        assert_eq!(v.positions().len(), 1);
        assert!(matches!(rx.try_recv(), Ok(VenueEvent::PositionAdded(p)) if p.qty == 2.0 && p.open_px == 100.0));
        assert!(matches!(rx.try_recv(), Ok(VenueEvent::TradeConfirmed(t)) if t.fee == Some(0.5)));
    }

    #[test]
    fn test_flatten_realizes_pnl() {
        let (mut v, mut rx) = venue();
        v.mark_price("BTCUSDT", 100.0);
        v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Sell, 1.0));
        while rx.try_recv().is_ok() {}

        v.mark_price("BTCUSDT", 90.0);
        assert!(v.flatten("BTCUSDT", "paper", "test").is_success());
        assert!(v.positions().is_empty());
        assert!(matches!(rx.try_recv(), Ok(VenueEvent::PositionRemoved(_))));
        match rx.try_recv() {
            Ok(VenueEvent::TradeConfirmed(t)) => {
                assert_eq!(t.gross_pnl, Some(10.0));
                assert_eq!(t.net_pnl, Some(9.5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_refusals() {
        let (mut v, _rx) = venue();
        assert!(!v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Buy, 0.0)).is_success());
        assert!(!v.submit(&OrderRequest::market("paper", "ETHUSDT", Side::Buy, 1.0)).is_success());
        assert!(!v.submit(&OrderRequest::market("other", "BTCUSDT", Side::Buy, 1.0)).is_success());
        let limit = OrderRequest::new("paper", "BTCUSDT", Side::Buy, 1.0, OrderKind::Limit { price: 1.0 });
        assert!(!v.submit(&limit).is_success());

        v.arm_refusal("margin");
        let res = v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Buy, 1.0));
        assert_eq!(res.message.as_deref(), Some("margin"));
        assert!(v.submitted().is_empty());
    }

    #[test]
    fn test_armed_rejection_is_async() {
        let (mut v, mut rx) = venue();
        v.arm_rejection("risk");
        assert!(v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Buy, 1.0)).is_success());
        assert!(v.positions().is_empty());
        assert!(matches!(rx.try_recv(), Ok(VenueEvent::OrderRejected(r)) if r.reason == "risk"));
    }

    #[test]
    fn test_armed_refusal_applies_to_flatten() {
        let (mut v, mut rx) = venue();
        v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Buy, 1.0));
        while rx.try_recv().is_ok() {}

        v.arm_refusal("venue halted");
        let res = v.flatten("BTCUSDT", "paper", "test");
        assert_eq!(res.message.as_deref(), Some("venue halted"));
        assert_eq!(v.flatten_count(), 0);
        assert_eq!(v.positions().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_loss_exits_long() {
        let (mut v, mut rx) = venue();
        v.mark_price("BTCUSDT", 100.0);
        let req = OrderRequest::market("paper", "BTCUSDT", Side::Buy, 1.0).with_stop_loss(Some(10));
        v.submit(&req);
        while rx.try_recv().is_ok() {}

        let mut book = lock(&v.book);
        // stop at 99.90
        assert!(book.on_price("BTCUSDT", 99.95, 0.5).is_empty());
        let events = book.on_price("BTCUSDT", 99.5, 0.5);
        assert!(book.positions.is_empty());
        assert!(book.brackets.is_empty());
        drop(book);

        assert!(matches!(events[0], VenueEvent::PositionRemoved(ref p) if p.side == Side::Buy));
        match &events[1] {
            VenueEvent::TradeConfirmed(t) => {
                assert_eq!(t.side, Side::Sell);
                assert_eq!(t.px, 99.5);
                assert!((t.gross_pnl.unwrap() + 0.5).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_take_profit_exits_short_only_on_its_symbol() {
        let (mut v, mut rx) = venue();
        v.mark_price("BTCUSDT", 100.0);
        let req = OrderRequest::market("paper", "BTCUSDT", Side::Sell, 1.0).with_take_profit(Some(100));
        v.submit(&req);
        // unbracketed position stays through any move
        v.submit(&OrderRequest::market("paper", "BTCUSDT", Side::Buy, 1.0));
        while rx.try_recv().is_ok() {}

        let mut book = lock(&v.book);
        assert!(book.on_price("ETHUSDT", 1.0, 0.0).is_empty());
        assert!(book.on_price("BTCUSDT", 99.5, 0.0).is_empty());
        let events = book.on_price("BTCUSDT", 98.9, 0.0);
        assert_eq!(events.len(), 2);
        assert_eq!(book.positions.len(), 1);
        assert!(book.positions.values().all(|p| p.side == Side::Buy));
    }
}
