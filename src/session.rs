// ===============================
// src/session.rs
// ===============================
//
// Event loop serial untuk satu controller:
//   select! (biased) : shutdown > venue events > market data
// Selesai kalau controller Stopped, feed tutup, atau shutdown.
// Teardown: release subscription (venue dulu, lalu md) -> controller.shutdown().
//
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};

use crate::controller::{Controller, StopReason};
use crate::domain::{MdTick, VenueEvent};
use crate::gateway::Venue;

pub struct Subscriptions {
    md: broadcast::Receiver<MdTick>,
    venue: mpsc::Receiver<VenueEvent>,
}

impl Subscriptions {
    pub fn new(md: broadcast::Receiver<MdTick>, venue: mpsc::Receiver<VenueEvent>) -> Self {
        Self { md, venue }
    }

    /// Fixed order: venue events first (no more confirmations land), then market data.
    pub fn release(self) {
        let Subscriptions { md, mut venue } = self;
        venue.close();
        let mut pending = 0usize;
        while venue.try_recv().is_ok() {
            pending += 1;
        }
        drop(venue);
        info!(dropped = pending, "venue events unsubscribed");
        drop(md);
        info!("market data unsubscribed");
    }
}

pub async fn run<V: Venue>(
    mut ctl: Controller<V>,
    mut subs: Subscriptions,
    mut shutdown: watch::Receiver<bool>,
) -> Controller<V> {
    info!(symbol = %ctl.params().symbol, "session started");
    if *shutdown.borrow() {
        ctl.stop(StopReason::Shutdown);
    }
    while !ctl.is_stopped() {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // sender dropped counts as shutdown
                if changed.is_err() || *shutdown.borrow() {
                    ctl.stop(StopReason::Shutdown);
                }
            }

            maybe_ev = subs.venue.recv() => match maybe_ev {
                Some(ev) => ctl.on_venue_event(ev),
                None => {
                    warn!("venue event channel closed");
                    ctl.stop(StopReason::FeedClosed);
                }
            },

            md = subs.md.recv() => match md {
                Ok(md) => {
                    ctl.on_tick(&md);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "market data lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("market data feed closed");
                    ctl.stop(StopReason::FeedClosed);
                }
            },
        }
    }

    subs.release();
    ctl.shutdown();
    ctl
}
