// ===============================
// src/positions.rs (position ledger)
// ===============================
//
// Read-through view atas posisi di venue untuk satu pasangan
// (instrument, account). Tidak ada cache: selalu query ulang.
//
use serde::Serialize;

use crate::domain::{Position, Side};
use crate::gateway::Venue;
use crate::metrics::{POSITIONS_LONG, POSITIONS_SHORT};

#[derive(Debug, Clone)]
pub struct PositionLedger {
    symbol: String,
    account: String,
}

impl PositionLedger {
    pub fn new(symbol: impl Into<String>, account: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), account: account.into() }
    }

    pub fn tracks(&self, symbol: &str, account: &str) -> bool {
        self.symbol == symbol && self.account == account
    }

    pub fn current_positions<V: Venue + ?Sized>(&self, venue: &V) -> Vec<Position> {
        venue
            .positions()
            .into_iter()
            .filter(|p| self.tracks(&p.symbol, &p.account))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionCounts {
    pub long: usize,
    pub short: usize,
}

impl PositionCounts {
    pub fn publish(&self) {
        POSITIONS_LONG.set(self.long as i64);
        POSITIONS_SHORT.set(self.short as i64);
    }
}

pub fn position_counts(positions: &[Position]) -> PositionCounts {
    positions.iter().fold(PositionCounts::default(), |mut c, p| {
        match p.side {
            Side::Buy => c.long += 1,
            Side::Sell => c.short += 1,
        }
        c
    })
}

/// Signed sum: long positive, short negative.
pub fn net_quantity(positions: &[Position]) -> f64 {
    positions.iter().map(|p| p.side.sign() * p.qty).sum()
}
