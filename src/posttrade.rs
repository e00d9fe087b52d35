// ===============================
// src/posttrade.rs
// ===============================
//
// Akumulasi PnL dari konfirmasi trade. Hanya ditambah, tidak pernah dihitung
// ulang dari awal. Field yang kosong (None) dianggap tidak dilaporkan.
//
use serde::Serialize;
use tracing::info;

use crate::domain::Trade;
use crate::metrics::{FEES, PNL_GROSS, PNL_NET};

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct RunningTotals {
    pub net_pnl: f64,
    pub gross_pnl: f64,
    pub fee: f64,
    pub trades: u64,
}

impl RunningTotals {
    pub fn on_trade_confirmed(&mut self, trade: &Trade) {
        if let Some(v) = trade.net_pnl { self.net_pnl += v; }
        if let Some(v) = trade.gross_pnl { self.gross_pnl += v; }
        if let Some(v) = trade.fee { self.fee += v; }
        self.trades += 1;

        info!(
            trade_id = trade.id,
            side = ?trade.side,
            qty = trade.qty,
            px = trade.px,
            net = ?trade.net_pnl,
            total_net = self.net_pnl,
            "TRADE"
        );
        PNL_NET.set(self.net_pnl);
        PNL_GROSS.set(self.gross_pnl);
        FEES.set(self.fee);
    }
}
