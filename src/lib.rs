// ===============================
// src/lib.rs
// ===============================
pub mod domain;
pub mod order;
pub mod config;
pub mod metrics;
pub mod recorder;
pub mod feed;
pub mod bars;
pub mod indicators;
pub mod strategy;
pub mod gate;
pub mod gateway;     // Venue trait + mock venue (ACK -> fill event after delay)
pub mod positions;
pub mod posttrade;
pub mod executor;
pub mod controller;
pub mod session;
