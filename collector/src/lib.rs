//! Grin network statistics collector
//!
//! Samples chain history from a Grin node into a tiered SQLite series store,
//! keeps it current incrementally, tracks the peer population of each network
//! and publishes the results as static JSON datasets.

pub mod cli;
pub mod collector;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod indexer;
pub mod models;
pub mod peers;
pub mod rpc;

#[cfg(test)]
mod test_support;

pub use collector::Collector;
pub use error::{CollectorError, Result};

// Type alias for database pool
pub type DbPool = sqlx::SqlitePool;
