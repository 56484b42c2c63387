//! Series store, meta and peer tables

pub mod connection;
pub mod queries;
pub mod schema;

pub use connection::Database;
pub use queries::{to_sql_int, BlockQueries, MetaQueries, PeerQueries, SnapshotQueries, TxFeeQueries, TxMetric};
