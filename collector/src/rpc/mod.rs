//! Grin node RPC: trait, wire model and HTTP client

pub mod api;
pub mod client;
pub mod model;

pub use api::NodeApi;
pub use client::{Endpoint, NodeClient};
