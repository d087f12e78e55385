//! ProBit Global adapter for the venue client contract.
//!
//! REST only: order books come from periodic snapshots, fills from the
//! trade-history endpoint. Authenticated calls use an OAuth bearer token
//! obtained with the API key and secret.

mod client;
mod config;
mod error;
mod mapping;
mod responses;

pub use client::{ProbitClient, CLIENT_ORDER_ID_MAX_LEN};
pub use config::ProbitConfig;
