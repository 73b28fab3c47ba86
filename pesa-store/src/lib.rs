//! Pesa Store - Remote Store Gateway
//!
//! The seam between the ledger layer and the remote SQL-like store:
//!
//! - [`Gateway`]: the two operations the store offers (`query`, `execute`)
//! - [`GatewayExt::attempt`]: typed "unsupported" outcome instead of prose
//! - [`HttpGateway`]: reqwest client for the store's `/query` endpoint
//! - [`InMemoryStore`]: in-process store with switchable capabilities

pub mod gateway;
pub mod http;
pub mod memory;

pub use gateway::{Attempt, Gateway, GatewayExt};
pub use http::{operator_hint, HttpGateway, DEFAULT_FAILURE_TEXT};
pub use memory::InMemoryStore;
