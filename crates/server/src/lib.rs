//! Webhook server for the Linear assistant.
//!
//! Wires the Linear and HumanLayer clients and the Claude oracle into a step
//! dispatcher and exposes it over the webhook routes.

pub mod cache;
pub mod config;
mod http;
pub mod humanlayer;
pub mod linear;
pub mod payload;
pub mod webhook;

pub use cache::CachedTracker;
pub use config::Config;
pub use humanlayer::HumanLayerClient;
pub use linear::LinearClient;
pub use webhook::{router, AppState, ThreadRunner};
