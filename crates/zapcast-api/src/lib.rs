//! ZapCast API - REST API server
//!
//! This crate provides the REST API for ZapCast: campaign lifecycle,
//! warmup control, and the gateway webhook.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
