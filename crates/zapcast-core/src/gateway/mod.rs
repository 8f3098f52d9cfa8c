//! WhatsApp gateway integration

mod client;

pub use client::{
    GatewayClient, MediaPayload, SendOutcome, SendRequest,
};
pub use zapcast_common::config::GatewayConfig;
