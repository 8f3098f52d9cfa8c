//! ZapCast Core - Campaign dispatch and instance warmup
//!
//! This crate provides the core outreach functionality for ZapCast,
//! including the campaign dispatcher, the warmup engine, lead rotation,
//! daily quota enforcement, and the WhatsApp gateway client.

pub mod dispatch;
pub mod gateway;
pub mod limits;
pub mod pacing;
pub mod receipts;
pub mod runtime;
pub mod warmup;

pub use dispatch::{CampaignDispatcher, DispatchError, DispatchSummary};
pub use gateway::{GatewayClient, GatewayConfig, SendOutcome};
pub use limits::{PlanLimits, QuotaDecision, QuotaGuard};
pub use receipts::{ReceiptTracker, ReceiptKind};
pub use runtime::{TaskKey, TaskSupervisor};
pub use warmup::{WarmupEngine, WarmupError, WarmupSettings};
