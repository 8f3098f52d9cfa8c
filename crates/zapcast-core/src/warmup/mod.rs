//! Warmup Engine - simulated organic traffic for fresh instances

mod content;
mod engine;
mod targets;

pub use content::{available_kinds, select_weighted, ContentPools};
pub use engine::{WarmupEngine, WarmupError, WarmupSettings};
pub use targets::{select_targets, TargetPlan};
