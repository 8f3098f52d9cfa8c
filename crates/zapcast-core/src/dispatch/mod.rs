//! Campaign dispatch - lead distribution and per-instance send loops

mod dispatcher;
mod distributor;

pub use dispatcher::{CampaignDispatcher, DispatchError, DispatchSummary};
pub use distributor::{distribute_leads, InstanceAssignment};
