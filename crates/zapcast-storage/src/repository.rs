//! Repository layer for data access

pub mod campaigns;
pub mod dispatches;
pub mod instances;
pub mod leads;
pub mod media_stats;
pub mod message_logs;
pub mod users;
pub mod warmup_stats;

pub use campaigns::CampaignRepository;
pub use dispatches::DispatchRepository;
pub use instances::InstanceRepository;
pub use leads::{LeadRepository, LeadStatusCounts};
pub use media_stats::MediaStatsRepository;
pub use message_logs::MessageLogRepository;
pub use users::UserRepository;
pub use warmup_stats::WarmupStatsRepository;
