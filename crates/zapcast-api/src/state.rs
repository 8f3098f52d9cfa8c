//! Shared API state

use zapcast_core::{CampaignDispatcher, ReceiptTracker, WarmupEngine};
use zapcast_storage::DatabasePool;

/// State shared across all handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub dispatcher: CampaignDispatcher,
    pub warmup: WarmupEngine,
    pub receipts: ReceiptTracker,
}
