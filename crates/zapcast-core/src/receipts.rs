//! Delivery receipt correlation
//!
//! Webhook receipts arrive keyed by the gateway message id. A bounded TTL
//! cache keeps the recent id-to-lead mapping in memory so the common case
//! never hits the database; misses fall back to a lead lookup by message
//! id. The cache evicts by age and by size, so a long-running process
//! cannot grow it without bound.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zapcast_common::types::LeadId;
use zapcast_storage::repository::{LeadRepository, MessageLogRepository};

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Receipt kinds the gateway reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Delivered,
    Read,
    Failed,
}

impl ReceiptKind {
    /// Status string recorded in the message log history
    pub fn as_status(&self) -> &'static str {
        match self {
            ReceiptKind::Delivered => "DELIVERED",
            ReceiptKind::Read => "READ",
            ReceiptKind::Failed => "FAILED",
        }
    }

    /// Map the gateway's webhook status names
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DELIVERY_ACK" | "DELIVERED" | "delivered" => Some(ReceiptKind::Delivered),
            "READ" | "read" | "PLAYED" => Some(ReceiptKind::Read),
            "FAILED" | "failed" | "ERROR" => Some(ReceiptKind::Failed),
            _ => None,
        }
    }
}

struct CacheEntry {
    lead_id: LeadId,
    inserted_at: Instant,
}

/// Insertion-ordered map with a size bound and per-entry TTL
struct TtlCache {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl TtlCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            ttl,
        }
    }

    fn insert(&mut self, message_id: String, lead_id: LeadId, now: Instant) {
        self.evict_expired(now);
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        if self.entries.remove(&message_id).is_some() {
            self.order.retain(|k| k != &message_id);
        }
        self.order.push_back(message_id.clone());
        self.entries.insert(
            message_id,
            CacheEntry {
                lead_id,
                inserted_at: now,
            },
        );
    }

    fn get(&mut self, message_id: &str, now: Instant) -> Option<LeadId> {
        let entry = self.entries.get(message_id)?;
        if now.duration_since(entry.inserted_at) > self.ttl {
            self.entries.remove(message_id);
            self.order.retain(|k| k != message_id);
            return None;
        }
        Some(entry.lead_id)
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .map(|e| now.duration_since(e.inserted_at) > self.ttl)
                // Entry was displaced by capacity eviction; drop the key
                .unwrap_or(true);
            if !expired {
                break;
            }
            let key = self.order.pop_front().unwrap();
            self.entries.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Tracks outbound message ids and applies incoming receipts to leads
#[derive(Clone)]
pub struct ReceiptTracker {
    lead_repo: LeadRepository,
    message_log_repo: MessageLogRepository,
    cache: Arc<Mutex<TtlCache>>,
}

impl ReceiptTracker {
    /// Create a new receipt tracker with default cache bounds
    pub fn new(lead_repo: LeadRepository, message_log_repo: MessageLogRepository) -> Self {
        Self::with_bounds(lead_repo, message_log_repo, DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Create a tracker with explicit cache bounds
    pub fn with_bounds(
        lead_repo: LeadRepository,
        message_log_repo: MessageLogRepository,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            lead_repo,
            message_log_repo,
            cache: Arc::new(Mutex::new(TtlCache::new(capacity, ttl))),
        }
    }

    /// Apply one receipt. Returns false when the message id is unknown.
    /// Out-of-order receipts are absorbed by the status guards on the lead
    /// transitions: a READ after a READ, or a DELIVERED after a READ, is a
    /// no-op rather than a regression.
    pub async fn apply(
        &self,
        message_id: &str,
        kind: ReceiptKind,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let lead_id = match self.resolve(message_id).await? {
            Some(id) => id,
            None => {
                debug!(message_id = %message_id, "receipt for unknown message");
                return Ok(false);
            }
        };

        match kind {
            ReceiptKind::Delivered => {
                self.lead_repo.mark_delivered(lead_id).await?;
            }
            ReceiptKind::Read => {
                self.lead_repo.mark_read(lead_id).await?;
            }
            ReceiptKind::Failed => {
                self.lead_repo
                    .mark_failed(lead_id, reason.unwrap_or("delivery failure reported"))
                    .await?;
            }
        }

        if let Err(e) = self
            .message_log_repo
            .append_status(message_id, kind.as_status())
            .await
        {
            warn!(message_id = %message_id, error = %e, "failed to append log status");
        }

        Ok(true)
    }

    async fn resolve(&self, message_id: &str) -> Result<Option<LeadId>, sqlx::Error> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(lead_id) = cache.get(message_id, Instant::now()) {
                return Ok(Some(lead_id));
            }
        }

        let Some(lead) = self.lead_repo.find_by_message_id(message_id).await? else {
            return Ok(None);
        };

        let mut cache = self.cache.lock().await;
        cache.insert(message_id.to_string(), lead.id, Instant::now());
        Ok(Some(lead.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[test]
    fn test_cache_hit_and_miss() {
        let mut cache = TtlCache::new(10, Duration::from_secs(60));
        let now = Instant::now();
        let lead = Uuid::new_v4();

        cache.insert("m1".to_string(), lead, now);
        assert_eq!(cache.get("m1", now), Some(lead));
        assert_eq!(cache.get("m2", now), None);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let mut cache = TtlCache::new(10, Duration::from_secs(60));
        let now = Instant::now();
        let lead = Uuid::new_v4();

        cache.insert("m1".to_string(), lead, now);
        let later = now + Duration::from_secs(61);
        assert_eq!(cache.get("m1", later), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut cache = TtlCache::new(3, Duration::from_secs(60));
        let now = Instant::now();
        let leads: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        for (i, lead) in leads.iter().enumerate() {
            cache.insert(format!("m{}", i), *lead, now);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("m0", now), None);
        assert_eq!(cache.get("m3", now), Some(leads[3]));
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let mut cache = TtlCache::new(2, Duration::from_secs(60));
        let now = Instant::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        cache.insert("a".to_string(), a, now);
        cache.insert("b".to_string(), b, now);
        cache.insert("a".to_string(), a, now);
        cache.insert("c".to_string(), c, now);

        // "b" was the stalest entry once "a" was refreshed
        assert_eq!(cache.get("b", now), None);
        assert_eq!(cache.get("a", now), Some(a));
        assert_eq!(cache.get("c", now), Some(c));
    }

    #[test]
    fn test_expired_entries_evicted_on_insert() {
        let mut cache = TtlCache::new(10, Duration::from_secs(60));
        let now = Instant::now();

        cache.insert("old".to_string(), Uuid::new_v4(), now);
        let later = now + Duration::from_secs(120);
        cache.insert("new".to_string(), Uuid::new_v4(), later);

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_receipt_kind_parse() {
        assert_eq!(ReceiptKind::parse("DELIVERY_ACK"), Some(ReceiptKind::Delivered));
        assert_eq!(ReceiptKind::parse("READ"), Some(ReceiptKind::Read));
        assert_eq!(ReceiptKind::parse("PLAYED"), Some(ReceiptKind::Read));
        assert_eq!(ReceiptKind::parse("bogus"), None);
    }
}
