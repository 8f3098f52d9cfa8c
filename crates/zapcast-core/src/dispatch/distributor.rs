//! Lead distribution across rotation instances
//!
//! Pure partitioning: leads in, per-instance buckets out. Instances that
//! end up with no leads are dropped from the result, and leads beyond the
//! combined capacity stay unassigned rather than overflowing a bucket.

use rand::Rng;
use zapcast_common::types::RotationStrategy;
use zapcast_storage::models::Lead;

/// Leads assigned to one instance
#[derive(Debug, Clone)]
pub struct InstanceAssignment {
    pub instance_name: String,
    pub leads: Vec<Lead>,
}

/// Partition `leads` across `instance_names` according to `strategy`, with
/// at most `max_per_instance` leads per bucket. Returns only non-empty
/// buckets; an empty instance list yields an empty result.
pub fn distribute_leads(
    leads: Vec<Lead>,
    instance_names: &[String],
    strategy: RotationStrategy,
    max_per_instance: usize,
) -> Vec<InstanceAssignment> {
    if instance_names.is_empty() || max_per_instance == 0 {
        return Vec::new();
    }

    let mut buckets: Vec<InstanceAssignment> = instance_names
        .iter()
        .map(|name| InstanceAssignment {
            instance_name: name.clone(),
            leads: Vec::new(),
        })
        .collect();

    match strategy {
        RotationStrategy::Random => {
            let mut rng = rand::thread_rng();
            for lead in leads {
                let open: Vec<usize> = (0..buckets.len())
                    .filter(|&i| buckets[i].leads.len() < max_per_instance)
                    .collect();
                if open.is_empty() {
                    break;
                }
                let idx = open[rng.gen_range(0..open.len())];
                buckets[idx].leads.push(lead);
            }
        }
        RotationStrategy::Sequential => {
            let mut current = 0;
            'leads: for lead in leads {
                for _ in 0..buckets.len() {
                    if buckets[current].leads.len() < max_per_instance {
                        buckets[current].leads.push(lead);
                        continue 'leads;
                    }
                    current = (current + 1) % buckets.len();
                }
                break;
            }
        }
        RotationStrategy::LoadBalanced => {
            for lead in leads {
                let target = buckets
                    .iter_mut()
                    .filter(|b| b.leads.len() < max_per_instance)
                    .min_by_key(|b| b.leads.len());
                match target {
                    Some(bucket) => bucket.leads.push(lead),
                    None => break,
                }
            }
        }
    }

    buckets.retain(|b| !b.leads.is_empty());
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn lead(n: usize) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            campaign_id: Uuid::nil(),
            name: None,
            phone: format!("5511{:09}", n),
            status: "PENDING".to_string(),
            sent_at: None,
            delivered_at: None,
            read_at: None,
            failed_at: None,
            failure_reason: None,
            message_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn leads(n: usize) -> Vec<Lead> {
        (0..n).map(lead).collect()
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_instances_yields_empty() {
        let out = distribute_leads(leads(5), &[], RotationStrategy::Random, 10);
        assert!(out.is_empty());
    }

    #[test]
    fn test_sequential_fills_in_order() {
        let out = distribute_leads(
            leads(5),
            &names(&["a", "b", "c"]),
            RotationStrategy::Sequential,
            2,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].instance_name, "a");
        assert_eq!(out[0].leads.len(), 2);
        assert_eq!(out[1].leads.len(), 2);
        assert_eq!(out[2].leads.len(), 1);
    }

    #[test]
    fn test_load_balanced_evens_out() {
        let out = distribute_leads(
            leads(9),
            &names(&["a", "b", "c"]),
            RotationStrategy::LoadBalanced,
            100,
        );
        assert_eq!(out.len(), 3);
        for bucket in &out {
            assert_eq!(bucket.leads.len(), 3);
        }
    }

    #[test]
    fn test_random_respects_cap() {
        let out = distribute_leads(
            leads(50),
            &names(&["a", "b"]),
            RotationStrategy::Random,
            10,
        );
        let total: usize = out.iter().map(|b| b.leads.len()).sum();
        assert_eq!(total, 20);
        for bucket in &out {
            assert!(bucket.leads.len() <= 10);
        }
    }

    #[test]
    fn test_uncapped_instance_takes_every_lead() {
        let out = distribute_leads(
            leads(150),
            &names(&["a"]),
            RotationStrategy::Random,
            usize::MAX,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].leads.len(), 150);
    }

    #[test]
    fn test_overflow_leads_stay_unassigned() {
        let out = distribute_leads(
            leads(10),
            &names(&["a"]),
            RotationStrategy::Sequential,
            3,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].leads.len(), 3);
    }

    #[test]
    fn test_every_lead_assigned_once() {
        let input = leads(7);
        let ids: Vec<Uuid> = input.iter().map(|l| l.id).collect();
        let out = distribute_leads(
            input,
            &names(&["a", "b", "c"]),
            RotationStrategy::LoadBalanced,
            100,
        );
        let mut seen: Vec<Uuid> = out
            .iter()
            .flat_map(|b| b.leads.iter().map(|l| l.id))
            .collect();
        seen.sort();
        let mut expected = ids;
        expected.sort();
        assert_eq!(seen, expected);
    }
}
