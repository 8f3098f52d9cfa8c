//! Warmup target selection
//!
//! Each cycle either posts into the shared warmup group or messages direct
//! chats: external seed numbers or the other warming instances. The sender
//! itself is always filtered out by digit-normalized comparison, so an
//! instance never messages its own number.

use zapcast_common::types::normalize_jid;

/// Where one warmup cycle sends its messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPlan {
    /// Post into the shared group
    Group(String),
    /// Message each number in turn
    Direct(Vec<String>),
}

impl TargetPlan {
    pub fn is_empty(&self) -> bool {
        match self {
            TargetPlan::Group(id) => id.is_empty(),
            TargetPlan::Direct(numbers) => numbers.is_empty(),
        }
    }
}

/// Decide the cycle's targets from two uniform draws in [0, 1).
///
/// `group_draw < group_chance` picks the group (when one is configured);
/// otherwise `external_draw < external_chance` picks the external seed
/// numbers; otherwise the peer instances' numbers are used.
pub fn select_targets(
    group_chance: f64,
    external_chance: f64,
    group_id: Option<&str>,
    external_numbers: &[String],
    peer_numbers: &[String],
    sender_jid: Option<&str>,
    group_draw: f64,
    external_draw: f64,
) -> TargetPlan {
    if group_draw < group_chance {
        if let Some(id) = group_id.filter(|id| !id.is_empty()) {
            return TargetPlan::Group(id.to_string());
        }
    }

    let pool = if external_draw < external_chance && !external_numbers.is_empty() {
        external_numbers
    } else {
        peer_numbers
    };

    TargetPlan::Direct(exclude_sender(pool, sender_jid))
}

fn exclude_sender(numbers: &[String], sender_jid: Option<&str>) -> Vec<String> {
    let Some(sender) = sender_jid.map(normalize_jid).filter(|s| !s.is_empty()) else {
        return numbers.to_vec();
    };

    numbers
        .iter()
        .filter(|n| normalize_jid(n) != sender)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn numbers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_draw_wins_when_group_configured() {
        let plan = select_targets(
            0.3,
            0.4,
            Some("12036@g.us"),
            &[],
            &numbers(&["5511000000001"]),
            None,
            0.1,
            0.9,
        );
        assert_eq!(plan, TargetPlan::Group("12036@g.us".to_string()));
    }

    #[test]
    fn test_group_draw_without_group_falls_through_to_direct() {
        let plan = select_targets(
            0.3,
            0.4,
            None,
            &[],
            &numbers(&["5511000000001"]),
            None,
            0.1,
            0.9,
        );
        assert_eq!(plan, TargetPlan::Direct(numbers(&["5511000000001"])));
    }

    #[test]
    fn test_external_numbers_chosen_by_second_draw() {
        let plan = select_targets(
            0.3,
            0.4,
            None,
            &numbers(&["5511000000009"]),
            &numbers(&["5511000000001"]),
            None,
            0.9,
            0.1,
        );
        assert_eq!(plan, TargetPlan::Direct(numbers(&["5511000000009"])));
    }

    #[test]
    fn test_sender_is_never_a_target() {
        let plan = select_targets(
            0.0,
            0.0,
            None,
            &[],
            &numbers(&["5511000000001", "5511000000002"]),
            Some("5511000000001@s.whatsapp.net"),
            0.9,
            0.9,
        );
        assert_eq!(plan, TargetPlan::Direct(numbers(&["5511000000002"])));
    }

    #[test]
    fn test_formatting_differences_still_exclude_sender() {
        let plan = select_targets(
            0.0,
            0.0,
            None,
            &numbers(&["+55 11 00000-0001", "5511000000002"]),
            &[],
            Some("5511000000001@s.whatsapp.net"),
            0.9,
            0.0,
        );
        // external_chance 0.0 so peers (empty) would be used; force externals
        let plan2 = select_targets(
            0.0,
            1.0,
            None,
            &numbers(&["+55 11 00000-0001", "5511000000002"]),
            &[],
            Some("5511000000001@s.whatsapp.net"),
            0.9,
            0.5,
        );
        assert_eq!(plan, TargetPlan::Direct(vec![]));
        assert_eq!(plan2, TargetPlan::Direct(numbers(&["5511000000002"])));
    }
}
