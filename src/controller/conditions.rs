//! Condition management helpers following CAPI conventions

use crate::crd::types::{Condition, ConditionSeverity, ConditionStatus};

/// Summary condition type folded from all others.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Update or add a condition in the conditions list.
///
/// The transition time only changes when the status changes, so repeated
/// reconciles don't churn the status subresource.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        let keep_time = existing.status == condition.status;
        let previous_time = existing.last_transition_time.clone();
        *existing = condition;
        if keep_time {
            existing.last_transition_time = previous_time;
        }
    } else {
        conditions.push(condition);
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}

/// Fold all non-Ready conditions into the Ready summary.
///
/// Ready is True only when every other condition is True; otherwise it
/// mirrors the worst offender (severity ordering puts Error first).
pub fn summarize(conditions: &mut Vec<Condition>) {
    let worst = conditions
        .iter()
        .filter(|c| c.type_ != CONDITION_TYPE_READY && c.status != ConditionStatus::True)
        .min_by_key(|c| c.severity.unwrap_or(ConditionSeverity::Info))
        .cloned();

    let summary = match worst {
        Some(blocking) => Condition::false_(
            CONDITION_TYPE_READY,
            &blocking.reason,
            blocking.severity.unwrap_or(ConditionSeverity::Info),
            &blocking.message,
        ),
        None => Condition::true_(CONDITION_TYPE_READY),
    };
    set_condition(conditions, summary);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_adds_new() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::true_("DataSecretAvailable"));

        assert_eq!(conditions.len(), 1);
        assert!(is_condition_true(&conditions, "DataSecretAvailable"));
    }

    #[test]
    fn test_set_condition_updates_existing() {
        let mut conditions = vec![Condition::false_(
            "DataSecretAvailable",
            "WaitingForLiveISOURL",
            ConditionSeverity::Info,
            "",
        )];
        conditions[0].last_transition_time = "2024-01-01T00:00:00Z".to_string();

        set_condition(&mut conditions, Condition::true_("DataSecretAvailable"));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_ne!(conditions[0].last_transition_time, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_transition_time_stable_when_status_unchanged() {
        let mut conditions = vec![Condition::false_(
            "DataSecretAvailable",
            "WaitingForLiveISOURL",
            ConditionSeverity::Info,
            "",
        )];
        conditions[0].last_transition_time = "2024-01-01T00:00:00Z".to_string();

        set_condition(
            &mut conditions,
            Condition::false_(
                "DataSecretAvailable",
                "WaitingForAssistedInstaller",
                ConditionSeverity::Info,
                "",
            ),
        );

        assert_eq!(conditions[0].reason, "WaitingForAssistedInstaller");
        assert_eq!(conditions[0].last_transition_time, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_summarize_all_true() {
        let mut conditions = vec![Condition::true_("DataSecretAvailable")];
        summarize(&mut conditions);
        assert!(is_condition_true(&conditions, CONDITION_TYPE_READY));
    }

    #[test]
    fn test_summarize_picks_worst_severity() {
        let mut conditions = vec![
            Condition::false_("A", "SlowButFine", ConditionSeverity::Info, ""),
            Condition::false_("B", "BrokenBadly", ConditionSeverity::Error, ""),
            Condition::false_("C", "Suspicious", ConditionSeverity::Warning, ""),
        ];
        summarize(&mut conditions);

        let ready = find_condition(&conditions, CONDITION_TYPE_READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "BrokenBadly");
        assert_eq!(ready.severity, Some(ConditionSeverity::Error));
    }
}
