use crate::error::{Result, TriageError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TriagePolicy
// ---------------------------------------------------------------------------

/// Thresholds and label vocabulary for one run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriagePolicy {
    pub stale_days: u32,
    pub warning_days: u32,
    pub current_phase_label: String,
    pub phase_labels: Vec<String>,
    pub warning_label: String,
    pub bot_label: String,
    pub unclear_label: String,
    pub criteria_label: String,
    pub acceptance_criteria_keywords: Vec<String>,
}

pub fn default_phase_labels() -> Vec<String> {
    vec![
        "phase-current".to_string(),
        "phase-next".to_string(),
        "phase-future".to_string(),
    ]
}

pub fn default_criteria_keywords() -> Vec<String> {
    vec![
        "acceptance criteria".to_string(),
        "definition of done".to_string(),
        "success criteria".to_string(),
        "done when".to_string(),
    ]
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            stale_days: 90,
            warning_days: 14,
            current_phase_label: "phase-current".to_string(),
            phase_labels: default_phase_labels(),
            warning_label: "stale-warning".to_string(),
            bot_label: "bot-triage".to_string(),
            unclear_label: "phase-unclear".to_string(),
            criteria_label: "needs-acceptance-criteria".to_string(),
            acceptance_criteria_keywords: default_criteria_keywords(),
        }
    }
}

impl TriagePolicy {
    pub fn is_phase_label(&self, label: &str) -> bool {
        self.phase_labels.iter().any(|p| p == label)
    }

    /// Case-insensitive substring match against the configured keywords.
    pub fn mentions_acceptance_criteria(&self, description: &str) -> bool {
        let folded = description.to_lowercase();
        self.acceptance_criteria_keywords
            .iter()
            .any(|k| folded.contains(&k.to_lowercase()))
    }
}

// ---------------------------------------------------------------------------
// Cutoffs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cutoffs {
    /// Activity at or before this instant is stale.
    pub stale_cutoff: DateTime<Utc>,
    /// A warning posted at or before this instant has expired.
    pub warning_cutoff: DateTime<Utc>,
}

pub fn cutoffs(now: DateTime<Utc>, policy: &TriagePolicy) -> Cutoffs {
    Cutoffs {
        stale_cutoff: now - Duration::days(i64::from(policy.stale_days)),
        warning_cutoff: now - Duration::days(i64::from(policy.warning_days)),
    }
}

/// Whole days from `earlier` to `later`, floored. Clock skew never yields a
/// negative count.
pub fn whole_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_days().max(0)
}

/// Parse a tracker timestamp. An explicit offset is mandatory; naive
/// timestamps are rejected rather than assumed to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TriageError::Timestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn cutoffs_subtract_configured_days() {
        let c = cutoffs(now(), &TriagePolicy::default());
        assert_eq!(c.stale_cutoff, now() - Duration::days(90));
        assert_eq!(c.warning_cutoff, now() - Duration::days(14));
    }

    #[test]
    fn whole_days_floor_partial_days() {
        let earlier = now() - Duration::days(3) - Duration::hours(23);
        assert_eq!(whole_days_between(earlier, now()), 3);
    }

    #[test]
    fn whole_days_clamp_future_instants() {
        let later = now() + Duration::hours(5);
        assert_eq!(whole_days_between(later, now()), 0);
    }

    #[test]
    fn parse_normalises_offsets_to_utc() {
        let parsed = parse_timestamp("2025-06-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed, now());
        let gitlab = parse_timestamp("2025-06-01T12:00:00.000Z").unwrap();
        assert_eq!(gitlab, now());
    }

    #[test]
    fn parse_rejects_naive_timestamps() {
        let err = parse_timestamp("2025-06-01T12:00:00").unwrap_err();
        assert!(matches!(err, TriageError::Timestamp { .. }));
    }

    #[test]
    fn criteria_keywords_are_case_insensitive() {
        let policy = TriagePolicy::default();
        assert!(policy.mentions_acceptance_criteria("## Acceptance Criteria\n- works"));
        assert!(policy.mentions_acceptance_criteria("Done WHEN the build is green"));
        assert!(!policy.mentions_acceptance_criteria("just a description"));
    }
}
