use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// IssueId
// ---------------------------------------------------------------------------

/// Project-scoped issue number (GitLab `iid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub u64);

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TriageState
// ---------------------------------------------------------------------------

/// Staleness state of an open issue. Derived on every run, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageState {
    Exempt,
    Fresh,
    StaleUnwarned,
    StaleWarnedWaiting,
    StaleWarnedExpired,
}

impl TriageState {
    pub fn as_str(self) -> &'static str {
        match self {
            TriageState::Exempt => "exempt",
            TriageState::Fresh => "fresh",
            TriageState::StaleUnwarned => "stale_unwarned",
            TriageState::StaleWarnedWaiting => "stale_warned_waiting",
            TriageState::StaleWarnedExpired => "stale_warned_expired",
        }
    }

    pub fn is_stale(self) -> bool {
        matches!(
            self,
            TriageState::StaleUnwarned
                | TriageState::StaleWarnedWaiting
                | TriageState::StaleWarnedExpired
        )
    }
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QualityFlag
// ---------------------------------------------------------------------------

/// Quality findings that are independent of the staleness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    MissingPhaseLabel,
    MissingCriteria,
    NeedsTeamLead,
}

impl QualityFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityFlag::MissingPhaseLabel => "missing_phase_label",
            QualityFlag::MissingCriteria => "missing_criteria",
            QualityFlag::NeedsTeamLead => "needs_team_lead",
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    None,
    PostWarning,
    CloseStale { warning_date: DateTime<Utc> },
    FlagMissingPhase,
    FlagMissingCriteria,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::None => "none",
            Action::PostWarning => "post_warning",
            Action::CloseStale { .. } => "close_stale",
            Action::FlagMissingPhase => "flag_missing_phase",
            Action::FlagMissingCriteria => "flag_missing_criteria",
        }
    }

    /// Counter credited when this action completes without a tracker failure.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Action::None => None,
            Action::PostWarning => Some(Outcome::StaleWarned),
            Action::CloseStale { .. } => Some(Outcome::StaleClosed),
            Action::FlagMissingPhase => Some(Outcome::MissingPhaseLabel),
            Action::FlagMissingCriteria => Some(Outcome::MissingCriteria),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    StaleWarned,
    StaleClosed,
    MissingPhaseLabel,
    MissingCriteria,
    NeedsTeamLead,
}
