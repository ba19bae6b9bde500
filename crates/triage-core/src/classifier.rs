use crate::policy::{cutoffs, whole_days_between, Cutoffs, TriagePolicy};
use crate::rules::{default_rules, quality_flags};
use crate::snapshot::{Comment, IssueSnapshot};
use crate::templates::STALE_WARNING;
use crate::types::{Action, IssueId, QualityFlag, TriageState};
use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

pub struct EvalContext<'a> {
    pub snapshot: &'a IssueSnapshot,
    pub policy: &'a TriagePolicy,
    pub now: DateTime<Utc>,
    pub cutoffs: Cutoffs,
}

impl<'a> EvalContext<'a> {
    pub fn new(snapshot: &'a IssueSnapshot, policy: &'a TriagePolicy, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            policy,
            now,
            cutoffs: cutoffs(now, policy),
        }
    }

    pub fn days_since_activity(&self) -> i64 {
        whole_days_between(self.snapshot.last_activity_at(), self.now)
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot.last_activity_at() <= self.cutoffs.stale_cutoff
    }

    /// The warning that started the current closure countdown: the newest
    /// stale-warning comment not already answered by later activity.
    pub fn warning_anchor(&self) -> Option<&'a Comment> {
        self.snapshot
            .latest_marked_since(STALE_WARNING, self.snapshot.last_activity_at())
    }

    pub fn days_since_warning(&self) -> Option<i64> {
        self.warning_anchor()
            .map(|c| whole_days_between(c.created_at, self.now))
    }
}

// ---------------------------------------------------------------------------
// Classification (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub issue: IssueId,
    pub title: String,
    pub state: TriageState,
    pub action: Action,
    pub rule: &'static str,
    pub message: String,
    pub days_since_activity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_warning: Option<i64>,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule: no captures, no heap allocation.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&EvalContext) -> bool,
    pub state: TriageState,
    pub action: fn(&EvalContext) -> Action,
    pub message: fn(&EvalContext) -> String,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// First matching rule wins.
    pub fn classify(&self, ctx: &EvalContext) -> Classification {
        for rule in &self.rules {
            if (rule.condition)(ctx) {
                return Classification {
                    issue: ctx.snapshot.id(),
                    title: ctx.snapshot.title().to_string(),
                    state: rule.state,
                    action: (rule.action)(ctx),
                    rule: rule.id,
                    message: (rule.message)(ctx),
                    days_since_activity: ctx.days_since_activity(),
                    days_since_warning: ctx.days_since_warning(),
                };
            }
        }

        // Only reachable with a custom rule set that is not exhaustive.
        Classification {
            issue: ctx.snapshot.id(),
            title: ctx.snapshot.title().to_string(),
            state: TriageState::Fresh,
            action: Action::None,
            rule: "fallback",
            message: format!("Issue {} matched no rule", ctx.snapshot.id()),
            days_since_activity: ctx.days_since_activity(),
            days_since_warning: ctx.days_since_warning(),
        }
    }
}

/// Staleness state of one issue under `policy` at `now`.
pub fn classify(snapshot: &IssueSnapshot, policy: &TriagePolicy, now: DateTime<Utc>) -> TriageState {
    let ctx = EvalContext::new(snapshot, policy, now);
    Classifier::default().classify(&ctx).state
}

// ---------------------------------------------------------------------------
// TriagePlan
// ---------------------------------------------------------------------------

/// Everything the run decides for one issue: its staleness classification,
/// the orthogonal quality flags, and the actions to execute in order.
#[derive(Debug, Clone, Serialize)]
pub struct TriagePlan {
    pub classification: Classification,
    pub flags: Vec<QualityFlag>,
    pub actions: Vec<Action>,
}

pub fn plan(snapshot: &IssueSnapshot, policy: &TriagePolicy, now: DateTime<Utc>) -> TriagePlan {
    let ctx = EvalContext::new(snapshot, policy, now);
    let classification = Classifier::default().classify(&ctx);

    // An issue being closed leaves the open set; quality checks skip it.
    let closing = matches!(classification.action, Action::CloseStale { .. });
    let flags = if closing { Vec::new() } else { quality_flags(&ctx) };

    let mut actions = Vec::new();
    if classification.action != Action::None {
        actions.push(classification.action.clone());
    }
    for flag in &flags {
        match flag {
            QualityFlag::MissingPhaseLabel => actions.push(Action::FlagMissingPhase),
            QualityFlag::MissingCriteria => actions.push(Action::FlagMissingCriteria),
            QualityFlag::NeedsTeamLead => {}
        }
    }

    TriagePlan {
        classification,
        flags,
        actions,
    }
}
