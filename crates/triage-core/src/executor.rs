use crate::error::Result;
use crate::policy::TriagePolicy;
use crate::snapshot::IssueSnapshot;
use crate::templates::{self, MISSING_CRITERIA, STALE_CLOSURE, STALE_WARNING};
use crate::tracker::Tracker;
use crate::types::{Action, IssueId};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Mutation / ActionResult
// ---------------------------------------------------------------------------

/// One mutating tracker call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    PostComment { body: String },
    SetLabels { labels: BTreeSet<String> },
    CloseIssue,
}

impl Mutation {
    fn describe(&self) -> String {
        match self {
            Mutation::PostComment { body } => {
                let heading = body
                    .lines()
                    .find(|l| !l.trim().is_empty() && !l.starts_with("<!--"))
                    .unwrap_or("");
                format!("post comment {heading}")
            }
            Mutation::SetLabels { labels } => format!(
                "set labels [{}]",
                labels.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            Mutation::CloseIssue => "close issue".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionResult {
    Applied { mutations: Vec<Mutation> },
    Skipped { reason: String },
    DryRun { intended: Vec<Mutation> },
    Failed { error: String, completed: Vec<Mutation> },
}

impl ActionResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionResult::Failed { .. })
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ActionResult::Applied { .. })
    }
}

// ---------------------------------------------------------------------------
// WorkingIssue
// ---------------------------------------------------------------------------

/// The snapshot plus the label set as this run has left it so far. Label
/// writes replace the whole set, so later actions must build on earlier ones.
#[derive(Debug, Clone)]
pub struct WorkingIssue<'s> {
    snapshot: &'s IssueSnapshot,
    labels: BTreeSet<String>,
}

impl<'s> WorkingIssue<'s> {
    pub fn new(snapshot: &'s IssueSnapshot) -> Self {
        Self {
            snapshot,
            labels: snapshot.labels().clone(),
        }
    }

    pub fn snapshot(&self) -> &'s IssueSnapshot {
        self.snapshot
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    fn add_labels(&self, add: &[&str]) -> Option<Mutation> {
        let mut labels = self.labels.clone();
        for label in add {
            labels.insert((*label).to_string());
        }
        (labels != self.labels).then_some(Mutation::SetLabels { labels })
    }

    fn absorb(&mut self, mutation: &Mutation) {
        if let Mutation::SetLabels { labels } = mutation {
            self.labels = labels.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Applies planned actions to the tracker. With `dry_run` set, every
/// decision is made and logged but no mutating call is issued.
pub struct Executor<'a, T: Tracker + ?Sized> {
    tracker: &'a T,
    policy: &'a TriagePolicy,
    dry_run: bool,
}

impl<'a, T: Tracker + ?Sized> Executor<'a, T> {
    pub fn new(tracker: &'a T, policy: &'a TriagePolicy, dry_run: bool) -> Self {
        Self {
            tracker,
            policy,
            dry_run,
        }
    }

    pub fn apply(&self, issue: &mut WorkingIssue<'_>, action: &Action) -> ActionResult {
        let id = issue.snapshot().id();
        let mutations = self.mutations_for(issue, action);

        if mutations.is_empty() {
            let reason = self.skip_reason(action);
            debug!(issue = %id, action = %action, %reason, "nothing to do");
            return ActionResult::Skipped { reason };
        }

        if self.dry_run {
            for m in &mutations {
                info!(issue = %id, action = %action, "[dry-run] would {}", m.describe());
                issue.absorb(m);
            }
            return ActionResult::DryRun {
                intended: mutations,
            };
        }

        let mut completed = Vec::with_capacity(mutations.len());
        for m in mutations {
            if let Err(e) = self.execute(id, &m) {
                warn!(issue = %id, action = %action, error = %e, "action failed");
                return ActionResult::Failed {
                    error: e.to_string(),
                    completed,
                };
            }
            info!(issue = %id, action = %action, "{}", m.describe());
            issue.absorb(&m);
            completed.push(m);
        }
        ActionResult::Applied {
            mutations: completed,
        }
    }

    /// The mutations `action` still needs, after the idempotency guards.
    pub fn mutations_for(&self, issue: &WorkingIssue<'_>, action: &Action) -> Vec<Mutation> {
        let policy = self.policy;
        let snapshot = issue.snapshot();
        let mut out = Vec::new();

        match action {
            Action::None => {}
            Action::PostWarning => {
                // A warning from this stale cycle means only the labels failed last time.
                let posted = snapshot
                    .latest_marked_since(STALE_WARNING, snapshot.last_activity_at())
                    .is_some();
                if !posted {
                    out.push(Mutation::PostComment {
                        body: templates::stale_warning(policy),
                    });
                }
                out.extend(issue.add_labels(&[policy.warning_label.as_str(), policy.bot_label.as_str()]));
            }
            Action::CloseStale { warning_date } => {
                if snapshot
                    .latest_marked_since(STALE_CLOSURE, *warning_date)
                    .is_none()
                {
                    out.push(Mutation::PostComment {
                        body: templates::stale_closure(policy, *warning_date),
                    });
                }
                out.push(Mutation::CloseIssue);
            }
            Action::FlagMissingPhase => {
                if !issue.labels().contains(&policy.unclear_label) {
                    out.extend(issue.add_labels(&[policy.unclear_label.as_str(), policy.bot_label.as_str()]));
                }
            }
            Action::FlagMissingCriteria => {
                if !snapshot.has_marked(MISSING_CRITERIA) {
                    out.push(Mutation::PostComment {
                        body: templates::missing_criteria(policy),
                    });
                }
                if !issue.labels().contains(&policy.criteria_label) {
                    out.extend(issue.add_labels(&[policy.criteria_label.as_str(), policy.bot_label.as_str()]));
                }
            }
        }
        out
    }

    fn skip_reason(&self, action: &Action) -> String {
        match action {
            Action::None => "no action required".to_string(),
            Action::PostWarning => "warning comment and labels already present".to_string(),
            Action::CloseStale { .. } => "issue already closed".to_string(),
            Action::FlagMissingPhase => {
                format!("already labeled '{}'", self.policy.unclear_label)
            }
            Action::FlagMissingCriteria => format!(
                "criteria warning already posted and labeled '{}'",
                self.policy.criteria_label
            ),
        }
    }

    fn execute(&self, id: IssueId, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::PostComment { body } => self.tracker.post_comment(id, body),
            Mutation::SetLabels { labels } => self.tracker.set_labels(id, labels),
            Mutation::CloseIssue => self.tracker.close_issue(id),
        }
    }
}
