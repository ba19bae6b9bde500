//! One triage pass over a project.
//!
//! Issues are handed to a bounded pool of scoped worker threads through a
//! shared index. Each worker keeps its own [`TriageStats`] and decision list;
//! they are merged only after every worker has joined, and the report is
//! published strictly after that. A report that cannot be created is logged
//! and recorded on the summary; only an auth failure fails the run there.

use crate::classifier::plan;
use crate::error::{Result, TriageError};
use crate::executor::{ActionResult, Executor, WorkingIssue};
use crate::policy::TriagePolicy;
use crate::report::{publish, ReportRecord, TriageStats};
use crate::snapshot::IssueSnapshot;
use crate::tracker::{CreatedIssue, TrackedIssue, Tracker};
use crate::types::{Action, IssueId, Outcome, QualityFlag, TriageState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub concurrency: usize,
    pub now: DateTime<Utc>,
    /// Labels put on the published report. Issues carrying all of them are
    /// earlier reports and are left alone.
    pub report_labels: Vec<String>,
}

impl RunOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            dry_run: false,
            concurrency: 4,
            now,
            report_labels: vec!["triage-report".to_string(), "team-lead".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub action: Action,
    pub result: ActionResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueDecision {
    pub issue: IssueId,
    pub title: String,
    pub state: TriageState,
    pub rule: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<QualityFlag>,
    pub actions: Vec<ActionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub project: String,
    pub dry_run: bool,
    pub issues_seen: usize,
    pub issues_skipped: usize,
    pub actions_failed: usize,
    pub stats: TriageStats,
    pub report: ReportRecord,
    pub published: Option<CreatedIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_error: Option<String>,
    pub decisions: Vec<IssueDecision>,
}

#[derive(Debug, Default)]
struct WorkerOutput {
    stats: TriageStats,
    decisions: Vec<IssueDecision>,
    skipped: usize,
    failed: usize,
}

impl WorkerOutput {
    fn merge(&mut self, other: WorkerOutput) {
        self.stats.merge(&other.stats);
        self.decisions.extend(other.decisions);
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

pub fn run_triage<T: Tracker + ?Sized>(
    tracker: &T,
    policy: &TriagePolicy,
    options: &RunOptions,
) -> Result<RunSummary> {
    let project = tracker.verify_access()?;
    info!(project = %project.name, dry_run = options.dry_run, "starting triage run");

    let issues: Vec<TrackedIssue> = tracker
        .list_open_issues(None)?
        .into_iter()
        .filter(|i| !is_report_issue(i, &options.report_labels))
        .collect();
    info!(count = issues.len(), "fetched open issues");

    let workers = options.concurrency.clamp(1, issues.len().max(1));
    let next = AtomicUsize::new(0);
    let executor = Executor::new(tracker, policy, options.dry_run);

    let (next, executor, queue) = (&next, &executor, &issues);
    let mut total = WorkerOutput::default();
    let joined: Vec<thread::Result<WorkerOutput>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut out = WorkerOutput::default();
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(issue) = queue.get(idx) else {
                            break;
                        };
                        process_issue(tracker, executor, policy, options, issue, &mut out);
                    }
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    for result in joined {
        total.merge(result.map_err(|_| TriageError::WorkerPanicked)?);
    }
    total.decisions.sort_by_key(|d| d.issue);

    let report = total.stats.render(options.now);
    log_summary(&report, total.skipped, total.failed, options.dry_run);
    let (published, publish_error) = match publish(
        tracker,
        &report,
        policy,
        &options.report_labels,
        options.dry_run,
    ) {
        Ok(created) => (created, None),
        Err(e) if e.is_auth() => return Err(e),
        Err(e) => {
            warn!(error = %e, "failed to publish triage report");
            (None, Some(e.to_string()))
        }
    };

    Ok(RunSummary {
        project: project.name,
        dry_run: options.dry_run,
        issues_seen: issues.len(),
        issues_skipped: total.skipped,
        actions_failed: total.failed,
        stats: total.stats,
        report,
        published,
        publish_error,
        decisions: total.decisions,
    })
}

fn is_report_issue(issue: &TrackedIssue, report_labels: &[String]) -> bool {
    !report_labels.is_empty() && report_labels.iter().all(|l| issue.labels.contains(l))
}

fn process_issue<T: Tracker + ?Sized>(
    tracker: &T,
    executor: &Executor<'_, T>,
    policy: &TriagePolicy,
    options: &RunOptions,
    issue: &TrackedIssue,
    out: &mut WorkerOutput,
) {
    let snapshot = match tracker.list_comments(issue.id).and_then(|comments| {
        let label_events = tracker.list_label_events(issue.id)?;
        IssueSnapshot::capture(issue, &comments, &label_events)
    }) {
        Ok(s) => s,
        Err(e) => {
            warn!(issue = %issue.id, error = %e, "skipping issue");
            out.skipped += 1;
            return;
        }
    };

    let plan = plan(&snapshot, policy, options.now);
    debug!(
        issue = %snapshot.id(),
        state = %plan.classification.state,
        rule = plan.classification.rule,
        "{}",
        plan.classification.message
    );
    for flag in &plan.flags {
        warn!(issue = %snapshot.id(), flag = flag.as_str(), "quality check failed");
        if *flag == QualityFlag::NeedsTeamLead {
            out.stats.record(Outcome::NeedsTeamLead);
        }
    }

    let mut working = WorkingIssue::new(&snapshot);
    let mut actions = Vec::with_capacity(plan.actions.len());
    for action in &plan.actions {
        let result = executor.apply(&mut working, action);
        if result.is_failure() {
            out.failed += 1;
        } else if counts(action, &result) {
            if let Some(outcome) = action.outcome() {
                out.stats.record(outcome);
            }
        }
        // A freshly labeled issue now waits on the team lead.
        if *action == Action::FlagMissingPhase && result.is_applied() {
            out.stats.record(Outcome::NeedsTeamLead);
        }
        actions.push(ActionRecord {
            action: action.clone(),
            result,
        });
    }

    out.decisions.push(IssueDecision {
        issue: snapshot.id(),
        title: snapshot.title().to_string(),
        state: plan.classification.state,
        rule: plan.classification.rule,
        flags: plan.flags,
        actions,
    });
}

/// Staleness counters track what this run did; quality counters track what
/// the backlog looks like, so an already-flagged issue still counts.
fn counts(action: &Action, result: &ActionResult) -> bool {
    match result {
        ActionResult::Failed { .. } => false,
        ActionResult::Skipped { .. } => {
            matches!(action, Action::FlagMissingPhase | Action::FlagMissingCriteria)
        }
        ActionResult::Applied { .. } | ActionResult::DryRun { .. } => true,
    }
}

fn log_summary(report: &ReportRecord, skipped: usize, failed: usize, dry_run: bool) {
    info!(dry_run, "=== {} ===", report.title());
    for (label, count) in report.rows() {
        info!("{label}: {count}");
    }
    if skipped > 0 {
        warn!(skipped, "issues skipped");
    }
    if failed > 0 {
        warn!(failed, "actions failed");
    }
}
