use chrono::{DateTime, Duration, TimeZone, Utc};
use triage_core::executor::ActionResult;
use triage_core::fakes::{FailOn, FakeIssue, MemoryTracker, RecordedCall};
use triage_core::policy::TriagePolicy;
use triage_core::run::{run_triage, RunOptions};
use triage_core::templates::{self, MISSING_CRITERIA, STALE_CLOSURE, STALE_WARNING};
use triage_core::types::{IssueId, TriageState};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

fn options() -> RunOptions {
    RunOptions::new(now())
}

fn set(labels: &[&str]) -> std::collections::BTreeSet<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

fn issue_mutations(tracker: &MemoryTracker) -> usize {
    tracker
        .calls()
        .iter()
        .filter(|c| !matches!(c, RecordedCall::CreateIssue { .. }))
        .count()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn stale_issue_gets_warned() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)).labels(&["phase-next"]));
    let summary = run_triage(&tracker, &TriagePolicy::default(), &options()).unwrap();

    assert_eq!(summary.decisions[0].state, TriageState::StaleUnwarned);
    assert_eq!(summary.stats.stale_warned, 1);
    let a = tracker.issue(1).unwrap();
    assert_eq!(a.labels, set(&["bot-triage", "phase-next", "stale-warning"]));
    assert_eq!(a.count_marked(STALE_WARNING), 1);
    assert!(a.open);
}

#[test]
fn expired_warning_closes_issue() {
    let policy = TriagePolicy::default();
    let warned = days_ago(15);
    let tracker = MemoryTracker::new("demo", now()).with_issue(
        FakeIssue::new(2, "B", days_ago(120))
            .labels(&["stale-warning", "phase-next"])
            .comment(&templates::stale_warning(&policy), warned),
    );
    let summary = run_triage(&tracker, &policy, &options()).unwrap();

    assert_eq!(summary.decisions[0].state, TriageState::StaleWarnedExpired);
    assert_eq!(summary.stats.stale_closed, 1);
    let b = tracker.issue(2).unwrap();
    assert!(!b.open);
    let closure = b.comments.last().unwrap();
    assert!(STALE_CLOSURE.matches(&closure.body));
    assert!(closure.body.contains("2025-05-18"));
}

#[test]
fn current_phase_issue_without_criteria_is_flagged_once() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(3, "C", days_ago(2)).labels(&["phase-current"]));
    let policy = TriagePolicy::default();

    let first = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(first.stats.missing_criteria, 1);
    assert_eq!(first.stats.missing_phase_label, 0);
    let c = tracker.issue(3).unwrap();
    assert_eq!(c.count_marked(MISSING_CRITERIA), 1);
    assert_eq!(
        c.labels,
        set(&["bot-triage", "needs-acceptance-criteria", "phase-current"])
    );

    let before = issue_mutations(&tracker);
    run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(issue_mutations(&tracker), before);
    assert_eq!(tracker.issue(3).unwrap().count_marked(MISSING_CRITERIA), 1);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn second_run_on_same_day_changes_nothing() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)))
        .with_issue(FakeIssue::new(2, "fresh", days_ago(3)).labels(&["phase-next"]));
    let policy = TriagePolicy::default();

    run_triage(&tracker, &policy, &options()).unwrap();
    let before = issue_mutations(&tracker);
    assert!(before > 0);

    let second = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(issue_mutations(&tracker), before);
    assert_eq!(second.decisions[0].state, TriageState::StaleWarnedWaiting);
    assert_eq!(second.stats.stale_warned, 0);
}

#[test]
fn warning_then_silence_then_closure() {
    let policy = TriagePolicy::default();
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)).labels(&["phase-next"]));

    run_triage(&tracker, &policy, &options()).unwrap();

    // The bot's own comment bumped updated_at; that must not reset the clock.
    let later = now() + Duration::days(14);
    tracker.set_now(later);
    let mut opts = options();
    opts.now = later;
    let summary = run_triage(&tracker, &policy, &opts).unwrap();

    assert_eq!(summary.decisions[0].state, TriageState::StaleWarnedExpired);
    let a = tracker.issue(1).unwrap();
    assert!(!a.open);
    assert_eq!(a.count_marked(STALE_WARNING), 1);
    assert_eq!(a.count_marked(STALE_CLOSURE), 1);
}

#[test]
fn human_reply_after_warning_makes_issue_fresh() {
    let policy = TriagePolicy::default();
    let mut issue = FakeIssue::new(1, "A", days_ago(100))
        .labels(&["stale-warning", "phase-next"])
        .comment(&templates::stale_warning(&policy), days_ago(20))
        .comment("still relevant, working on it", days_ago(5));
    // The human reply bumped updated_at.
    issue.updated_at = days_ago(5);
    let tracker = MemoryTracker::new("demo", now()).with_issue(issue);

    let summary = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(summary.decisions[0].state, TriageState::Fresh);
    assert!(tracker.issue(1).unwrap().open);
}

#[test]
fn exempt_issue_is_never_closed() {
    let policy = TriagePolicy::default();
    let tracker = MemoryTracker::new("demo", now()).with_issue(
        FakeIssue::new(1, "A", days_ago(400))
            .labels(&["phase-current", "stale-warning"])
            .description("Acceptance criteria: it works")
            .comment(&templates::stale_warning(&policy), days_ago(300)),
    );
    let summary = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(summary.decisions[0].state, TriageState::Exempt);
    assert_eq!(tracker.mutation_count(), 0);
}

// ---------------------------------------------------------------------------
// Failures and dry runs
// ---------------------------------------------------------------------------

#[test]
fn dry_run_issues_no_mutations() {
    let policy = TriagePolicy::default();
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)))
        .with_issue(
            FakeIssue::new(2, "B", days_ago(120))
                .labels(&["stale-warning"])
                .comment(&templates::stale_warning(&policy), days_ago(15)),
        )
        .with_issue(FakeIssue::new(3, "C", days_ago(1)).labels(&["phase-current"]));
    let mut opts = options();
    opts.dry_run = true;

    let summary = run_triage(&tracker, &policy, &opts).unwrap();
    assert_eq!(tracker.mutation_count(), 0);
    assert!(summary.published.is_none());
    assert_eq!(summary.stats.stale_warned, 1);
    assert_eq!(summary.stats.stale_closed, 1);
    assert_eq!(summary.stats.missing_criteria, 1);
    assert!(summary
        .decisions
        .iter()
        .flat_map(|d| &d.actions)
        .all(|a| matches!(a.result, ActionResult::DryRun { .. })));
}

#[test]
fn label_failure_is_repaired_next_run() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)).labels(&["phase-next"]));
    tracker.fail(FailOn::SetLabels(IssueId(1)));
    let policy = TriagePolicy::default();

    let first = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(first.actions_failed, 1);
    assert_eq!(first.stats.stale_warned, 0);

    tracker.clear_failures();
    let second = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(second.actions_failed, 0);
    let a = tracker.issue(1).unwrap();
    assert_eq!(a.count_marked(STALE_WARNING), 1);
    assert_eq!(a.labels, set(&["bot-triage", "phase-next", "stale-warning"]));
}

#[test]
fn late_label_repair_does_not_restart_the_countdown() {
    let policy = TriagePolicy::default();
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)).labels(&["phase-next"]));
    tracker.fail(FailOn::SetLabels(IssueId(1)));
    let first = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(first.actions_failed, 1);

    // Labels repaired a week later, with no new comment.
    tracker.clear_failures();
    let repair_at = now() + Duration::days(7);
    tracker.set_now(repair_at);
    let repair = run_triage(&tracker, &policy, &RunOptions::new(repair_at)).unwrap();
    assert_eq!(repair.decisions[0].state, TriageState::StaleUnwarned);
    let a = tracker.issue(1).unwrap();
    assert_eq!(a.count_marked(STALE_WARNING), 1);
    assert_eq!(a.labels, set(&["bot-triage", "phase-next", "stale-warning"]));

    // The countdown still runs from the original warning.
    let close_at = now() + Duration::days(14);
    tracker.set_now(close_at);
    let last = run_triage(&tracker, &policy, &RunOptions::new(close_at)).unwrap();
    assert_eq!(last.decisions[0].state, TriageState::StaleWarnedExpired);
    let a = tracker.issue(1).unwrap();
    assert!(!a.open);
    assert_eq!(a.count_marked(STALE_WARNING), 1);
    assert_eq!(a.count_marked(STALE_CLOSURE), 1);
}

#[test]
fn flagging_a_missing_phase_does_not_refresh_the_issue() {
    let policy = TriagePolicy::default();
    let tracker =
        MemoryTracker::new("demo", now()).with_issue(FakeIssue::new(1, "A", days_ago(50)));
    let first = run_triage(&tracker, &policy, &options()).unwrap();
    assert_eq!(first.decisions[0].state, TriageState::Fresh);
    assert!(tracker.issue(1).unwrap().labels.contains("phase-unclear"));

    let later = now() + Duration::days(41);
    tracker.set_now(later);
    let second = run_triage(&tracker, &policy, &RunOptions::new(later)).unwrap();
    assert_eq!(second.decisions[0].state, TriageState::StaleUnwarned);
    assert_eq!(tracker.issue(1).unwrap().count_marked(STALE_WARNING), 1);
}

#[test]
fn failing_issue_does_not_stop_the_run() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)).labels(&["phase-next"]))
        .with_issue(FakeIssue::new(2, "B", days_ago(100)).labels(&["phase-next"]))
        .with_issue(FakeIssue::new(3, "C", days_ago(100)).labels(&["phase-next"]));
    tracker.fail(FailOn::ListComments(IssueId(1)));
    tracker.fail(FailOn::PostComment(IssueId(2)));

    let summary = run_triage(&tracker, &TriagePolicy::default(), &options()).unwrap();
    assert_eq!(summary.issues_seen, 3);
    assert_eq!(summary.issues_skipped, 1);
    assert_eq!(summary.actions_failed, 1);
    assert_eq!(summary.stats.stale_warned, 1);
    assert_eq!(tracker.issue(3).unwrap().count_marked(STALE_WARNING), 1);
}

#[test]
fn malformed_timestamp_skips_only_that_issue() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)).raw_updated_at("2025-01-01 10:00:00"))
        .with_issue(FakeIssue::new(2, "B", days_ago(100)).labels(&["phase-next"]));

    let summary = run_triage(&tracker, &TriagePolicy::default(), &options()).unwrap();
    assert_eq!(summary.issues_skipped, 1);
    assert_eq!(summary.decisions.len(), 1);
    assert_eq!(summary.decisions[0].issue, IssueId(2));
}

#[test]
fn denied_access_is_fatal_before_any_mutation() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)));
    tracker.deny_access();

    let err = run_triage(&tracker, &TriagePolicy::default(), &options()).unwrap_err();
    assert!(err.is_auth());
    assert_eq!(tracker.mutation_count(), 0);
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[test]
fn report_is_published_after_a_busy_run() {
    let tracker = MemoryTracker::new("demo", now())
        .with_issue(FakeIssue::new(1, "A", days_ago(100)))
        .with_issue(FakeIssue::new(2, "B", days_ago(1)).labels(&["phase-unclear"]));

    let summary = run_triage(&tracker, &TriagePolicy::default(), &options()).unwrap();
    // Issue 1 was just labeled unclear; issue 2 already was.
    assert_eq!(summary.stats.missing_phase_label, 2);
    assert_eq!(summary.stats.needs_team_lead, 2);

    let report = summary.published.unwrap();
    let created = tracker.issue(report.id.0).unwrap();
    assert_eq!(created.title, "Weekly Triage Report - 2025-06-02");
    assert_eq!(
        created.labels,
        set(&["bot-triage", "team-lead", "triage-report"])
    );
    let body = created.description.unwrap();
    assert!(body.contains("| Stale Warnings Posted | 1 |"));
    assert!(body.contains("need a Team Lead decision"));
}

#[test]
fn quiet_run_publishes_nothing() {
    let tracker = MemoryTracker::new("demo", now()).with_issue(
        FakeIssue::new(1, "A", days_ago(1))
            .labels(&["phase-current"])
            .description("Definition of done: green build"),
    );
    let summary = run_triage(&tracker, &TriagePolicy::default(), &options()).unwrap();
    assert!(summary.stats.is_empty());
    assert!(summary.published.is_none());
    assert_eq!(tracker.mutation_count(), 0);
}
