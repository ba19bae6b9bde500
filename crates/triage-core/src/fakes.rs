//! In-memory tracker for tests.
//!
//! `MemoryTracker` behaves like a small GitLab project: posting a comment or
//! touching labels bumps the issue's `updated_at` to the tracker clock, label
//! writes leave bot-authored label events behind, and every mutating call is
//! recorded so tests can count side effects.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, TriageError};
use crate::snapshot::Comment;
use crate::tracker::{
    CreatedIssue, ProjectInfo, TrackedComment, TrackedIssue, TrackedLabelEvent, Tracker,
};
use crate::types::IssueId;

// ---------------------------------------------------------------------------
// FakeIssue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FakeIssue {
    pub id: IssueId,
    pub title: String,
    pub description: Option<String>,
    pub labels: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub comments: Vec<Comment>,
    /// `(when, by_bot)` for every label added or removed.
    pub label_events: Vec<(DateTime<Utc>, bool)>,
    pub open: bool,
    /// Served verbatim as `updated_at` when set.
    pub raw_updated_at: Option<String>,
}

impl FakeIssue {
    /// An open issue created and last touched at `last_activity`.
    pub fn new(id: u64, title: &str, last_activity: DateTime<Utc>) -> Self {
        Self {
            id: IssueId(id),
            title: title.to_string(),
            description: None,
            labels: BTreeSet::new(),
            created_at: last_activity,
            updated_at: last_activity,
            comments: Vec::new(),
            label_events: Vec::new(),
            open: true,
            raw_updated_at: None,
        }
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Adds a historical comment without touching `updated_at`.
    pub fn comment(mut self, body: &str, created_at: DateTime<Utc>) -> Self {
        self.comments.push(Comment::new(body, created_at));
        self
    }

    /// A historical label change made by a person, without touching `updated_at`.
    pub fn human_label_event(mut self, at: DateTime<Utc>) -> Self {
        self.label_events.push((at, false));
        self
    }

    pub fn raw_updated_at(mut self, raw: &str) -> Self {
        self.raw_updated_at = Some(raw.to_string());
        self
    }

    pub fn count_marked(&self, marker: crate::templates::Marker) -> usize {
        self.comments.iter().filter(|c| marker.matches(&c.body)).count()
    }
}

// ---------------------------------------------------------------------------
// Recorded calls and failure injection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    PostComment { issue: IssueId, body: String },
    SetLabels { issue: IssueId, labels: BTreeSet<String> },
    Close { issue: IssueId },
    CreateIssue { title: String, body: String, labels: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    ListComments(IssueId),
    ListLabelEvents(IssueId),
    PostComment(IssueId),
    SetLabels(IssueId),
    Close(IssueId),
    CreateIssue,
}

#[derive(Debug)]
struct FakeState {
    now: DateTime<Utc>,
    issues: BTreeMap<IssueId, FakeIssue>,
    calls: Vec<RecordedCall>,
    failures: Vec<FailOn>,
    deny_access: bool,
}

// ---------------------------------------------------------------------------
// MemoryTracker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MemoryTracker {
    project: String,
    state: Mutex<FakeState>,
}

impl MemoryTracker {
    pub fn new(project: &str, now: DateTime<Utc>) -> Self {
        Self {
            project: project.to_string(),
            state: Mutex::new(FakeState {
                now,
                issues: BTreeMap::new(),
                calls: Vec::new(),
                failures: Vec::new(),
                deny_access: false,
            }),
        }
    }

    pub fn with_issue(self, issue: FakeIssue) -> Self {
        self.lock().issues.insert(issue.id, issue);
        self
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
    }

    pub fn fail(&self, on: FailOn) {
        self.lock().failures.push(on);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn deny_access(&self) {
        self.lock().deny_access = true;
    }

    pub fn issue(&self, id: u64) -> Option<FakeIssue> {
        self.lock().issues.get(&IssueId(id)).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(state: &FakeState, on: FailOn, operation: &str) -> Result<()> {
        if state.failures.contains(&on) {
            return Err(TriageError::Tracker {
                operation: operation.to_string(),
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn touch<'s>(state: &'s mut FakeState, issue: IssueId) -> Result<&'s mut FakeIssue> {
        let now = state.now;
        let entry = state
            .issues
            .get_mut(&issue)
            .ok_or_else(|| TriageError::IssueNotFound(issue.to_string()))?;
        entry.updated_at = now;
        entry.raw_updated_at = None;
        Ok(entry)
    }
}

impl Tracker for MemoryTracker {
    fn verify_access(&self) -> Result<ProjectInfo> {
        if self.lock().deny_access {
            return Err(TriageError::Auth {
                operation: "verify access".to_string(),
                status: 401,
            });
        }
        Ok(ProjectInfo {
            name: self.project.clone(),
        })
    }

    fn list_open_issues(&self, label_filter: Option<&[String]>) -> Result<Vec<TrackedIssue>> {
        let state = self.lock();
        Ok(state
            .issues
            .values()
            .filter(|i| i.open)
            .filter(|i| label_filter.map_or(true, |f| f.iter().all(|l| i.labels.contains(l))))
            .map(|i| TrackedIssue {
                id: i.id,
                title: i.title.clone(),
                description: i.description.clone(),
                labels: i.labels.iter().cloned().collect(),
                created_at: i.created_at.to_rfc3339(),
                updated_at: i
                    .raw_updated_at
                    .clone()
                    .unwrap_or_else(|| i.updated_at.to_rfc3339()),
            })
            .collect())
    }

    fn list_comments(&self, issue: IssueId) -> Result<Vec<TrackedComment>> {
        let state = self.lock();
        Self::check(&state, FailOn::ListComments(issue), "list comments")?;
        let entry = state
            .issues
            .get(&issue)
            .ok_or_else(|| TriageError::IssueNotFound(issue.to_string()))?;
        Ok(entry
            .comments
            .iter()
            .map(|c| TrackedComment {
                body: c.body.clone(),
                created_at: c.created_at.to_rfc3339(),
            })
            .collect())
    }

    fn list_label_events(&self, issue: IssueId) -> Result<Vec<TrackedLabelEvent>> {
        let state = self.lock();
        Self::check(&state, FailOn::ListLabelEvents(issue), "list label events")?;
        let entry = state
            .issues
            .get(&issue)
            .ok_or_else(|| TriageError::IssueNotFound(issue.to_string()))?;
        Ok(entry
            .label_events
            .iter()
            .map(|(at, by_bot)| TrackedLabelEvent {
                created_at: at.to_rfc3339(),
                by_bot: *by_bot,
            })
            .collect())
    }

    fn post_comment(&self, issue: IssueId, body: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, FailOn::PostComment(issue), "post comment")?;
        let now = state.now;
        Self::touch(&mut state, issue)?
            .comments
            .push(Comment::new(body, now));
        state.calls.push(RecordedCall::PostComment {
            issue,
            body: body.to_string(),
        });
        Ok(())
    }

    fn set_labels(&self, issue: IssueId, labels: &BTreeSet<String>) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, FailOn::SetLabels(issue), "set labels")?;
        let now = state.now;
        let current = &state
            .issues
            .get(&issue)
            .ok_or_else(|| TriageError::IssueNotFound(issue.to_string()))?
            .labels;
        // Unchanged label sets leave no trace on the issue.
        let changed = current.symmetric_difference(labels).count();
        if changed > 0 {
            let entry = Self::touch(&mut state, issue)?;
            entry.labels = labels.clone();
            entry
                .label_events
                .extend(std::iter::repeat((now, true)).take(changed));
        }
        state.calls.push(RecordedCall::SetLabels {
            issue,
            labels: labels.clone(),
        });
        Ok(())
    }

    fn close_issue(&self, issue: IssueId) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, FailOn::Close(issue), "close issue")?;
        Self::touch(&mut state, issue)?.open = false;
        state.calls.push(RecordedCall::Close { issue });
        Ok(())
    }

    fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<CreatedIssue> {
        let mut state = self.lock();
        Self::check(&state, FailOn::CreateIssue, "create issue")?;
        let id = IssueId(state.issues.keys().map(|k| k.0).max().unwrap_or(0) + 1);
        let mut issue = FakeIssue::new(id.0, title, state.now);
        issue.description = Some(body.to_string());
        issue.labels = labels.iter().cloned().collect();
        state.issues.insert(id, issue);
        state.calls.push(RecordedCall::CreateIssue {
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.to_vec(),
        });
        Ok(CreatedIssue { id, url: None })
    }
}
