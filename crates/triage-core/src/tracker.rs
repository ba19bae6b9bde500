use crate::error::Result;
use crate::types::IssueId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An open issue as the tracker reports it. Timestamps stay raw so that one
/// malformed value only costs that issue, not the whole listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub id: IssueId,
    pub title: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedComment {
    pub body: String,
    pub created_at: String,
}

/// One label added or removed on an issue. `by_bot` is true when the change
/// was made with the credentials this bot runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedLabelEvent {
    pub created_at: String,
    pub by_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub id: IssueId,
    pub url: Option<String>,
}

/// The narrow surface the triage engine needs from an issue tracker.
///
/// Every method is one logical request. Implementations handle their own
/// retry policy; an `Err` means the request is considered failed.
pub trait Tracker: Send + Sync {
    /// Checks the credentials and resolves the project. Called once before
    /// any mutation.
    fn verify_access(&self) -> Result<ProjectInfo>;

    fn list_open_issues(&self, label_filter: Option<&[String]>) -> Result<Vec<TrackedIssue>>;

    /// Comments in chronological order.
    fn list_comments(&self, issue: IssueId) -> Result<Vec<TrackedComment>>;

    /// Label changes in chronological order.
    fn list_label_events(&self, issue: IssueId) -> Result<Vec<TrackedLabelEvent>>;

    fn post_comment(&self, issue: IssueId, body: &str) -> Result<()>;

    /// Replaces the issue's label set.
    fn set_labels(&self, issue: IssueId, labels: &BTreeSet<String>) -> Result<()>;

    fn close_issue(&self, issue: IssueId) -> Result<()>;

    fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<CreatedIssue>;
}
