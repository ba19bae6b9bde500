//! GitLab REST v4 implementation of [`Tracker`].
//!
//! Every call is a blocking request with bounded retry. Reads and full-state
//! writes (GET, PUT) retry transport errors and 429/5xx responses with
//! exponential backoff, honouring `Retry-After` up to a cap. POSTs that create
//! something only retry when GitLab cannot have acted on them: a refused
//! connection or a 429. 401/403 map to [`TriageError::Auth`].

use crate::config::{Config, HttpConfig, ProjectId};
use crate::error::{Result, TriageError};
use crate::tracker::{
    CreatedIssue, ProjectInfo, TrackedComment, TrackedIssue, TrackedLabelEvent, Tracker,
};
use crate::types::IssueId;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_RETRY_DELAY_MS: u64 = 30_000;
const ERROR_BODY_CHARS: usize = 800;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GitlabProject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitlabIssue {
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct GitlabNote {
    #[serde(default)]
    body: String,
    created_at: String,
    #[serde(default)]
    system: bool,
}

#[derive(Debug, Deserialize)]
struct GitlabUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitlabLabelEvent {
    created_at: String,
    /// Null when the acting user has since been deleted.
    #[serde(default)]
    user: Option<GitlabUser>,
}

#[derive(Debug, Deserialize)]
struct GitlabCreatedIssue {
    iid: u64,
    #[serde(default)]
    web_url: Option<String>,
}

// ---------------------------------------------------------------------------
// GitlabTracker
// ---------------------------------------------------------------------------

/// Whether a request may be sent again after GitLab might have processed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads and PUTs that set the full state.
    Safe,
    /// POSTs that create a note or issue each time they land.
    OnlyUndelivered,
}

impl Replay {
    fn retries_status(self, status: u16) -> bool {
        match self {
            Replay::Safe => is_retryable_status(status),
            Replay::OnlyUndelivered => status == 429,
        }
    }

    fn retries_error(self, error: &reqwest::Error) -> bool {
        match self {
            Replay::Safe => is_retryable_transport_error(error),
            Replay::OnlyUndelivered => error.is_connect(),
        }
    }
}

pub struct GitlabTracker {
    client: Client,
    user_url: Url,
    project_url: Url,
    /// Username behind the access token, resolved on first use.
    bot_username: OnceLock<String>,
    token: String,
    retry_max_attempts: u32,
    retry_base_delay_ms: u64,
    page_size: u32,
}

impl GitlabTracker {
    pub fn new(base_url: &str, token: &str, project: &ProjectId, http: &HttpConfig) -> Result<Self> {
        let mut api_url =
            Url::parse(base_url.trim()).map_err(|_| TriageError::InvalidUrl(base_url.to_string()))?;
        api_url
            .path_segments_mut()
            .map_err(|_| TriageError::InvalidUrl(base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"]);
        let project = project.to_string();
        let mut project_url = api_url.clone();
        let mut user_url = api_url;
        if let Ok(mut path) = project_url.path_segments_mut() {
            path.extend(["projects", project.as_str()]);
        }
        if let Ok(mut path) = user_url.path_segments_mut() {
            path.push("user");
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(http.request_timeout_ms))
            .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| TriageError::Http {
                operation: "build client".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            user_url,
            project_url,
            bot_username: OnceLock::new(),
            token: token.to_string(),
            retry_max_attempts: http.retry_max_attempts.max(1),
            retry_base_delay_ms: http.retry_base_delay_ms.max(1),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.tracker_url,
            &config.access_token,
            &config.project_id,
            &config.http,
        )
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.project_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
    }

    /// Sends the request built by `build`, retrying the transient failures
    /// `replay` allows.
    fn send<F>(&self, operation: &str, replay: Replay, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);
            match build().send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(TriageError::Auth {
                            operation: operation.to_string(),
                            status: status.as_u16(),
                        });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().unwrap_or_default();
                    if attempt < self.retry_max_attempts && replay.retries_status(status.as_u16()) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, retry_after);
                        debug!(operation, status = status.as_u16(), attempt, ?delay, "retrying");
                        std::thread::sleep(delay);
                        continue;
                    }
                    return Err(TriageError::Tracker {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, ERROR_BODY_CHARS),
                    });
                }
                Err(source) => {
                    if attempt < self.retry_max_attempts && replay.retries_error(&source) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, None);
                        debug!(operation, attempt, ?delay, error = %source, "retrying");
                        std::thread::sleep(delay);
                        continue;
                    }
                    return Err(TriageError::Http {
                        operation: operation.to_string(),
                        source,
                    });
                }
            }
        }
    }

    fn request_json<T, F>(&self, operation: &str, replay: Replay, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        self.send(operation, replay, build)?
            .json::<T>()
            .map_err(|source| TriageError::Http {
                operation: operation.to_string(),
                source,
            })
    }

    /// Walks `?page=N` until a short page comes back.
    fn paginate<T, F>(&self, operation: &str, build: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(u32) -> RequestBuilder,
    {
        let mut out = Vec::new();
        let mut page = 1_u32;
        loop {
            let batch: Vec<T> = self.request_json(operation, Replay::Safe, || {
                build(page).query(&[
                    ("per_page", self.page_size.to_string()),
                    ("page", page.to_string()),
                ])
            })?;
            let len = batch.len();
            out.extend(batch);
            if len < self.page_size as usize {
                return Ok(out);
            }
            page += 1;
        }
    }

    fn bot_username(&self) -> Result<&str> {
        if let Some(name) = self.bot_username.get() {
            return Ok(name);
        }
        let user: GitlabUser = self.request_json("current user", Replay::Safe, || {
            self.request(Method::GET, self.user_url.clone())
        })?;
        Ok(self.bot_username.get_or_init(|| user.username))
    }
}

impl Tracker for GitlabTracker {
    fn verify_access(&self) -> Result<ProjectInfo> {
        let project: GitlabProject = self.request_json("verify access", Replay::Safe, || {
            self.request(Method::GET, self.project_url.clone())
        })?;
        Ok(ProjectInfo { name: project.name })
    }

    fn list_open_issues(&self, label_filter: Option<&[String]>) -> Result<Vec<TrackedIssue>> {
        let url = self.url(&["issues"]);
        let labels = label_filter.map(|l| l.join(","));
        let issues: Vec<GitlabIssue> = self.paginate("list issues", |_| {
            let mut req = self
                .request(Method::GET, url.clone())
                .query(&[("state", "opened")]);
            if let Some(labels) = &labels {
                req = req.query(&[("labels", labels.as_str())]);
            }
            req
        })?;
        Ok(issues
            .into_iter()
            .map(|i| TrackedIssue {
                id: IssueId(i.iid),
                title: i.title,
                description: i.description,
                labels: i.labels,
                created_at: i.created_at,
                updated_at: i.updated_at,
            })
            .collect())
    }

    fn list_comments(&self, issue: IssueId) -> Result<Vec<TrackedComment>> {
        let url = self.url(&["issues", &issue.0.to_string(), "notes"]);
        let notes: Vec<GitlabNote> = self.paginate("list comments", |_| {
            self.request(Method::GET, url.clone())
                .query(&[("sort", "asc"), ("order_by", "created_at")])
        })?;
        Ok(notes
            .into_iter()
            .filter(|n| !n.system)
            .map(|n| TrackedComment {
                body: n.body,
                created_at: n.created_at,
            })
            .collect())
    }

    fn list_label_events(&self, issue: IssueId) -> Result<Vec<TrackedLabelEvent>> {
        let bot = self.bot_username()?;
        let url = self.url(&["issues", &issue.0.to_string(), "resource_label_events"]);
        let events: Vec<GitlabLabelEvent> = self.paginate("list label events", |_| {
            self.request(Method::GET, url.clone())
        })?;
        Ok(events
            .into_iter()
            .map(|e| TrackedLabelEvent {
                by_bot: e.user.is_some_and(|u| u.username == bot),
                created_at: e.created_at,
            })
            .collect())
    }

    fn post_comment(&self, issue: IssueId, body: &str) -> Result<()> {
        let url = self.url(&["issues", &issue.0.to_string(), "notes"]);
        let payload = json!({ "body": body });
        self.send("post comment", Replay::OnlyUndelivered, || {
            self.request(Method::POST, url.clone()).json(&payload)
        })?;
        Ok(())
    }

    fn set_labels(&self, issue: IssueId, labels: &BTreeSet<String>) -> Result<()> {
        let url = self.url(&["issues", &issue.0.to_string()]);
        let joined = labels.iter().cloned().collect::<Vec<_>>().join(",");
        let payload = json!({ "labels": joined });
        self.send("set labels", Replay::Safe, || {
            self.request(Method::PUT, url.clone()).json(&payload)
        })?;
        Ok(())
    }

    fn close_issue(&self, issue: IssueId) -> Result<()> {
        let url = self.url(&["issues", &issue.0.to_string()]);
        let payload = json!({ "state_event": "close" });
        self.send("close issue", Replay::Safe, || {
            self.request(Method::PUT, url.clone()).json(&payload)
        })?;
        Ok(())
    }

    fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<CreatedIssue> {
        let url = self.url(&["issues"]);
        let payload = json!({
            "title": title,
            "description": body,
            "labels": labels.join(","),
        });
        let created: GitlabCreatedIssue =
            self.request_json("create issue", Replay::OnlyUndelivered, || {
                self.request(Method::POST, url.clone()).json(&payload)
            })?;
        Ok(CreatedIssue {
            id: IssueId(created.iid),
            url: created.web_url,
        })
    }
}

// ---------------------------------------------------------------------------
// Retry helpers
// ---------------------------------------------------------------------------

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

fn retry_delay(base_delay_ms: u64, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let cap = Duration::from_millis(MAX_RETRY_DELAY_MS);
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms)).min(cap);
    }
    let exponent = attempt.saturating_sub(1).min(10);
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(MAX_RETRY_DELAY_MS))
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
