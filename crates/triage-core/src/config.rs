use crate::error::{Result, TriageError};
use crate::policy::{default_criteria_keywords, default_phase_labels, TriagePolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProjectId
// ---------------------------------------------------------------------------

/// GitLab accepts either the numeric project id or the `group/project` path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    Numeric(u64),
    Path(String),
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectId::Numeric(n) => write!(f, "{n}"),
            ProjectId::Path(p) => f.write_str(p),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(alias = "gitlab_url")]
    pub tracker_url: String,
    #[serde(default, alias = "private_token")]
    pub access_token: String,
    pub project_id: ProjectId,

    #[serde(default = "default_stale_days")]
    pub stale_days: u32,
    #[serde(default = "default_warning_days")]
    pub warning_days: u32,
    #[serde(default = "default_phase_labels")]
    pub phase_labels: Vec<String>,
    #[serde(default = "default_current_phase_label")]
    pub current_phase_label: String,
    #[serde(default = "default_bot_label")]
    pub bot_label: String,
    #[serde(default = "default_warning_label")]
    pub warning_label: String,
    #[serde(default = "default_unclear_label")]
    pub unclear_label: String,
    #[serde(default = "default_criteria_label")]
    pub criteria_label: String,
    #[serde(default = "default_criteria_keywords")]
    pub acceptance_criteria_keywords: Vec<String>,
    #[serde(default = "default_report_labels")]
    pub report_labels: Vec<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_stale_days() -> u32 {
    90
}

fn default_warning_days() -> u32 {
    14
}

fn default_current_phase_label() -> String {
    "phase-current".to_string()
}

fn default_bot_label() -> String {
    "bot-triage".to_string()
}

fn default_warning_label() -> String {
    "stale-warning".to_string()
}

fn default_unclear_label() -> String {
    "phase-unclear".to_string()
}

fn default_criteria_label() -> String {
    "needs-acceptance-criteria".to_string()
}

fn default_report_labels() -> Vec<String> {
    vec!["triage-report".to_string(), "team-lead".to_string()]
}

fn default_concurrency() -> usize {
    4
}

const REDACTED: &str = "***";

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TriageError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    /// An explicit token (from the environment or the command line) wins over
    /// the file.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.access_token = token;
        }
        self
    }

    pub fn policy(&self) -> TriagePolicy {
        TriagePolicy {
            stale_days: self.stale_days,
            warning_days: self.warning_days,
            current_phase_label: self.current_phase_label.clone(),
            phase_labels: self.phase_labels.clone(),
            warning_label: self.warning_label.clone(),
            bot_label: self.bot_label.clone(),
            unclear_label: self.unclear_label.clone(),
            criteria_label: self.criteria_label.clone(),
            acceptance_criteria_keywords: self.acceptance_criteria_keywords.clone(),
        }
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if !cfg.access_token.is_empty() {
            cfg.access_token = REDACTED.to_string();
        }
        cfg
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        for (key, value) in [
            ("tracker_url", &self.tracker_url),
            ("access_token", &self.access_token),
            ("current_phase_label", &self.current_phase_label),
            ("bot_label", &self.bot_label),
            ("warning_label", &self.warning_label),
            ("unclear_label", &self.unclear_label),
            ("criteria_label", &self.criteria_label),
        ] {
            if value.trim().is_empty() {
                error(format!("'{key}' must not be empty"));
            }
        }
        if let ProjectId::Path(p) = &self.project_id {
            if p.trim().is_empty() {
                error("'project_id' must not be empty".to_string());
            }
        }

        if self.stale_days == 0 {
            error("'stale_days' must be at least 1".to_string());
        }
        if self.warning_days == 0 {
            error("'warning_days' must be at least 1".to_string());
        }
        if self.stale_days > 0 && self.warning_days >= self.stale_days {
            error(format!(
                "'warning_days' ({}) must be smaller than 'stale_days' ({})",
                self.warning_days, self.stale_days
            ));
        }
        if self.concurrency == 0 {
            error("'concurrency' must be at least 1".to_string());
        }

        if !self.phase_labels.contains(&self.current_phase_label) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "current_phase_label '{}' is not listed in phase_labels",
                    self.current_phase_label
                ),
            });
        }
        if self.acceptance_criteria_keywords.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "acceptance_criteria_keywords is empty; every current-phase issue will be flagged"
                    .to_string(),
            });
        }
        if self.http.retry_max_attempts > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "http.retry_max_attempts={} (>10 is unusual)",
                    self.http.retry_max_attempts
                ),
            });
        }

        warnings
    }

    /// Fails on the first error-level finding; returns the remaining warnings.
    pub fn ensure_valid(&self) -> Result<Vec<ConfigWarning>> {
        let findings = self.validate();
        let errors: Vec<&str> = findings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        if !errors.is_empty() {
            return Err(TriageError::InvalidConfig(errors.join("; ")));
        }
        Ok(findings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
