use crate::error::Result;
use crate::policy::TriagePolicy;
use crate::tracker::{CreatedIssue, Tracker};
use crate::types::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// TriageStats
// ---------------------------------------------------------------------------

/// Per-run counters. Workers keep partial sums and merge them after joining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageStats {
    pub stale_warned: u32,
    pub stale_closed: u32,
    pub missing_phase_label: u32,
    pub missing_criteria: u32,
    pub needs_team_lead: u32,
}

impl TriageStats {
    pub fn record(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::StaleWarned => &mut self.stale_warned,
            Outcome::StaleClosed => &mut self.stale_closed,
            Outcome::MissingPhaseLabel => &mut self.missing_phase_label,
            Outcome::MissingCriteria => &mut self.missing_criteria,
            Outcome::NeedsTeamLead => &mut self.needs_team_lead,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn merge(&mut self, other: &TriageStats) {
        self.stale_warned += other.stale_warned;
        self.stale_closed += other.stale_closed;
        self.missing_phase_label += other.missing_phase_label;
        self.missing_criteria += other.missing_criteria;
        self.needs_team_lead += other.needs_team_lead;
    }

    pub fn is_empty(&self) -> bool {
        *self == TriageStats::default()
    }

    /// Snapshot the counters for reporting.
    pub fn render(&self, now: DateTime<Utc>) -> ReportRecord {
        ReportRecord {
            generated_at: now,
            stats: *self,
        }
    }
}

// ---------------------------------------------------------------------------
// ReportRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub generated_at: DateTime<Utc>,
    pub stats: TriageStats,
}

impl ReportRecord {
    pub fn title(&self) -> String {
        format!("Weekly Triage Report - {}", self.generated_at.format("%Y-%m-%d"))
    }

    /// Rows for the summary table, in display order.
    pub fn rows(&self) -> [(&'static str, u32); 5] {
        let s = &self.stats;
        [
            ("Stale Warnings Posted", s.stale_warned),
            ("Stale Issues Closed", s.stale_closed),
            ("Issues Missing Phase Labels", s.missing_phase_label),
            ("Issues Missing Acceptance Criteria", s.missing_criteria),
            ("Issues Needing Team Lead Decision", s.needs_team_lead),
        ]
    }

    pub fn should_publish(&self, dry_run: bool) -> bool {
        !dry_run && !self.stats.is_empty()
    }

    pub fn body(&self, policy: &TriagePolicy) -> String {
        let s = &self.stats;
        let mut body = format!(
            "## {}\n\n_Automated triage run completed at {}._\n\n### Summary\n\n\
             | Category | Count |\n|----------|-------|\n",
            self.title(),
            self.generated_at.format("%Y-%m-%d %H:%M UTC"),
        );
        for (label, count) in self.rows() {
            body.push_str(&format!("| {label} | {count} |\n"));
        }

        body.push_str("\n### Actions Required\n\n");
        let mut any = false;
        if s.missing_phase_label > 0 {
            any = true;
            body.push_str(&format!(
                "- **{} issues** missing a phase label (labeled `{}`)\n",
                s.missing_phase_label, policy.unclear_label
            ));
        }
        if s.missing_criteria > 0 {
            any = true;
            body.push_str(&format!(
                "- **{} issues** in the current phase missing acceptance criteria\n",
                s.missing_criteria
            ));
        }
        if s.needs_team_lead > 0 {
            any = true;
            body.push_str(&format!(
                "- **{} issues** labeled `{}` need a Team Lead decision\n",
                s.needs_team_lead, policy.unclear_label
            ));
        }
        if !any {
            body.push_str("- None\n");
        }

        body.push_str(&format!(
            "\n### Next Steps\n\n\
             1. **Team Lead**: review issues labeled `{unclear}` and assign a phase label\n\
             2. **Team Lead**: review issues labeled `{criteria}` and add criteria or ask the product owner\n\
             3. **Everyone**: check whether any closed issue should be reopened\n\n\
             ---\n\
             *Automated report from the issue triage bot.*\n",
            unclear = policy.unclear_label,
            criteria = policy.criteria_label,
        ));
        body
    }
}

/// Create the report issue when the run warrants one. Returns `None` for dry
/// runs and for runs where every counter is zero.
pub fn publish<T: Tracker + ?Sized>(
    tracker: &T,
    report: &ReportRecord,
    policy: &TriagePolicy,
    report_labels: &[String],
    dry_run: bool,
) -> Result<Option<CreatedIssue>> {
    if !report.should_publish(dry_run) {
        return Ok(None);
    }
    let mut labels = report_labels.to_vec();
    if !labels.contains(&policy.bot_label) {
        labels.push(policy.bot_label.clone());
    }
    let created = tracker.create_issue(&report.title(), &report.body(policy), &labels)?;
    info!(issue = %created.id, "created triage report");
    Ok(Some(created))
}
