//! Comment templates and the marker substrings that identify them.
//!
//! Markers are the only memory the bot keeps between runs. Each comment the
//! bot writes carries a hidden tag plus the visible heading earlier releases
//! used; a comment matches if it contains either. Neither string may change.

use crate::policy::TriagePolicy;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub tag: &'static str,
    pub legacy: &'static str,
}

impl Marker {
    pub fn matches(&self, body: &str) -> bool {
        body.contains(self.tag) || body.contains(self.legacy)
    }
}

pub const STALE_WARNING: Marker = Marker {
    tag: "<!-- triage-bot:stale-warning -->",
    legacy: "🤖 Automated Triage Notice",
};

pub const STALE_CLOSURE: Marker = Marker {
    tag: "<!-- triage-bot:stale-closure -->",
    legacy: "🤖 Automated Closure",
};

pub const MISSING_CRITERIA: Marker = Marker {
    tag: "<!-- triage-bot:missing-criteria -->",
    legacy: "⚠️ Issue Quality Check",
};

const ALL_MARKERS: [Marker; 3] = [STALE_WARNING, STALE_CLOSURE, MISSING_CRITERIA];

/// True if the body was written by this bot.
pub fn is_bot_comment(body: &str) -> bool {
    ALL_MARKERS.iter().any(|m| m.matches(body))
}

pub fn stale_warning(policy: &TriagePolicy) -> String {
    format!(
        "{tag}\n**{legacy}**\n\n\
         This issue has had no activity for **{stale}+ days** and is not labeled `{current}`.\n\n\
         If it is still relevant, please:\n\
         1. Comment with why it should stay open\n\
         2. Update the description with current context\n\
         3. Add a phase label ({phases})\n\n\
         **Without a response within {warning} days** this issue will be closed automatically.\n\n\
         ---\n\
         *Automated message from the issue triage bot.*\n",
        tag = STALE_WARNING.tag,
        legacy = STALE_WARNING.legacy,
        stale = policy.stale_days,
        current = policy.current_phase_label,
        phases = backticked(&policy.phase_labels),
        warning = policy.warning_days,
    )
}

pub fn stale_closure(policy: &TriagePolicy, warning_date: DateTime<Utc>) -> String {
    format!(
        "{tag}\n**{legacy}**\n\n\
         This issue was closed automatically because:\n\
         - It had no activity for **{stale}+ days**\n\
         - The {warning}-day warning posted on {date} got no response\n\
         - It is not labeled `{current}`\n\n\
         **Closing does not mean the issue is invalid.** If it still matters, reopen it, \
         add current context and a phase label, and tag the team lead for review.\n\n\
         ---\n\
         *Automated message from the issue triage bot.*\n",
        tag = STALE_CLOSURE.tag,
        legacy = STALE_CLOSURE.legacy,
        stale = policy.stale_days,
        warning = policy.warning_days,
        date = warning_date.format("%Y-%m-%d"),
        current = policy.current_phase_label,
    )
}

pub fn missing_criteria(policy: &TriagePolicy) -> String {
    format!(
        "{tag}\n**{legacy}**\n\n\
         This issue is labeled `{current}` but has no **acceptance criteria**, \
         which are required before work can begin.\n\n\
         Every issue needs:\n\
         1. A clear title\n\
         2. Context (why this matters)\n\
         3. **Acceptance criteria** (how we know it is done) ← **missing**\n\
         4. A specification reference\n\
         5. Phase alignment\n\
         6. An estimate\n\
         7. Dependencies\n\n\
         Please add acceptance criteria, or this issue may be closed as incomplete.\n\n\
         ---\n\
         *Automated message from the issue triage bot.*\n",
        tag = MISSING_CRITERIA.tag,
        legacy = MISSING_CRITERIA.legacy,
        current = policy.current_phase_label,
    )
}

fn backticked(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| format!("`{l}`"))
        .collect::<Vec<_>>()
        .join(", ")
}
