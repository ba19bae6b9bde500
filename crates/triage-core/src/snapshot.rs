use crate::error::Result;
use crate::policy::parse_timestamp;
use crate::templates::{is_bot_comment, Marker};
use crate::tracker::{TrackedComment, TrackedIssue, TrackedLabelEvent};
use crate::types::IssueId;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Tracker updates this soon after the bot's own comment or label write are
/// the bot's doing.
const BOT_TOUCH_GRACE_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            body: body.into(),
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// IssueSnapshot
// ---------------------------------------------------------------------------

/// Read-only projection of one issue, captured once per pass.
#[derive(Debug, Clone, Serialize)]
pub struct IssueSnapshot {
    id: IssueId,
    title: String,
    description: Option<String>,
    labels: BTreeSet<String>,
    last_activity_at: DateTime<Utc>,
    comments: Vec<Comment>,
}

impl IssueSnapshot {
    pub fn new(
        id: IssueId,
        title: impl Into<String>,
        description: Option<String>,
        labels: impl IntoIterator<Item = impl Into<String>>,
        last_activity_at: DateTime<Utc>,
        mut comments: Vec<Comment>,
    ) -> Self {
        // Stable: comments sharing a timestamp keep their tracker order.
        comments.sort_by_key(|c| c.created_at);
        Self {
            id,
            title: title.into(),
            description,
            labels: labels.into_iter().map(Into::into).collect(),
            last_activity_at,
            comments,
        }
    }

    /// Build a snapshot from raw tracker data.
    ///
    /// Fails if any timestamp lacks an offset or does not parse. The tracker's
    /// `updated_at` is taken as the last activity unless it falls within the
    /// grace window after the bot's newest touch (a marker comment or a label
    /// change made under the bot's credentials). In that case the bot's own
    /// writes are discounted and activity reverts to the newest human comment,
    /// human label change or the issue's creation.
    pub fn capture(
        issue: &TrackedIssue,
        comments: &[TrackedComment],
        label_events: &[TrackedLabelEvent],
    ) -> Result<Self> {
        let created_at = parse_timestamp(&issue.created_at)?;
        let updated_at = parse_timestamp(&issue.updated_at)?;
        let comments = comments
            .iter()
            .map(|c| -> Result<Comment> {
                Ok(Comment::new(c.body.clone(), parse_timestamp(&c.created_at)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let label_events = label_events
            .iter()
            .map(|e| -> Result<Touch> {
                Ok(Touch {
                    at: parse_timestamp(&e.created_at)?,
                    by_bot: e.by_bot,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut snapshot = Self::new(
            issue.id,
            issue.title.clone(),
            issue.description.clone(),
            issue.labels.iter().cloned(),
            updated_at,
            comments,
        );
        let touches = snapshot
            .comments
            .iter()
            .map(|c| Touch {
                at: c.created_at,
                by_bot: is_bot_comment(&c.body),
            })
            .chain(label_events);
        snapshot.last_activity_at = reconstruct_activity(created_at, updated_at, touches);
        Ok(snapshot)
    }

    pub fn id(&self) -> IssueId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Most recent comment carrying `marker`.
    pub fn latest_marked(&self, marker: Marker) -> Option<&Comment> {
        self.comments.iter().rev().find(|c| marker.matches(&c.body))
    }

    /// Most recent comment carrying `marker` posted at or after `since`.
    pub fn latest_marked_since(&self, marker: Marker, since: DateTime<Utc>) -> Option<&Comment> {
        self.latest_marked(marker).filter(|c| c.created_at >= since)
    }

    /// Scans the full history, not a recent window.
    pub fn has_marked(&self, marker: Marker) -> bool {
        self.comments.iter().any(|c| marker.matches(&c.body))
    }
}

/// Something that bumps the tracker's `updated_at`.
#[derive(Debug, Clone, Copy)]
struct Touch {
    at: DateTime<Utc>,
    by_bot: bool,
}

fn reconstruct_activity(
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    touches: impl Iterator<Item = Touch>,
) -> DateTime<Utc> {
    let mut last_bot: Option<DateTime<Utc>> = None;
    let mut last_human = created_at;
    for touch in touches {
        if touch.by_bot {
            last_bot = last_bot.max(Some(touch.at));
        } else {
            last_human = last_human.max(touch.at);
        }
    }

    let Some(last_bot) = last_bot else {
        return updated_at;
    };
    let since_bot = updated_at - last_bot;
    if since_bot < Duration::zero() || since_bot > Duration::minutes(BOT_TOUCH_GRACE_MINUTES) {
        return updated_at;
    }
    last_human
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{STALE_CLOSURE, STALE_WARNING};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap()
    }

    fn raw(created: &str, updated: &str) -> TrackedIssue {
        TrackedIssue {
            id: IssueId(7),
            title: "Flaky login".to_string(),
            description: None,
            labels: vec!["phase-next".to_string()],
            created_at: created.to_string(),
            updated_at: updated.to_string(),
        }
    }

    fn tracked(body: &str, created: &str) -> TrackedComment {
        TrackedComment {
            body: body.to_string(),
            created_at: created.to_string(),
        }
    }

    #[test]
    fn comments_are_sorted_ascending() {
        let snap = IssueSnapshot::new(
            IssueId(1),
            "t",
            None,
            Vec::<String>::new(),
            at(1),
            vec![Comment::new("b", at(5)), Comment::new("a", at(2))],
        );
        assert_eq!(snap.comments()[0].body, "a");
        assert_eq!(snap.comments()[1].body, "b");
    }

    #[test]
    fn latest_marked_prefers_newest() {
        let snap = IssueSnapshot::new(
            IssueId(1),
            "t",
            None,
            Vec::<String>::new(),
            at(1),
            vec![
                Comment::new(format!("{} one", STALE_WARNING.tag), at(2)),
                Comment::new("human reply", at(3)),
                Comment::new(format!("{} two", STALE_WARNING.tag), at(4)),
            ],
        );
        let latest = snap.latest_marked(STALE_WARNING).unwrap();
        assert!(latest.body.ends_with("two"));
        assert!(snap.latest_marked(STALE_CLOSURE).is_none());
        assert!(snap.latest_marked_since(STALE_WARNING, at(5)).is_none());
    }

    #[test]
    fn capture_uses_updated_at_without_bot_comments() {
        let snap = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-05-01T00:00:00Z"),
            &[tracked("hello", "2024-02-01T00:00:00Z")],
            &[],
        )
        .unwrap();
        assert_eq!(
            snap.last_activity_at(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn capture_discounts_the_bots_own_touch() {
        let warning = format!("{}\nplease respond", STALE_WARNING.tag);
        let snap = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-06-01T10:02:00Z"),
            &[
                tracked("original report", "2024-02-01T00:00:00Z"),
                tracked(&warning, "2024-06-01T10:00:00Z"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(
            snap.last_activity_at(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn capture_keeps_human_activity_after_the_bot() {
        let warning = format!("{}\nplease respond", STALE_WARNING.tag);
        let snap = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-06-03T08:00:00Z"),
            &[tracked(&warning, "2024-06-01T10:00:00Z")],
            &[],
        )
        .unwrap();
        assert_eq!(
            snap.last_activity_at(),
            Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn capture_rejects_naive_timestamps() {
        let err = IssueSnapshot::capture(&raw("2024-01-01T00:00:00Z", "2024-05-01 00:00:00"), &[], &[])
            .unwrap_err();
        assert!(matches!(err, crate::error::TriageError::Timestamp { .. }));
    }

    fn label_event(created: &str, by_bot: bool) -> TrackedLabelEvent {
        TrackedLabelEvent {
            created_at: created.to_string(),
            by_bot,
        }
    }

    #[test]
    fn capture_discounts_a_later_bot_label_write() {
        // Warning posted, labels only written a week later.
        let warning = format!("{}\nplease respond", STALE_WARNING.tag);
        let snap = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-06-08T10:00:00Z"),
            &[tracked(&warning, "2024-06-01T10:00:00Z")],
            &[
                label_event("2024-06-08T10:00:00Z", true),
                label_event("2024-06-08T10:00:00Z", true),
            ],
        )
        .unwrap();
        assert_eq!(
            snap.last_activity_at(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn capture_discounts_label_only_flagging() {
        let snap = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-03-01T00:00:30Z"),
            &[tracked("first thoughts", "2024-01-10T00:00:00Z")],
            &[label_event("2024-03-01T00:00:00Z", true)],
        )
        .unwrap();
        assert_eq!(
            snap.last_activity_at(),
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn human_label_change_counts_as_activity() {
        let warning = format!("{}\nplease respond", STALE_WARNING.tag);
        let snap = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-06-01T10:05:00Z"),
            &[tracked(&warning, "2024-06-01T10:00:00Z")],
            &[label_event("2024-06-01T10:04:00Z", false)],
        )
        .unwrap();
        assert_eq!(
            snap.last_activity_at(),
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 4, 0).unwrap()
        );
    }

    #[test]
    fn capture_rejects_naive_label_event_timestamps() {
        let err = IssueSnapshot::capture(
            &raw("2024-01-01T00:00:00Z", "2024-05-01T00:00:00Z"),
            &[],
            &[label_event("2024-05-01 00:00:00", true)],
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::TriageError::Timestamp { .. }));
    }
}
