use crate::classifier::{EvalContext, Rule};
use crate::types::{Action, QualityFlag, TriageState};

// ---------------------------------------------------------------------------
// Helper macro for concise rule definitions
// ---------------------------------------------------------------------------

macro_rules! rule {
    (
        id: $id:expr,
        condition: $cond:expr,
        state: $state:expr,
        message: $msg:expr
        $(, action: $action:expr)?
    ) => {
        Rule {
            id: $id,
            condition: $cond,
            state: $state,
            message: $msg,
            action: {
                #[allow(unused_assignments, unused_mut)]
                let mut v: fn(&EvalContext) -> Action = |_| Action::None;
                $(v = $action;)?
                v
            },
        }
    };
}

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn is_current_phase(ctx: &EvalContext) -> bool {
    ctx.snapshot.has_label(&ctx.policy.current_phase_label)
}

fn has_warning_label(ctx: &EvalContext) -> bool {
    ctx.snapshot.has_label(&ctx.policy.warning_label)
}

fn warning_pending(ctx: &EvalContext) -> bool {
    ctx.warning_anchor()
        .map(|c| c.created_at > ctx.cutoffs.warning_cutoff)
        .unwrap_or(false)
}

fn close_after_warning(ctx: &EvalContext) -> Action {
    ctx.warning_anchor()
        .map(|c| Action::CloseStale {
            warning_date: c.created_at,
        })
        .unwrap_or(Action::None)
}

// ---------------------------------------------------------------------------
// Default rules (priority-ordered)
// ---------------------------------------------------------------------------

pub fn default_rules() -> Vec<Rule> {
    vec![
        // 1. Actively worked issues are never warned or closed
        rule! {
            id: "current_phase_exempt",
            condition: is_current_phase,
            state: TriageState::Exempt,
            message: |ctx| format!(
                "Issue {} carries '{}' and is exempt from the stale rule.",
                ctx.snapshot.id(),
                ctx.policy.current_phase_label
            )
        },
        // 2. Activity inside the stale window
        rule! {
            id: "recent_activity",
            condition: |ctx| !ctx.is_stale(),
            state: TriageState::Fresh,
            message: |ctx| format!(
                "Issue {} was active {} day(s) ago.",
                ctx.snapshot.id(),
                ctx.days_since_activity()
            )
        },
        // 3. Stale, never warned
        rule! {
            id: "stale_unwarned",
            condition: |ctx| !has_warning_label(ctx),
            state: TriageState::StaleUnwarned,
            message: |ctx| format!(
                "Issue {} has been inactive for {} day(s). Posting stale warning.",
                ctx.snapshot.id(),
                ctx.days_since_activity()
            ),
            action: |_| Action::PostWarning
        },
        // 4. Label present but its warning comment is missing or was answered
        rule! {
            id: "warning_label_without_comment",
            condition: |ctx| ctx.warning_anchor().is_none(),
            state: TriageState::StaleUnwarned,
            message: |ctx| format!(
                "Issue {} has '{}' but no open warning comment. Re-posting the warning.",
                ctx.snapshot.id(),
                ctx.policy.warning_label
            ),
            action: |_| Action::PostWarning
        },
        // 5. Warned, countdown still running
        rule! {
            id: "warning_pending",
            condition: warning_pending,
            state: TriageState::StaleWarnedWaiting,
            message: |ctx| format!(
                "Issue {} was warned {} day(s) ago; closing after {}.",
                ctx.snapshot.id(),
                ctx.days_since_warning().unwrap_or_default(),
                ctx.policy.warning_days
            )
        },
        // 6. Warned, countdown elapsed without a response
        rule! {
            id: "warning_expired",
            condition: |_| true,
            state: TriageState::StaleWarnedExpired,
            message: |ctx| format!(
                "Issue {} was warned {} day(s) ago without a response. Closing.",
                ctx.snapshot.id(),
                ctx.days_since_warning().unwrap_or_default()
            ),
            action: close_after_warning
        },
    ]
}

// ---------------------------------------------------------------------------
// Quality checks (independent of staleness)
// ---------------------------------------------------------------------------

pub fn quality_flags(ctx: &EvalContext) -> Vec<QualityFlag> {
    let mut flags = Vec::new();

    let has_phase = ctx
        .snapshot
        .labels()
        .iter()
        .any(|l| ctx.policy.is_phase_label(l));
    if !has_phase {
        flags.push(QualityFlag::MissingPhaseLabel);
    }

    if is_current_phase(ctx)
        && !ctx
            .policy
            .mentions_acceptance_criteria(ctx.snapshot.description())
    {
        flags.push(QualityFlag::MissingCriteria);
    }

    if ctx.snapshot.has_label(&ctx.policy.unclear_label) {
        flags.push(QualityFlag::NeedsTeamLead);
    }

    flags
}
