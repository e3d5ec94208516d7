//! Objective evaluation for one executed command.

use std::collections::BTreeSet;

use crate::objective::{EvalContext, Objective};

/// Result of grading one command against a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grade {
    /// Objective ids satisfied by this command, in catalog order.
    pub newly_completed: Vec<String>,
    /// Every objective of the challenge is now complete.
    pub all_completed: bool,
}

/// Ids of objectives newly satisfied by the command in `ctx`.
///
/// Objectives already in `already_completed` are skipped, so an id is never
/// reported twice.
pub fn evaluate(
    ctx: &EvalContext<'_>,
    objectives: &[Objective],
    already_completed: &BTreeSet<String>,
) -> Vec<String> {
    objectives
        .iter()
        .filter(|o| !already_completed.contains(&o.id))
        .filter(|o| o.rule.matches(ctx))
        .map(|o| o.id.clone())
        .collect()
}

/// Evaluate and report whether the challenge is now fully complete.
pub fn grade(
    ctx: &EvalContext<'_>,
    objectives: &[Objective],
    already_completed: &BTreeSet<String>,
) -> Grade {
    let newly_completed = evaluate(ctx, objectives, already_completed);
    let all_completed = !objectives.is_empty()
        && objectives
            .iter()
            .all(|o| already_completed.contains(&o.id) || newly_completed.contains(&o.id));
    Grade {
        newly_completed,
        all_completed,
    }
}
