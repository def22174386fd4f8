//! Step planning.
//!
//! Turns a [`MapDiff`] into the smallest step list that brings the compiled
//! map up to date, derived from the user's full step list.

use crate::build::step::{BuildStep, StepKind};
use crate::diff::MapDiff;

/// How a tool step is invoked in a reduced plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Configured arguments, unmodified
    Full,
    /// Entities-only marker, then configured arguments
    EntitiesOnly,
}

/// Tool steps required for a diff, in full-build order.
///
/// First matching category wins: geometry, then light, then entity.
fn reduction(diff: &MapDiff) -> &'static [(StepKind, Scope)] {
    if diff.geometry {
        &[(StepKind::Bsp, Scope::Full), (StepKind::Light, Scope::Full), (StepKind::Vis, Scope::Full)]
    } else if diff.light {
        &[(StepKind::Bsp, Scope::EntitiesOnly), (StepKind::Light, Scope::Full)]
    } else if diff.entity {
        &[(StepKind::Bsp, Scope::EntitiesOnly)]
    } else {
        &[]
    }
}

/// Join a reduced-scope marker and configured arguments with one space.
pub fn merge_args(marker: &str, full_args: &str) -> String {
    [marker.trim(), full_args.trim()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plan the steps needed for `diff`.
///
/// Custom steps keep their positions in `full_steps`. Tool steps are kept
/// when the diff needs them and dropped otherwise; a diff with no changes
/// yields an empty plan.
pub fn plan_steps(diff: &MapDiff, full_steps: &[BuildStep], entities_only_arg: &str) -> Vec<BuildStep> {
    let needed = reduction(diff);
    if needed.is_empty() {
        return Vec::new();
    }

    full_steps
        .iter()
        .filter_map(|step| {
            if step.kind == StepKind::Custom {
                return Some(step.clone());
            }

            let (_, scope) = needed.iter().find(|(kind, _)| *kind == step.kind)?;
            let mut reduced = step.clone();
            if *scope == Scope::EntitiesOnly {
                reduced.args = merge_args(entities_only_arg, &step.args);
            }
            Some(reduced)
        })
        .collect()
}

/// Render a plan as one line per step.
pub fn describe_plan(steps: &[BuildStep]) -> String {
    if steps.is_empty() {
        return "No steps (map is up to date)".to_string();
    }

    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let disabled = if step.enabled { "" } else { " [disabled]" };
            match step.kind {
                StepKind::Custom => format!("{}. {}{}", i + 1, step.label(), disabled),
                _ if step.args.trim().is_empty() => format!("{}. {}{}", i + 1, step.kind, disabled),
                _ => format!("{}. {} {}{}", i + 1, step.kind, step.args.trim(), disabled),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
