//! Progress reporting over the visible steps of a catalog.

use serde::{Deserialize, Serialize};

use super::catalog::{standard_layout, Step};
use super::types::OperationMode;

/// Where a step sits relative to the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Complete,
    Current,
    Pending,
}

/// Display entry for one visible step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub name: String,
    pub icon: String,
    pub status: StepStatus,
}

/// Progress of an operation across its visible steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_visible_steps: usize,
    /// Equal to `total_visible_steps` once every step has run.
    pub current_visible_index: usize,
    /// Fraction done, in `[0, 1]`.
    pub percent: f64,
    pub steps: Vec<StepProgress>,
}

impl ProgressSummary {
    pub fn is_complete(&self) -> bool {
        self.current_visible_index >= self.total_visible_steps
    }

    /// Name of the step that runs next, if any.
    pub fn current_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Current)
            .map(|s| s.name.as_str())
    }
}

/// Summarize progress at `current_index` within the visible steps.
pub fn compute_progress(visible: &[&Step], current_index: usize) -> ProgressSummary {
    summarize(
        visible.iter().map(|step| (step.name.as_str(), step.icon.as_str())),
        current_index,
    )
}

/// Progress of a token at `step_index` in the standard catalog for `mode`.
///
/// Reads only the step layout, so nothing needs to be wired up to run.
pub fn standard_progress(
    mode: OperationMode,
    step_index: usize,
    create_restore_point: bool,
) -> ProgressSummary {
    let layout = standard_layout(mode);
    let current = layout
        .iter()
        .take(step_index)
        .filter(|info| info.is_visible(create_restore_point))
        .count();

    summarize(
        layout
            .iter()
            .filter(|info| info.is_visible(create_restore_point))
            .map(|info| (info.name, info.icon))
            .collect::<Vec<_>>()
            .into_iter(),
        current,
    )
}

fn summarize<'a>(
    visible: impl ExactSizeIterator<Item = (&'a str, &'a str)>,
    current_index: usize,
) -> ProgressSummary {
    let total = visible.len();
    let current = current_index.min(total);

    let percent = if total == 0 {
        0.0
    } else {
        (current as f64 / total as f64).clamp(0.0, 1.0)
    };

    let steps = visible
        .enumerate()
        .map(|(i, (name, icon))| StepProgress {
            name: name.to_string(),
            icon: icon.to_string(),
            status: match i.cmp(&current) {
                std::cmp::Ordering::Less => StepStatus::Complete,
                std::cmp::Ordering::Equal => StepStatus::Current,
                std::cmp::Ordering::Greater => StepStatus::Pending,
            },
        })
        .collect();

    ProgressSummary {
        total_visible_steps: total,
        current_visible_index: current,
        percent,
        steps,
    }
}

/// Map a catalog index onto the visible list: the number of visible steps before it.
pub fn visible_index(steps: &[Step], step_index: usize, create_restore_point: bool) -> usize {
    steps
        .iter()
        .take(step_index)
        .filter(|step| step.is_visible(create_restore_point))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::catalog::step_fn;
    use crate::pipeline::StepOutcome;

    fn steps(names: &[&str]) -> Vec<Step> {
        names
            .iter()
            .map(|name| {
                let step = Step::new(*name, step_fn(|_, _| StepOutcome::succeed(true)));
                if *name == "RestorePoint" {
                    step.optional()
                } else {
                    step
                }
            })
            .collect()
    }

    #[test]
    fn test_progress_fraction() {
        let steps = steps(&["A", "B", "C", "D"]);
        let visible: Vec<&Step> = steps.iter().collect();

        let start = compute_progress(&visible, 0);
        assert_eq!(start.total_visible_steps, 4);
        assert_eq!(start.percent, 0.0);
        assert_eq!(start.current_step(), Some("A"));

        let half = compute_progress(&visible, 2);
        assert_eq!(half.percent, 0.5);
        assert_eq!(half.steps[1].status, StepStatus::Complete);
        assert_eq!(half.steps[2].status, StepStatus::Current);
        assert_eq!(half.steps[3].status, StepStatus::Pending);

        let done = compute_progress(&visible, 4);
        assert_eq!(done.percent, 1.0);
        assert!(done.is_complete());
        assert_eq!(done.current_step(), None);

        // Clamped past the end
        let past = compute_progress(&visible, 9);
        assert_eq!(past.current_visible_index, 4);
        assert_eq!(past.percent, 1.0);
    }

    #[test]
    fn test_progress_empty_list() {
        let summary = compute_progress(&[], 0);
        assert_eq!(summary.percent, 0.0);
        assert!(summary.is_complete());
    }

    #[test]
    fn test_visible_index_skips_hidden_step() {
        let steps = steps(&["Fetch", "Validate", "RestorePoint", "Files", "Media"]);

        assert_eq!(visible_index(&steps, 2, false), 2);
        assert_eq!(visible_index(&steps, 3, false), 2);
        assert_eq!(visible_index(&steps, 4, false), 3);
        assert_eq!(visible_index(&steps, 5, false), 4);
        assert_eq!(visible_index(&steps, 4, true), 4);
    }

    #[test]
    fn test_progress_is_deterministic() {
        let steps = steps(&["A", "B", "C"]);
        let visible: Vec<&Step> = steps.iter().collect();
        assert_eq!(compute_progress(&visible, 1), compute_progress(&visible, 1));
    }

    #[test]
    fn test_standard_progress_without_restore_point() {
        // Fetch and Validate done, resting past the hidden RestorePoint
        let summary = standard_progress(OperationMode::Import, 3, false);

        assert_eq!(summary.total_visible_steps, 8);
        assert_eq!(summary.current_visible_index, 2);
        assert_eq!(summary.percent, 0.25);
        assert_eq!(summary.current_step(), Some("Files"));
        assert!(summary.steps.iter().all(|s| s.name != "RestorePoint"));
    }

    #[test]
    fn test_standard_progress_with_restore_point() {
        let summary = standard_progress(OperationMode::Import, 2, true);

        assert_eq!(summary.total_visible_steps, 9);
        assert_eq!(summary.current_step(), Some("RestorePoint"));
        assert_eq!(summary.steps[2].icon, "icon-pushpin");
    }

    #[test]
    fn test_standard_progress_finished_export() {
        let summary = standard_progress(OperationMode::Export, 7, false);

        assert!(summary.is_complete());
        assert_eq!(summary.percent, 1.0);
        assert_eq!(summary.steps.last().map(|s| s.name.as_str()), Some("Zip"));
    }
}
