//! Step-by-step reporting shared by the restore and maintenance engines.
//!
//! Multi-phase operations return an ordered list of [`StepResult`] values so
//! callers can show exactly which phase failed and why, instead of a single
//! opaque error. A skipped step never counts against the overall outcome.

/// Outcome of a single named step within a multi-phase operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// The step completed.
    Success,
    /// The step ran and failed.
    Failure,
    /// The step did not run for this invocation.
    Skipped,
}

/// Record of one step of a multi-phase operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepResult {
    /// Stable step name, for example `stop-stack` or `health-check`.
    pub name: String,
    /// How the step ended.
    pub outcome: StepOutcome,
    /// Optional human-readable context for the outcome.
    pub detail: Option<String>,
    /// Error text when the step failed.
    pub error: Option<String>,
    /// Optional remediation hint for the operator.
    pub hint: Option<String>,
}

impl StepResult {
    /// Records a successful step.
    #[must_use]
    pub fn success(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Success,
            detail: None,
            error: None,
            hint: None,
        }
    }

    /// Records a successful step with context.
    #[must_use]
    pub fn success_with_detail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::success(name)
        }
    }

    /// Records a failed step.
    #[must_use]
    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Failure,
            detail: None,
            error: Some(error.into()),
            hint: None,
        }
    }

    /// Records a failed step with a remediation hint.
    #[must_use]
    pub fn failure_with_hint(
        name: impl Into<String>,
        error: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            hint: Some(hint.into()),
            ..Self::failure(name, error)
        }
    }

    /// Records a step that did not run, with the reason.
    #[must_use]
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Skipped,
            detail: Some(reason.into()),
            error: None,
            hint: None,
        }
    }

    /// Attaches context to an existing result.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns `true` when the step failed.
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failure)
    }
}

/// Returns `true` when no step in the log failed.
///
/// Skipped steps are deliberate non-events and do not affect the verdict.
#[must_use]
pub fn overall_success(steps: &[StepResult]) -> bool {
    steps.iter().all(|step| !step.failed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_steps_do_not_fail_the_run() {
        let steps = vec![
            StepResult::success("update"),
            StepResult::skipped("reboot", "disabled for this run"),
        ];
        assert!(overall_success(&steps));
    }

    #[test]
    fn any_failure_fails_the_run() {
        let steps = vec![
            StepResult::success("update"),
            StepResult::failure("health-check", "connection refused"),
            StepResult::skipped("final-check", "aborted"),
        ];
        assert!(!overall_success(&steps));
    }

    #[test]
    fn failure_hint_is_preserved() {
        let step = StepResult::failure_with_hint("update", "exit status 100", "check apt sources");
        assert_eq!(step.hint.as_deref(), Some("check apt sources"));
        assert!(step.failed());
    }
}
