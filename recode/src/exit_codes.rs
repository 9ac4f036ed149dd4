//! Stable exit codes for recode CLI commands.

use crate::core::types::StopReason;

/// Command succeeded; for `recode run`, the environment reported success.
pub const OK: i32 = 0;
/// Invalid config, task, snapshot or code, or any other error.
pub const INVALID: i32 = 1;
/// The attempt ended normally without solving the task.
pub const UNSOLVED: i32 = 2;
/// A fragment failed with a genuine runtime error.
pub const RUNTIME_ERROR: i32 = 3;
/// A stub sat at the depth limit.
pub const DEPTH_LIMIT: i32 = 4;
/// The model never produced an acceptable expansion.
pub const EXPANSION_FAILED: i32 = 5;
/// The turn ceiling was reached.
pub const MAX_TURNS: i32 = 6;
/// The model call behind an expansion failed.
pub const MODEL_FAILED: i32 = 7;
/// The evaluator task or the environment worker failed.
pub const ABORTED: i32 = 8;

/// Exit code for a finished `recode run`.
pub fn for_attempt(stop: &StopReason, env_success: bool) -> i32 {
    if env_success {
        return OK;
    }
    match stop {
        StopReason::Completed | StopReason::EnvironmentDone => UNSOLVED,
        StopReason::RuntimeError { .. } => RUNTIME_ERROR,
        StopReason::DepthLimit { .. } => DEPTH_LIMIT,
        StopReason::ExpansionFailed { .. } => EXPANSION_FAILED,
        StopReason::MaxTurns => MAX_TURNS,
        StopReason::ModelFailed { .. } => MODEL_FAILED,
        StopReason::Aborted { .. } => ABORTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_wins_over_stop_reason() {
        assert_eq!(for_attempt(&StopReason::MaxTurns, true), OK);
        assert_eq!(for_attempt(&StopReason::Completed, false), UNSOLVED);
        assert_eq!(
            for_attempt(
                &StopReason::ExpansionFailed {
                    node_id: "n".to_string()
                },
                false
            ),
            EXPANSION_FAILED
        );
        assert_eq!(
            for_attempt(
                &StopReason::ModelFailed {
                    node_id: "n".to_string(),
                    message: "model returned no reply".to_string()
                },
                false
            ),
            MODEL_FAILED
        );
    }
}
