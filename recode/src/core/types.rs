//! Shared result types of an attempt.

use serde::{Deserialize, Serialize};

use crate::core::snapshot::PlanSnapshot;

/// Why an attempt stopped. Node ids are snapshot uids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// No pending node is left.
    Completed,
    /// A fragment failed with a genuine error.
    RuntimeError { node_id: String },
    /// A stub sat at or beyond the depth limit.
    DepthLimit { node_id: String, depth: usize },
    /// Expansion retries were exhausted.
    ExpansionFailed { node_id: String },
    /// The environment reported the episode as finished.
    EnvironmentDone,
    /// The turn ceiling was reached.
    MaxTurns,
    /// Expanding a stub failed outright, for example the model gave no reply.
    ModelFailed { node_id: String, message: String },
    /// The evaluator task or the environment worker failed.
    Aborted { message: String },
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::RuntimeError { .. } => "runtime_error",
            StopReason::DepthLimit { .. } => "depth_limit",
            StopReason::ExpansionFailed { .. } => "expansion_failed",
            StopReason::EnvironmentDone => "environment_done",
            StopReason::MaxTurns => "max_turns",
            StopReason::ModelFailed { .. } => "model_failed",
            StopReason::Aborted { .. } => "aborted",
        }
    }
}

/// Final summary of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptReport {
    /// Model spend in USD.
    pub cost: f64,
    pub tree: PlanSnapshot,
    pub max_depth: usize,
    pub stop: StopReason,
    pub env_success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_is_tagged() {
        let json = serde_json::to_value(StopReason::DepthLimit {
            node_id: "n1".to_string(),
            depth: 10,
        })
        .expect("serialize");
        assert_eq!(json["kind"], "depth_limit");
        assert_eq!(json["depth"], 10);
        assert_eq!(StopReason::MaxTurns.label(), "max_turns");

        let json = serde_json::to_value(StopReason::ModelFailed {
            node_id: "n2".to_string(),
            message: "generate expansion: model returned no reply".to_string(),
        })
        .expect("serialize");
        assert_eq!(json["kind"], "model_failed");
        assert_eq!(json["node_id"], "n2");
    }
}
