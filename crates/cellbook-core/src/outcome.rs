//! Execution outcome variants applied to cells.

use serde::{Deserialize, Serialize};

/// Outcome of a cell execution, as tracked in the document.
///
/// `Final` and `Failed` are terminal: no further updates are expected
/// for the request that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Request submitted, nothing received yet.
    Pending,
    /// An incremental output chunk from a still-running execution.
    Partial {
        /// Output produced so far in this chunk.
        output: String,
    },
    /// Execution completed on the backend.
    Final {
        /// Combined program output.
        output: String,
        /// Compile or runtime error text, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Wall-clock execution time in milliseconds.
        execution_time: f64,
        /// Process exit code.
        exit_code: i32,
    },
    /// Execution could not complete (cancelled, timed out, or rejected).
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ExecutionOutcome {
    /// Whether this outcome is terminal for its request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Failed { .. })
    }

    /// Shorthand for a `Failed` outcome.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminality() {
        assert!(!ExecutionOutcome::Pending.is_terminal());
        assert!(
            !ExecutionOutcome::Partial {
                output: "hi".to_string()
            }
            .is_terminal()
        );
        assert!(ExecutionOutcome::failed("cancelled").is_terminal());
        assert!(
            ExecutionOutcome::Final {
                output: String::new(),
                error: None,
                execution_time: 12.0,
                exit_code: 0,
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_tagged_serialization() {
        let outcome = ExecutionOutcome::Final {
            output: "ok\n".to_string(),
            error: None,
            execution_time: 3.5,
            exit_code: 0,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"kind\":\"final\""));
        assert!(!json.contains("error"));

        let parsed: ExecutionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
    }
}
