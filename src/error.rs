use thiserror::Error;

/// Errors raised to the caller of the judge.
///
/// Only precondition failures live here: security screening rejections,
/// toolchain configuration problems, and faults in the judge's own
/// machinery. Failures of the submitted program itself (compile errors,
/// timeouts, runtime crashes) are never raised — they are folded into an
/// `ExecutionOutcome` with `success: false` so that one bad submission can
/// never abort a whole suite.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// Submission exceeds the static size ceiling. No process is spawned.
    #[error("submission is {actual} bytes, exceeding the {limit} byte limit")]
    CodeTooLarge { actual: usize, limit: usize },

    /// Submission matches a denylisted instruction pattern and restricted
    /// instructions were not explicitly allowed. No process is spawned.
    #[error("disallowed instruction `{pattern}`: {message}")]
    DisallowedInstruction {
        pattern: &'static str,
        message: &'static str,
    },

    /// The external assembler or linker could not be located. This is a
    /// deployment problem, distinct from a compilation failure.
    #[error("toolchain configuration error: {0}")]
    ToolchainConfiguration(String),

    /// Creating, writing, or owning the sandbox workspace failed.
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    /// Unexpected fault during orchestration, caught at the judge boundary.
    #[error("internal judge error: {0}")]
    Internal(String),
}

impl JudgeError {
    /// Whether this error is a security screening rejection.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            JudgeError::CodeTooLarge { .. } | JudgeError::DisallowedInstruction { .. }
        )
    }
}
