use serde::{Deserialize, Serialize};

use crate::config::ExecutionOptions;
use crate::judge::{Judge, Submission};
use crate::supervisor::FailureKind;
use crate::toolchain::Toolchain;

/// Number of cases run in quick validation mode.
pub const QUICK_CASE_LIMIT: usize = 3;
/// Per-case timeout in quick validation mode.
pub const QUICK_TIMEOUT_MS: u64 = 2000;

/// Numeric comparison tolerance for the output ladder.
const NUMERIC_TOLERANCE: f64 = 0.001;

/// One (input, expected output) pair, supplied by the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Outcome of one test case. One per case per suite invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub test_case_id: String,
    pub passed: bool,
    pub actual_output: String,
    pub expected_output: String,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    /// Set when the case never produced a judged run: build failure,
    /// timeout, supervisor fault, or a rejection by the judge itself.
    pub failure: Option<FailureKind>,
}

/// Which slice of the suite to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteMode {
    /// First `QUICK_CASE_LIMIT` cases with a short timeout, for
    /// low-latency interactive feedback.
    Quick,
    /// Every case with the configured timeout.
    Full,
}

/// Runs the suite sequentially, one judge invocation per case.
///
/// Each case gets a fresh build; cases share no state, so a failure in one
/// never aborts the rest. A judge-level error (screening rejection, broken
/// workspace) is folded into a `passed: false` result carrying the message
/// rather than propagated.
pub async fn run_suite<T: Toolchain>(
    judge: &Judge<T>,
    source_code: &str,
    cases: &[TestCase],
    options: &ExecutionOptions,
    mode: SuiteMode,
) -> Vec<TestResult> {
    let (cases, timeout_ms) = match mode {
        SuiteMode::Quick => (
            &cases[..cases.len().min(QUICK_CASE_LIMIT)],
            options.timeout_ms.min(QUICK_TIMEOUT_MS),
        ),
        SuiteMode::Full => (cases, options.timeout_ms),
    };

    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        log::debug!("Running test case {}", case.id);
        let submission = Submission::new(source_code)
            .with_stdin(case.input.clone())
            .with_options(ExecutionOptions {
                timeout_ms,
                ..options.clone()
            });

        let result = match judge.compile_and_run(&submission).await {
            Ok(outcome) if outcome.success => TestResult {
                test_case_id: case.id.clone(),
                passed: outputs_match(&outcome.stdout, &case.expected_output),
                actual_output: outcome.stdout,
                expected_output: case.expected_output.clone(),
                elapsed_ms: outcome.elapsed_ms,
                error: outcome.error,
                failure: outcome.failure,
            },
            Ok(outcome) => TestResult {
                test_case_id: case.id.clone(),
                passed: false,
                actual_output: outcome.stdout,
                expected_output: case.expected_output.clone(),
                elapsed_ms: outcome.elapsed_ms,
                error: outcome.error,
                failure: outcome.failure,
            },
            Err(e) => TestResult {
                test_case_id: case.id.clone(),
                passed: false,
                actual_output: String::new(),
                expected_output: case.expected_output.clone(),
                elapsed_ms: 0,
                error: Some(e.to_string()),
                failure: Some(FailureKind::Rejected),
            },
        };

        results.push(result);
    }

    results
}

/// Layered output comparison; the first matching layer wins.
///
/// Exact equality, then ASCII case-insensitive equality, then numeric
/// equality within `NUMERIC_TOLERANCE` when both sides parse as numbers,
/// then equality after trimming surrounding whitespace.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }
    if actual.eq_ignore_ascii_case(expected) {
        return true;
    }
    if let (Ok(a), Ok(b)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        if (a - b).abs() <= NUMERIC_TOLERANCE {
            return true;
        }
    }
    actual.trim() == expected.trim()
}
