mod common;

use std::path::Path;

use asmjudge::config::ExecutionOptions;
use asmjudge::error::JudgeError;
use asmjudge::judge::{Judge, Submission};
use asmjudge::supervisor::FailureKind;
use asmjudge::toolchain::{Toolchain, ToolchainError};

use common::{ScriptToolchain, live_workspaces};

fn make_judge(root: &std::path::Path) -> Judge<ScriptToolchain> {
    Judge::new(ScriptToolchain::new(), root)
}

#[tokio::test]
async fn test_denylisted_code_never_creates_a_workspace() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = ScriptToolchain::new();
    let judge = Judge::new(toolchain, root.path());

    let submission = Submission::new("start:\n    hlt\n");
    let err = judge.compile_and_run(&submission).await.unwrap_err();

    assert!(err.is_security_violation());
    assert!(matches!(err, JudgeError::DisallowedInstruction { .. }));
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_no_compile_attempt_after_screening_rejection() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = ScriptToolchain::new();
    let judge = Judge::new(&toolchain, root.path());

    let submission = Submission::new("    int 0x80\n");
    assert!(judge.compile_and_run(&submission).await.is_err());
    assert_eq!(toolchain.compile_calls(), 0);

    // The same judge still works for clean code.
    let ok = judge
        .compile_and_run(&Submission::new("echo hello"))
        .await
        .unwrap();
    assert!(ok.success);
    assert_eq!(ok.stdout.trim(), "hello");
    assert_eq!(toolchain.compile_calls(), 1);
}

#[tokio::test]
async fn test_allow_restricted_lets_denylisted_code_through() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    // A leading `hlt` would normally be screened out; here the shell just
    // fails to find the command and falls through to the echo.
    let submission = Submission::new("hlt || echo fine").with_options(ExecutionOptions {
        allow_restricted: true,
        ..ExecutionOptions::default()
    });
    let outcome = judge.compile_and_run(&submission).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.stdout.trim(), "fine");
}

#[tokio::test]
async fn test_workspace_removed_after_success() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let outcome = judge
        .compile_and_run(&Submission::new("echo done"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_workspace_removed_after_compile_failure() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let outcome = judge
        .compile_and_run(&Submission::new("%%bad\n"))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("assembler failed"));
    assert_eq!(outcome.failure, Some(FailureKind::Build));
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_link_failure_reports_diagnostics_without_running() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let outcome = judge
        .compile_and_run(&Submission::new("echo unreachable # %%nolink"))
        .await
        .unwrap();
    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("linker failed"));
    assert!(error.contains("undefined reference"));
    assert_eq!(outcome.stdout, "");
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_timeout_is_classified_and_cleaned_up() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let submission = Submission::new("sleep 30").with_options(ExecutionOptions {
        timeout_ms: 500,
        ..ExecutionOptions::default()
    });
    let outcome = judge.compile_and_run(&submission).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("timed out"));
    assert_eq!(outcome.failure, Some(FailureKind::Timeout));
    assert!(outcome.elapsed_ms >= 500 && outcome.elapsed_ms < 5000);
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_nonzero_exit_code_is_not_a_failure() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let outcome = judge
        .compile_and_run(&Submission::new("echo partial; exit 2"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.exit_code, Some(2));
    assert_eq!(outcome.stdout.trim(), "partial");
}

#[tokio::test]
async fn test_stdin_reaches_the_program() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let submission = Submission::new("read x; echo \"twice $x$x\"").with_stdin("7\n");
    let outcome = judge.compile_and_run(&submission).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.stdout.trim(), "twice 77");
}

#[tokio::test]
async fn test_concurrent_judges_use_distinct_workspaces() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    // Both runs print their own working directory; if the workspaces were
    // shared the outputs would collide.
    let submission = Submission::new("pwd");
    let (a, b) = tokio::join!(
        judge.compile_and_run(&submission),
        judge.compile_and_run(&submission)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.success && b.success);
    assert_ne!(a.stdout, b.stdout);
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_oversized_submission_rejected_up_front() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = ScriptToolchain::new();
    let judge = Judge::new(toolchain, root.path());

    let big = "echo x\n".repeat(20_000);
    let err = judge.compile_and_run(&Submission::new(big)).await.unwrap_err();
    assert!(matches!(err, JudgeError::CodeTooLarge { .. }));
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_validate_syntax_empty_source_is_invalid() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let report = judge.validate_syntax("", false).await.unwrap();
    assert!(!report.valid);
    assert!(!report.errors.is_empty());
}

#[tokio::test]
async fn test_validate_syntax_classifies_diagnostics() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let report = judge.validate_syntax("%%bad\n", false).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("invalid opcode"));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("unused label"));
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_validate_syntax_reports_screening_violations() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let report = judge.validate_syntax("    hlt\n", false).await.unwrap();
    assert!(!report.valid);
    assert!(report.errors[0].contains("hlt"));
    assert_eq!(live_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_valid_code_passes_validation() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    let report = judge.validate_syntax("echo ok", false).await.unwrap();
    assert!(report.valid);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_validate_syntax_honors_allow_restricted() {
    let root = tempfile::tempdir().unwrap();
    let judge = make_judge(root.path());

    // Identical source: screened out by default, validated clean when the
    // restricted set is allowed.
    assert!(!judge.validate_syntax("    hlt\n", false).await.unwrap().valid);
    let report = judge.validate_syntax("    hlt\n", true).await.unwrap();
    assert!(report.valid);
    assert!(report.errors.is_empty());
    assert_eq!(live_workspaces(root.path()), 0);
}

/// Toolchain that claims a successful link without writing the executable.
struct HollowToolchain;

impl Toolchain for HollowToolchain {
    async fn compile(
        &self,
        source: &Path,
        object: &Path,
        _work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        std::fs::copy(source, object).map_err(|source| ToolchainError::Spawn {
            phase: "assembler",
            source,
        })?;
        Ok(())
    }

    async fn link(
        &self,
        _object: &Path,
        _executable: &Path,
        _work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_missing_executable_after_link_is_an_internal_fault() {
    let root = tempfile::tempdir().unwrap();
    let judge = Judge::new(HollowToolchain, root.path());

    let err = judge
        .compile_and_run(&Submission::new("echo hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, JudgeError::Internal(_)));
    assert!(err.to_string().contains("no executable"));
    assert_eq!(live_workspaces(root.path()), 0);
}
