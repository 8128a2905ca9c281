use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use crate::config::ExecutionOptions;
use crate::error::JudgeError;
use crate::screener;
use crate::supervisor::{self, ExecutionOutcome};
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;

/// One candidate solution: source text plus run-time options.
///
/// Owned by the caller for its lifetime; the judge never persists it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub source_code: String,
    pub stdin: Option<String>,
    pub options: ExecutionOptions,
}

impl Submission {
    pub fn new(source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            stdin: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Screening plus compile-only report for interactive feedback.
#[derive(Debug, Clone, Serialize)]
pub struct SyntaxReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Orchestrates one submission through screening, build, and execution.
///
/// Stages run strictly in order: screen, acquire workspace, compile, link,
/// execute, clean up. Any failure short-circuits the rest but always
/// reaches cleanup; the workspace is owned for the whole invocation and
/// removed on every path. Screening rejections are raised before a
/// workspace ever exists.
pub struct Judge<T: Toolchain> {
    toolchain: T,
    workspace_root: PathBuf,
}

impl<T: Toolchain> Judge<T> {
    pub fn new(toolchain: T, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            workspace_root: workspace_root.into(),
        }
    }

    /// Builds and runs one submission against one input.
    ///
    /// Build failures are not errors: they come back as a `success: false`
    /// outcome carrying the tool diagnostics, so a suite can keep going.
    /// Only screening rejections and faults of the judge itself are raised.
    pub async fn compile_and_run(
        &self,
        submission: &Submission,
    ) -> Result<ExecutionOutcome, JudgeError> {
        screener::screen(&submission.source_code, submission.options.allow_restricted)?;

        let workspace = Workspace::create(&self.workspace_root)?;
        log::debug!("Judging submission in workspace {}", workspace.id());

        // Elapsed time covers compile start through execution end.
        let started = Instant::now();
        let outcome = self
            .build_and_execute(&workspace, submission, started)
            .await;

        // `workspace` drops here, removing the directory regardless of the
        // outcome above.
        outcome
    }

    async fn build_and_execute(
        &self,
        workspace: &Workspace,
        submission: &Submission,
        started: Instant,
    ) -> Result<ExecutionOutcome, JudgeError> {
        let source = workspace.write_source(&submission.source_code)?;
        let object = workspace.object_path();
        let executable = workspace.executable_path();

        if let Err(e) = self
            .toolchain
            .compile(&source, &object, workspace.dir())
            .await
        {
            return Ok(ExecutionOutcome::failure(
                e.failure_kind(),
                e.to_string(),
                started.elapsed().as_millis() as u64,
            ));
        }

        if let Err(e) = self
            .toolchain
            .link(&object, &executable, workspace.dir())
            .await
        {
            return Ok(ExecutionOutcome::failure(
                e.failure_kind(),
                e.to_string(),
                started.elapsed().as_millis() as u64,
            ));
        }

        if !executable.exists() {
            return Err(JudgeError::Internal(
                "toolchain reported a successful link but produced no executable".to_string(),
            ));
        }

        let mut outcome = supervisor::run(
            &executable,
            submission.stdin.as_deref(),
            workspace.dir(),
            submission.options.timeout_ms,
            submission.options.memory_limit_bytes,
        )
        .await;

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    /// Screens and assembles the submission without linking or running it.
    ///
    /// Screening rejections are folded into the report rather than raised:
    /// the caller asked for a validation verdict, not a run. Setting
    /// `allow_restricted` widens screening exactly as it does for a run.
    pub async fn validate_syntax(
        &self,
        source_code: &str,
        allow_restricted: bool,
    ) -> Result<SyntaxReport, JudgeError> {
        if source_code.trim().is_empty() {
            return Ok(SyntaxReport {
                valid: false,
                errors: vec!["source is empty".to_string()],
                warnings: Vec::new(),
            });
        }

        if let Err(e) = screener::screen(source_code, allow_restricted) {
            if e.is_security_violation() {
                return Ok(SyntaxReport {
                    valid: false,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                });
            }
            return Err(e);
        }

        let workspace = Workspace::create(&self.workspace_root)?;
        let source = workspace.write_source(source_code)?;
        let object = workspace.object_path();

        let report = match self
            .toolchain
            .compile(&source, &object, workspace.dir())
            .await
        {
            Ok(()) => SyntaxReport {
                valid: true,
                errors: Vec::new(),
                warnings: Vec::new(),
            },
            Err(e) => classify_diagnostics(&e.to_string()),
        };

        Ok(report)
    }
}

/// Splits tool diagnostics into error and warning lines.
fn classify_diagnostics(diagnostics: &str) -> SyntaxReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for line in diagnostics.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_lowercase();
        if lowered.contains("warning") {
            warnings.push(trimmed.to_string());
        } else if lowered.contains("error") {
            errors.push(trimmed.to_string());
        }
    }

    if errors.is_empty() {
        // The compile failed but nothing self-identified as an error line;
        // keep the whole text so the caller still sees why.
        errors.push(diagnostics.trim().to_string());
    }

    SyntaxReport {
        valid: false,
        errors,
        warnings,
    }
}
