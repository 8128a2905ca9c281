use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::supervisor::FailureKind;

// Timeout for a single assembler or linker invocation, independent of the
// submission's own execution timeout.
const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

const ASSEMBLER_CANDIDATES: &[&str] = &[
    "/usr/bin/nasm",
    "/usr/local/bin/nasm",
    "/opt/homebrew/bin/nasm",
];
const LINKER_CANDIDATES: &[&str] = &["/usr/bin/ld", "/usr/local/bin/ld"];

/// Build-stage failure, carried as structured text rather than thrown past
/// the judge so it can be attached to a `success: false` outcome.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("assembler failed:\n{0}")]
    Compile(String),

    #[error("linker failed:\n{0}")]
    Link(String),

    #[error("{phase} timed out after {}s", TOOL_TIMEOUT.as_secs())]
    Timeout { phase: &'static str },

    #[error("failed to launch {phase}: {source}")]
    Spawn {
        phase: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ToolchainError {
    /// How this build failure classifies on an outcome.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ToolchainError::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Build,
        }
    }
}

/// The external compiler/linker pair as an opaque capability.
///
/// The judge is generic over this trait so tests can substitute an
/// in-memory implementation and run without any external binary installed.
#[allow(async_fn_in_trait)]
pub trait Toolchain: Send + Sync {
    /// Compiles `source` into `object`, running inside `work_dir`.
    async fn compile(
        &self,
        source: &Path,
        object: &Path,
        work_dir: &Path,
    ) -> Result<(), ToolchainError>;

    /// Links `object` into the `executable`, running inside `work_dir`.
    async fn link(
        &self,
        object: &Path,
        executable: &Path,
        work_dir: &Path,
    ) -> Result<(), ToolchainError>;
}

impl<T: Toolchain> Toolchain for &T {
    async fn compile(
        &self,
        source: &Path,
        object: &Path,
        work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        (**self).compile(source, object, work_dir).await
    }

    async fn link(
        &self,
        object: &Path,
        executable: &Path,
        work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        (**self).link(object, executable, work_dir).await
    }
}

/// The real toolchain: `nasm` for assembly, `ld` for linking.
#[derive(Debug, Clone)]
pub struct NasmToolchain {
    assembler: PathBuf,
    linker: PathBuf,
}

static RESOLVED_TOOLCHAIN: OnceCell<NasmToolchain> = OnceCell::new();

impl NasmToolchain {
    /// Resolves the assembler and linker binaries, memoized process-wide.
    ///
    /// Explicit paths in the config win; otherwise a list of well-known
    /// install locations is probed, then the system PATH. Failure here is a
    /// deployment problem and is surfaced as a distinct configuration
    /// error, never as a compile failure.
    pub fn resolve(config: &JudgeConfig) -> Result<Self, JudgeError> {
        let toolchain = RESOLVED_TOOLCHAIN.get_or_try_init(|| {
            let assembler = resolve_binary("nasm", config.assembler.as_deref(), ASSEMBLER_CANDIDATES)?;
            let linker = resolve_binary("ld", config.linker.as_deref(), LINKER_CANDIDATES)?;
            log::info!(
                "Toolchain resolved: assembler={}, linker={}",
                assembler.display(),
                linker.display()
            );
            Ok::<_, JudgeError>(Self { assembler, linker })
        })?;
        Ok(toolchain.clone())
    }

    async fn run_tool(
        &self,
        phase: &'static str,
        program: &Path,
        args: &[&str],
        work_dir: &Path,
    ) -> Result<std::process::Output, ToolchainError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ToolchainError::Spawn {
            phase,
            source,
        })?;

        match timeout(TOOL_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(ToolchainError::Spawn { phase, source }),
            Err(_) => Err(ToolchainError::Timeout { phase }),
        }
    }
}

impl Toolchain for NasmToolchain {
    async fn compile(
        &self,
        source: &Path,
        object: &Path,
        work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        let output = self
            .run_tool(
                "assembler",
                &self.assembler,
                &[
                    "-f",
                    "elf64",
                    &source.to_string_lossy(),
                    "-o",
                    &object.to_string_lossy(),
                ],
                work_dir,
            )
            .await?;

        if output.status.success() && object.exists() {
            Ok(())
        } else {
            Err(ToolchainError::Compile(diagnostics(&output)))
        }
    }

    async fn link(
        &self,
        object: &Path,
        executable: &Path,
        work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        let output = self
            .run_tool(
                "linker",
                &self.linker,
                &[
                    &object.to_string_lossy(),
                    "-o",
                    &executable.to_string_lossy(),
                ],
                work_dir,
            )
            .await?;

        if output.status.success() && executable.exists() {
            Ok(())
        } else {
            Err(ToolchainError::Link(diagnostics(&output)))
        }
    }
}

/// Merges a tool's stdout and stderr into one diagnostic string.
fn diagnostics(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stdout);
    }
    if text.trim().is_empty() {
        text = format!("tool exited with status {:?}", output.status.code());
    }
    text
}

fn resolve_binary(
    name: &str,
    explicit: Option<&Path>,
    candidates: &[&str],
) -> Result<PathBuf, JudgeError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(JudgeError::ToolchainConfiguration(format!(
            "configured {name} at {} does not exist",
            path.display()
        )));
    }

    for candidate in candidates {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    // Fall back to a PATH lookup.
    let which = std::process::Command::new("which")
        .arg(name)
        .output()
        .map(|output| {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!path.is_empty()).then(|| PathBuf::from(path))
            } else {
                None
            }
        })
        .unwrap_or(None);

    which.ok_or_else(|| {
        JudgeError::ToolchainConfiguration(format!("cannot locate `{name}` on this host"))
    })
}
