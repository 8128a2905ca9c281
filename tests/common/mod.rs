use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use asmjudge::toolchain::{Toolchain, ToolchainError};

/// In-memory toolchain for integration tests.
///
/// "Compiles" by copying the source into the object file and "links" by
/// wrapping the object in a shell script, so submissions in these tests
/// are small shell programs and no assembler needs to be installed.
pub struct ScriptToolchain {
    compile_calls: AtomicUsize,
}

impl ScriptToolchain {
    pub fn new() -> Self {
        Self {
            compile_calls: AtomicUsize::new(0),
        }
    }

    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }
}

impl Toolchain for ScriptToolchain {
    async fn compile(
        &self,
        source: &Path,
        object: &Path,
        _work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);

        let text = std::fs::read_to_string(source).map_err(|source| ToolchainError::Spawn {
            phase: "assembler",
            source,
        })?;
        if text.trim().is_empty() {
            return Err(ToolchainError::Compile(
                "fake.asm:1: error: no instructions found".to_string(),
            ));
        }
        if text.contains("%%bad") {
            return Err(ToolchainError::Compile(
                "fake.asm:1: error: invalid opcode\nfake.asm:2: warning: unused label".to_string(),
            ));
        }
        std::fs::write(object, text).map_err(|source| ToolchainError::Spawn {
            phase: "assembler",
            source,
        })?;
        Ok(())
    }

    async fn link(
        &self,
        object: &Path,
        executable: &Path,
        _work_dir: &Path,
    ) -> Result<(), ToolchainError> {
        let body = std::fs::read_to_string(object).map_err(|source| ToolchainError::Spawn {
            phase: "linker",
            source,
        })?;
        if body.contains("%%nolink") {
            return Err(ToolchainError::Link(
                "undefined reference to `_start'".to_string(),
            ));
        }
        std::fs::write(executable, format!("#!/bin/sh\n{body}\n")).map_err(|source| {
            ToolchainError::Spawn {
                phase: "linker",
                source,
            }
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(executable, std::fs::Permissions::from_mode(0o755)).map_err(
                |source| ToolchainError::Spawn {
                    phase: "linker",
                    source,
                },
            )?;
        }
        Ok(())
    }
}

/// Number of entries currently under a workspace root.
pub fn live_workspaces(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}
