use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Fixed name of the submitted source file inside a workspace.
pub const SOURCE_FILE_NAME: &str = "submission.asm";
const OBJECT_FILE_NAME: &str = "submission.o";
const EXECUTABLE_FILE_NAME: &str = "submission";

// Disambiguates workspaces created within the same millisecond.
static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An isolated, exclusively-owned directory for exactly one build attempt.
///
/// The directory name combines a millisecond timestamp, a process-wide
/// counter, and a random suffix, so two concurrently live workspaces can
/// never collide. The directory is removed when the workspace is dropped,
/// on every exit path; a removal failure is logged rather than raised so it
/// can never mask the build or run result.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
}

impl Workspace {
    /// Creates a fresh workspace directory under `root`.
    pub fn create(root: &Path) -> std::io::Result<Self> {
        let seq = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        let id = format!(
            "{}-{seq}-{suffix}",
            Local::now().format("%y%m%d-%H%M%S%.3f")
        );

        let dir = root.join(&id);
        fs::create_dir_all(&dir)?;
        log::debug!("Workspace {id} created at {}", dir.display());

        Ok(Self { id, dir })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the submitted source into the workspace under a fixed name.
    pub fn write_source(&self, source_code: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.join(SOURCE_FILE_NAME);
        fs::write(&path, format!("{source_code}\n"))?;
        Ok(path)
    }

    pub fn object_path(&self) -> PathBuf {
        self.dir.join(OBJECT_FILE_NAME)
    }

    pub fn executable_path(&self) -> PathBuf {
        self.dir.join(EXECUTABLE_FILE_NAME)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if self.dir.exists() {
                log::warn!("Failed to remove workspace {}: {e}", self.id);
            }
        } else {
            log::debug!("Workspace {} removed", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_ids_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let workspaces: Vec<Workspace> = (0..16)
            .map(|_| Workspace::create(root.path()).unwrap())
            .collect();

        let mut ids: Vec<&str> = workspaces.iter().map(|w| w.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir;
        {
            let ws = Workspace::create(root.path()).unwrap();
            ws.write_source("mov rax, 1").unwrap();
            dir = ws.dir().to_path_buf();
            assert!(dir.join(SOURCE_FILE_NAME).exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_source_written_with_trailing_newline() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let path = ws.write_source("mov rax, 1").unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "mov rax, 1\n");
    }
}
