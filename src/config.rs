use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "asmjudge", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the submission source file
    pub source: PathBuf,

    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,

    /// Path to a JSON file holding the test suite
    #[arg(long = "tests", short = 't')]
    pub tests_path: Option<PathBuf>,

    /// Standard input fed to the program when no test suite is given
    #[arg(long = "input", short = 'i')]
    pub input: Option<String>,

    /// Only screen and assemble the submission, without linking or running
    #[arg(long = "validate", default_value_t = false)]
    pub validate: bool,

    /// Run only the first few test cases with a short timeout
    #[arg(long = "quick", default_value_t = false)]
    pub quick: bool,

    /// Permit instructions on the restricted denylist
    #[arg(long = "allow-restricted", default_value_t = false)]
    pub allow_restricted: bool,

    /// Per-run wall clock timeout in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

impl CliArgs {
    /// Load the configuration from the specified file, or the defaults
    pub fn to_config(&self) -> anyhow::Result<JudgeConfig> {
        let Some(path) = &self.config_path else {
            return Ok(JudgeConfig::default());
        };
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).context("malformed config file")
    }
}

/// Process-wide judge configuration, constructed once at startup.
#[derive(Deserialize, Debug, Default)]
pub struct JudgeConfig {
    /// Root directory for sandbox workspaces; defaults to the user cache dir
    pub workspace_root: Option<PathBuf>,
    /// Explicit assembler path, skipping probing
    pub assembler: Option<PathBuf>,
    /// Explicit linker path, skipping probing
    pub linker: Option<PathBuf>,
    #[serde(default)]
    pub defaults: ExecutionOptions,
}

impl JudgeConfig {
    /// Resolves the workspace root, creating it if necessary.
    pub fn workspace_root(&self) -> anyhow::Result<PathBuf> {
        let root = match &self.workspace_root {
            Some(root) => root.clone(),
            None => {
                use directories::ProjectDirs;
                let proj_dirs = ProjectDirs::from("", "", "asmjudge")
                    .ok_or_else(|| anyhow!("Unable to find user directory"))?;
                proj_dirs.cache_dir().join("workspaces")
            }
        };
        std::fs::create_dir_all(&root)
            .with_context(|| format!("cannot create workspace root {}", root.display()))?;
        Ok(root)
    }
}

/// Per-submission execution limits.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExecutionOptions {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,
    #[serde(default)]
    pub allow_restricted: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            memory_limit_bytes: default_memory_limit_bytes(),
            allow_restricted: false,
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_memory_limit_bytes() -> u64 {
    64 * 1024 * 1024
}
