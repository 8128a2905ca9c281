use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

/// Cap on captured stdout/stderr; exceeding it is a supervisor failure.
pub const MAX_CAPTURED_OUTPUT: usize = 1024 * 1024;

/// Why a run never produced a judged result.
///
/// A crashing program is not listed here: it compiled, started, and was
/// judged; its outcome simply reports the abnormal exit. These kinds cover
/// failures of the pipeline around the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Assembler or linker failure, including tool spawn errors.
    Build,
    /// Wall clock deadline expired, during build or execution.
    Timeout,
    /// Supervisor-level fault: spawn failure, wait failure, output overflow.
    Execution,
    /// The submission never reached a build; screening or the judge itself
    /// rejected it.
    Rejected,
}

/// Result of one build+run attempt. Immutable once returned.
///
/// `success` reflects whether the supervisor itself completed the run: a
/// nonzero exit code from the child is reported through `exit_code` but is
/// not a failure — judging the output is the caller's job. Only spawn
/// failures, timeouts, and output overflow make `success` false.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub exit_code: Option<i32>,
    /// Set when the pipeline, not the program's own logic, failed.
    pub failure: Option<FailureKind>,
}

impl ExecutionOutcome {
    pub fn failure(kind: FailureKind, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            error: Some(error.into()),
            elapsed_ms,
            exit_code: None,
            failure: Some(kind),
        }
    }
}

/// Runs the built executable under a wall clock timeout and memory ceiling.
///
/// Standard streams are piped; `stdin` (if any) is written and closed
/// before waiting. If the deadline expires the whole child is forcibly
/// killed, never just abandoned, so no orphan keeps consuming resources.
pub async fn run(
    executable: &Path,
    stdin: Option<&str>,
    work_dir: &Path,
    timeout_ms: u64,
    memory_limit_bytes: u64,
) -> ExecutionOutcome {
    let started = Instant::now();

    let mut cmd = tokio::process::Command::new(executable);
    cmd.current_dir(work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        // Address-space ceiling, and a fresh process group so a timeout
        // can take down the whole tree, not just the direct child.
        unsafe {
            cmd.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                let limit = libc::rlimit {
                    rlim_cur: memory_limit_bytes,
                    rlim_max: memory_limit_bytes,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    let _ = memory_limit_bytes;

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecutionOutcome::failure(
                FailureKind::Execution,
                format!("failed to start program: {e}"),
                elapsed(started),
            );
        }
    };

    // Start draining output before feeding stdin so a chatty child can
    // never deadlock both pipes.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(read_capped(stdout_pipe));
    let stderr_task = tokio::spawn(read_capped(stderr_pipe));

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            // A child that never reads stdin may close its end early;
            // that is not a supervisor failure.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                log::debug!("stdin delivery interrupted: {e}");
            }
            let _ = pipe.shutdown().await;
        }
    } else {
        drop(child.stdin.take());
    }

    let status = match timeout(Duration::from_millis(timeout_ms), child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return ExecutionOutcome::failure(
                FailureKind::Execution,
                format!("failed waiting for program: {e}"),
                elapsed(started),
            );
        }
        Err(_) => {
            kill_process_tree(&mut child);
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            return ExecutionOutcome::failure(
                FailureKind::Timeout,
                format!("execution timed out after {timeout_ms}ms"),
                elapsed(started),
            );
        }
    };

    let (stdout, stdout_overflow) = stdout_task.await.unwrap_or_default();
    let (stderr, stderr_overflow) = stderr_task.await.unwrap_or_default();
    let elapsed_ms = elapsed(started);

    if stdout_overflow || stderr_overflow {
        return ExecutionOutcome::failure(
            FailureKind::Execution,
            format!("program output exceeded the {MAX_CAPTURED_OUTPUT} byte limit"),
            elapsed_ms,
        );
    }

    let exit_code = status.code();
    let error = describe_termination(&status, &stderr, memory_limit_bytes);

    ExecutionOutcome {
        success: exit_code.is_some(),
        stdout,
        error,
        elapsed_ms,
        exit_code,
        failure: None,
    }
}

fn elapsed(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Forcibly terminates the child and everything in its process group.
fn kill_process_tree(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child called setsid, so its pid is the group id.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
}

/// Reads a piped stream to EOF, truncating at `MAX_CAPTURED_OUTPUT`.
async fn read_capped<R>(pipe: Option<R>) -> (String, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return (String::new(), false);
    };

    let mut collected: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    let mut overflow = false;

    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if collected.len() + n > MAX_CAPTURED_OUTPUT {
                    overflow = true;
                    let room = MAX_CAPTURED_OUTPUT - collected.len();
                    collected.extend_from_slice(&buf[..room]);
                    break;
                }
                collected.extend_from_slice(&buf[..n]);
            }
            Err(e) => {
                log::debug!("stream capture interrupted: {e}");
                break;
            }
        }
    }

    (String::from_utf8_lossy(&collected).into_owned(), overflow)
}

/// Explains abnormal termination; a clean exit with empty stderr yields no
/// error text at all.
fn describe_termination(
    status: &std::process::ExitStatus,
    stderr: &str,
    memory_limit_bytes: u64,
) -> Option<String> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let hint = if signal == libc::SIGSEGV || signal == libc::SIGKILL {
                format!(" (possible {memory_limit_bytes} byte memory ceiling hit)")
            } else {
                String::new()
            };
            return Some(format!("program terminated by signal {signal}{hint}"));
        }
    }
    #[cfg(not(unix))]
    let _ = memory_limit_bytes;

    let _ = status;
    if stderr.trim().is_empty() {
        None
    } else {
        Some(stderr.to_string())
    }
}
