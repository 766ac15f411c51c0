//! Language Runner - compiles (where applicable) and executes one program
//! against one stdin under a wall-clock timeout and an external
//! resource-measuring wrapper.
//!
//! Execution has exactly three observable outcomes: a clean exit with
//! captured stdout, a forced-kill timeout, and a failure (compile, runtime,
//! or spawn). Peak resident memory comes from GNU time's `%M` written to a
//! per-run file; elapsed wall time is measured independently with a
//! monotonic clock so it survives the failure paths too.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use arbiter_common::types::Language;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;
use uuid::Uuid;

/// External resource-measuring wrapper. `%M` reports peak RSS in kilobytes.
const TIME_BIN: &str = "/usr/bin/time";

/// Output of one clean execution.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub time_ms: f64,
    pub memory_kb: Option<u64>,
}

/// Structured execution failure. The wire tag (`compile`/`timeout`/
/// `runtime`/`spawn`) is what the harness and the run API key off.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("compilation failed: {stderr}")]
    Compile { stderr: String },
    #[error("execution timed out after {time_ms:.0}ms")]
    Timeout { time_ms: f64 },
    #[error("runtime failure (exit {exit:?}): {stderr}")]
    Runtime {
        exit: Option<i32>,
        stderr: String,
        time_ms: f64,
        memory_kb: Option<u64>,
    },
    #[error("failed to spawn process: {message}")]
    Spawn { message: String },
}

impl RunFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            RunFailure::Compile { .. } => "compile",
            RunFailure::Timeout { .. } => "timeout",
            RunFailure::Runtime { .. } => "runtime",
            RunFailure::Spawn { .. } => "spawn",
        }
    }

    /// Captured stderr, or the failure message where none exists.
    pub fn stderr(&self) -> String {
        match self {
            RunFailure::Compile { stderr } => stderr.clone(),
            RunFailure::Runtime { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }

    /// Elapsed wall time where the failure path could still observe it.
    pub fn time_ms(&self) -> Option<f64> {
        match self {
            RunFailure::Timeout { time_ms } | RunFailure::Runtime { time_ms, .. } => Some(*time_ms),
            _ => None,
        }
    }

    pub fn memory_kb(&self) -> Option<u64> {
        match self {
            RunFailure::Runtime { memory_kb, .. } => *memory_kb,
            _ => None,
        }
    }
}

/// A runnable artifact produced by `prepare`.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Native binary from g++.
    Binary(PathBuf),
    /// Class directory plus entry-point class name from javac.
    JavaClasses { class_dir: PathBuf, class_name: String },
    /// Interpreter invoked directly on the source file.
    Interpreted { interpreter: &'static str, source: PathBuf },
}

impl Artifact {
    fn command(&self) -> (String, Vec<String>) {
        match self {
            Artifact::Binary(path) => (path.to_string_lossy().into_owned(), vec![]),
            Artifact::JavaClasses { class_name, .. } => (
                "java".to_string(),
                vec!["-cp".to_string(), ".".to_string(), class_name.clone()],
            ),
            Artifact::Interpreted { interpreter, source } => (
                interpreter.to_string(),
                vec![source.to_string_lossy().into_owned()],
            ),
        }
    }
}

/// One-time preparation for a source file: compile for the compiled
/// variants, passthrough for the interpreted ones.
pub async fn prepare(
    language: Language,
    source: &Path,
    work_dir: &Path,
) -> Result<Artifact, RunFailure> {
    match language {
        Language::Cpp => compile_cpp(source, work_dir).await,
        Language::Java => compile_java(source, work_dir).await,
        Language::Python => Ok(Artifact::Interpreted {
            interpreter: "python3",
            source: source.to_path_buf(),
        }),
        Language::Javascript => Ok(Artifact::Interpreted {
            interpreter: "node",
            source: source.to_path_buf(),
        }),
    }
}

async fn compile_cpp(source: &Path, work_dir: &Path) -> Result<Artifact, RunFailure> {
    let binary = work_dir.join("solution.bin");
    let output = Command::new("g++")
        .arg("-std=c++17")
        .arg(source)
        .arg("-o")
        .arg(&binary)
        .current_dir(work_dir)
        .output()
        .await
        .map_err(|e| RunFailure::Spawn {
            message: format!("g++: {}", e),
        })?;

    if !output.status.success() {
        return Err(RunFailure::Compile {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(Artifact::Binary(binary))
}

async fn compile_java(source: &Path, work_dir: &Path) -> Result<Artifact, RunFailure> {
    let class_name = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Main".to_string());

    let output = Command::new("javac")
        .arg(source)
        .current_dir(work_dir)
        .output()
        .await
        .map_err(|e| RunFailure::Spawn {
            message: format!("javac: {}", e),
        })?;

    if !output.status.success() {
        return Err(RunFailure::Compile {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(Artifact::JavaClasses {
        class_dir: work_dir.to_path_buf(),
        class_name,
    })
}

/// Run the artifact once against `input`, enforcing `timeout_ms` with a
/// watchdog that SIGKILLs a still-running child.
pub async fn execute(
    artifact: &Artifact,
    work_dir: &Path,
    input: &str,
    timeout_ms: u64,
) -> Result<RunOutput, RunFailure> {
    let mem_file = work_dir.join(format!("mem-{}.txt", Uuid::new_v4()));
    let (program, args) = artifact.command();

    let mut cmd = Command::new(TIME_BIN);
    cmd.arg("-f")
        .arg("%M")
        .arg("-o")
        .arg(&mem_file)
        .arg(&program)
        .args(&args)
        .current_dir(work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so the timeout kill reaches the measured
    // grandchild and not just the wrapper.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| RunFailure::Spawn {
        message: e.to_string(),
    })?;

    let started = Instant::now();

    let stdin = child.stdin.take();

    let Some(mut stdout_pipe) = child.stdout.take() else {
        return Err(RunFailure::Spawn {
            message: "stdout pipe missing".to_string(),
        });
    };
    let Some(mut stderr_pipe) = child.stderr.take() else {
        return Err(RunFailure::Spawn {
            message: "stderr pipe missing".to_string(),
        });
    };

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    // The stdin write lives inside the timed future: a child that never
    // reads stdin would otherwise block the write past the limit and the
    // watchdog would never fire.
    let wait_and_drain = async {
        use tokio::io::AsyncReadExt;
        let feed_stdin = async {
            if let Some(mut stdin) = stdin {
                if !input.is_empty() {
                    // A dead child makes this a broken pipe; the exit
                    // status is the authoritative signal, ignore the error.
                    let _ = stdin.write_all(input.as_bytes()).await;
                }
            }
        };
        let (_, status, _, _) = tokio::join!(
            feed_stdin,
            child.wait(),
            stdout_pipe.read_to_end(&mut stdout_buf),
            stderr_pipe.read_to_end(&mut stderr_buf),
        );
        status
    };

    let status = match tokio::time::timeout(Duration::from_millis(timeout_ms), wait_and_drain).await
    {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            remove_mem_file(&mem_file).await;
            return Err(RunFailure::Spawn {
                message: e.to_string(),
            });
        }
        Err(_elapsed) => {
            // Non-catchable kill; the child cannot trap SIGKILL.
            let time_ms = elapsed_ms(started);
            kill_process_tree(&mut child);
            let _ = child.wait().await;
            remove_mem_file(&mem_file).await;
            return Err(RunFailure::Timeout { time_ms });
        }
    };

    let time_ms = elapsed_ms(started);
    let memory_kb = read_mem_file(&mem_file).await;
    let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_buf).trim().to_string();

    if !status.success() {
        return Err(RunFailure::Runtime {
            exit: status.code(),
            stderr,
            time_ms,
            memory_kb,
        });
    }

    Ok(RunOutput {
        stdout,
        stderr,
        time_ms,
        memory_kb,
    })
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// SIGKILL the wrapper's whole process group. Killing the wrapper alone
/// would orphan the measured grandchild and leave it running.
fn kill_process_tree(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Negative pid targets the group created at spawn.
        if unsafe { libc::kill(-(pid as i32), libc::SIGKILL) } != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "Failed to kill timed-out process group"
            );
        }
        return;
    }
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill timed-out child");
    }
}

/// Parse peak RSS out of the wrapper's output file, then drop the file.
/// GNU time may prepend an exit-status line on failed commands, so only the
/// last non-empty line counts. Absent or unparsable files yield `None`.
async fn read_mem_file(mem_file: &Path) -> Option<u64> {
    let content = tokio::fs::read_to_string(mem_file).await.ok();
    remove_mem_file(mem_file).await;
    content?
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.trim().parse().ok())
}

async fn remove_mem_file(mem_file: &Path) {
    if let Err(e) = tokio::fs::remove_file(mem_file).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %mem_file.display(), error = %e, "Failed to remove mem file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kinds_match_wire_tags() {
        assert_eq!(
            RunFailure::Compile {
                stderr: String::new()
            }
            .kind(),
            "compile"
        );
        assert_eq!(RunFailure::Timeout { time_ms: 1000.0 }.kind(), "timeout");
        assert_eq!(
            RunFailure::Runtime {
                exit: Some(1),
                stderr: String::new(),
                time_ms: 1.0,
                memory_kb: None
            }
            .kind(),
            "runtime"
        );
        assert_eq!(
            RunFailure::Spawn {
                message: String::new()
            }
            .kind(),
            "spawn"
        );
    }

    #[test]
    fn timeout_reports_elapsed_time() {
        let failure = RunFailure::Timeout { time_ms: 1234.5 };
        assert_eq!(failure.time_ms(), Some(1234.5));
        assert_eq!(failure.memory_kb(), None);
    }

    #[test]
    fn runtime_stderr_falls_back_to_message() {
        let silent = RunFailure::Runtime {
            exit: Some(139),
            stderr: String::new(),
            time_ms: 5.0,
            memory_kb: Some(1024),
        };
        assert!(silent.stderr().contains("exit"));

        let noisy = RunFailure::Runtime {
            exit: Some(1),
            stderr: "Traceback".to_string(),
            time_ms: 5.0,
            memory_kb: None,
        };
        assert_eq!(noisy.stderr(), "Traceback");
    }

    #[tokio::test]
    async fn watchdog_covers_the_stdin_write_phase() {
        // A program that never reads stdin, fed more input than the pipe
        // buffer holds. The write blocks, and the kill must still fire.
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::Interpreted {
            interpreter: "sleep",
            source: PathBuf::from("30"),
        };
        let input = "x".repeat(1 << 20);

        let started = Instant::now();
        let result = execute(&artifact, dir.path(), &input, 1000).await;

        // Timeout with GNU time installed, spawn failure without; either
        // way the call returns promptly instead of hanging on the write.
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn execute_missing_program_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::Binary(dir.path().join("no-such-binary"));
        let result = execute(&artifact, dir.path(), "", 2000).await;
        // Reported through the wrapper as a non-zero exit, or as a spawn
        // failure on hosts without GNU time installed.
        assert!(result.is_err());
    }

    /// End-to-end with a real interpreter and GNU time.
    #[tokio::test]
    #[ignore] // Requires python3 and /usr/bin/time
    async fn execute_python_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("solution.py");
        tokio::fs::write(&source, "n = int(input())\nprint(n * n)\n")
            .await
            .unwrap();

        let artifact = prepare(Language::Python, &source, dir.path()).await.unwrap();
        let out = execute(&artifact, dir.path(), "5", 5000).await.unwrap();
        assert_eq!(out.stdout.trim(), "25");
        assert!(out.time_ms > 0.0);
        assert!(out.memory_kb.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires python3 and /usr/bin/time
    async fn execute_python_timeout_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("solution.py");
        tokio::fs::write(&source, "import time\ntime.sleep(10)\n")
            .await
            .unwrap();

        let artifact = prepare(Language::Python, &source, dir.path()).await.unwrap();
        let started = Instant::now();
        let result = execute(&artifact, dir.path(), "", 500).await;
        assert!(matches!(result, Err(RunFailure::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore] // Requires g++ and /usr/bin/time
    async fn compile_error_carries_compiler_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("solution.cpp");
        tokio::fs::write(&source, "int main() { return 0 }\n")
            .await
            .unwrap();

        let result = prepare(Language::Cpp, &source, dir.path()).await;
        match result {
            Err(RunFailure::Compile { stderr }) => assert!(stderr.contains("error")),
            other => panic!("expected compile failure, got {:?}", other.map(|_| ())),
        }
    }
}
