//! Test Harness - drives the Language Runner across the ordered test cases
//! of one problem and produces a single deterministic verdict.
//!
//! Each judging job gets its own scratch subdirectory, which also removes
//! the javac fixed-filename constraint: two concurrent Java jobs never share
//! a `Main.java`. Case iteration is an explicit fold threading an
//! accumulator and a tagged continue/stop value, so the short-circuit paths
//! (limit breach, runner failure) are visible in the control flow instead of
//! hiding in mutable closure state.

use std::path::{Path, PathBuf};

use arbiter_common::types::{Language, TestCase, TestCaseResult, TestCaseStatus, Verdict};
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::runner::{self, Artifact, RunFailure, RunOutput};

/// Timeout used by the synchronous run path, where no problem limit applies.
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 5000;

/// Per-case ceilings, already converted to the runner's units.
#[derive(Debug, Clone, Copy)]
pub struct CaseLimits {
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

impl CaseLimits {
    pub fn new(time_limit_secs: u64, memory_limit_mb: u64) -> Self {
        Self {
            time_limit_ms: time_limit_secs * 1000,
            memory_limit_kb: memory_limit_mb * 1024,
        }
    }
}

/// Aggregated judging result for one submission.
#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    pub verdict: Verdict,
    /// Summed wall time over completed runs, in milliseconds.
    pub execution_time_ms: f64,
    /// Summed peak RSS over completed runs, in kilobytes.
    pub memory_used_kb: u64,
    pub passed: u32,
    /// Full intended case count, even when judging short-circuited.
    pub total: u32,
    /// Concatenated actual outputs; populated only when every case ran.
    pub output: String,
    /// Populated only on short-circuit paths.
    pub error: String,
    /// Ordered strict prefix of the attempted cases.
    pub results: Vec<TestCaseResult>,
}

/// Executes one prepared submission against one stdin. The seam that lets
/// the case loop be tested without a toolchain.
#[async_trait]
pub trait CaseRunner: Send {
    async fn execute(&mut self, input: &str, timeout_ms: u64) -> Result<RunOutput, RunFailure>;
}

/// Production case runner: a prepared artifact in its job directory.
pub struct ProcessRunner {
    artifact: Artifact,
    work_dir: PathBuf,
}

#[async_trait]
impl CaseRunner for ProcessRunner {
    async fn execute(&mut self, input: &str, timeout_ms: u64) -> Result<RunOutput, RunFailure> {
        runner::execute(&self.artifact, &self.work_dir, input, timeout_ms).await
    }
}

/// The orchestrator's view of judging. Object-safe so tests can stub it.
#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn run(
        &self,
        code: &str,
        language: Language,
        cases: &[TestCase],
        limits: CaseLimits,
    ) -> JudgeOutcome;
}

/// Real harness over a scratch directory shared by all jobs of a worker.
pub struct ScratchHarness {
    root: PathBuf,
}

impl ScratchHarness {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TestHarness for ScratchHarness {
    async fn run(
        &self,
        code: &str,
        language: Language,
        cases: &[TestCase],
        limits: CaseLimits,
    ) -> JudgeOutcome {
        let total = cases.len() as u32;
        let job_dir = self.root.join(Uuid::new_v4().to_string());

        let outcome = match stage(&job_dir, language, code).await {
            Ok(mut case_runner) => judge_cases(&mut case_runner, cases, limits).await,
            Err(failure) => staging_failure_outcome(failure, total),
        };

        cleanup_job_dir(&job_dir).await;
        outcome
    }
}

/// Materialize the source into a fresh job directory and prepare the
/// executor (one-time compile where applicable).
async fn stage(
    job_dir: &Path,
    language: Language,
    code: &str,
) -> Result<ProcessRunner, RunFailure> {
    tokio::fs::create_dir_all(job_dir)
        .await
        .map_err(|e| RunFailure::Spawn {
            message: format!("failed to create scratch directory: {}", e),
        })?;

    let source = write_source(job_dir, language, code).await?;
    let artifact = runner::prepare(language, &source, job_dir).await?;
    debug!(dir = %job_dir.display(), %language, "Submission staged");

    Ok(ProcessRunner {
        artifact,
        work_dir: job_dir.to_path_buf(),
    })
}

async fn write_source(
    job_dir: &Path,
    language: Language,
    code: &str,
) -> Result<PathBuf, RunFailure> {
    let (filename, contents) = match language.fixed_source_name() {
        // javac mandates the filename match the public class, so the
        // submitted class name is rewritten (the stored code is untouched).
        Some(fixed) => (fixed.to_string(), rewrite_java_entry_class(code)),
        None => (
            format!("solution.{}", language.extension()),
            code.to_string(),
        ),
    };

    let path = job_dir.join(filename);
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| RunFailure::Spawn {
            message: format!("failed to write source file: {}", e),
        })?;
    Ok(path)
}

/// Replace the first `public class <Ident>` with `public class Main`,
/// leaving everything else byte-for-byte intact.
pub fn rewrite_java_entry_class(code: &str) -> String {
    fn is_ident_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '$'
    }

    let mut search = 0;
    while let Some(rel) = code[search..].find("public") {
        let start = search + rel;
        search = start + "public".len();

        if code[..start]
            .chars()
            .next_back()
            .is_some_and(is_ident_char)
        {
            continue;
        }
        let rest = &code[start + "public".len()..];
        let ws1 = rest.len() - rest.trim_start().len();
        if ws1 == 0 || !rest[ws1..].starts_with("class") {
            continue;
        }
        let after_class = &rest[ws1 + "class".len()..];
        let ws2 = after_class.len() - after_class.trim_start().len();
        if ws2 == 0 {
            continue;
        }
        let ident_len: usize = after_class[ws2..]
            .chars()
            .take_while(|&c| is_ident_char(c))
            .map(char::len_utf8)
            .sum();
        if ident_len == 0 {
            continue;
        }

        let ident_start = start + "public".len() + ws1 + "class".len() + ws2;
        return format!(
            "{}Main{}",
            &code[..ident_start],
            &code[ident_start + ident_len..]
        );
    }
    code.to_string()
}

#[derive(Default)]
struct Totals {
    time_ms: f64,
    memory_kb: u64,
    passed: u32,
    results: Vec<TestCaseResult>,
}

/// Tagged control value for the case fold.
enum CaseFlow {
    Continue(Totals),
    Stop(JudgeOutcome),
}

/// Run the ordered cases, short-circuiting on the first limit breach or
/// runner failure.
pub async fn judge_cases<R>(case_runner: &mut R, cases: &[TestCase], limits: CaseLimits) -> JudgeOutcome
where
    R: CaseRunner + ?Sized,
{
    let total = cases.len() as u32;
    let mut totals = Totals::default();

    for (i, case) in cases.iter().enumerate() {
        match run_case(case_runner, case, (i + 1) as u32, limits, totals, total).await {
            CaseFlow::Continue(next) => totals = next,
            CaseFlow::Stop(outcome) => return outcome,
        }
    }

    completed_outcome(totals, total)
}

async fn run_case<R>(
    case_runner: &mut R,
    case: &TestCase,
    index: u32,
    limits: CaseLimits,
    mut totals: Totals,
    total: u32,
) -> CaseFlow
where
    R: CaseRunner + ?Sized,
{
    let expected = case.expected_output.trim().to_string();

    match case_runner.execute(&case.input, limits.time_limit_ms).await {
        Ok(run) => {
            totals.time_ms += run.time_ms;
            totals.memory_kb += run.memory_kb.unwrap_or(0);
            let actual = run.stdout.trim().to_string();

            // Limits are checked before the output, and a halted case is
            // never counted as passed: passed == total holds exactly for
            // Accepted submissions.
            if run.time_ms > limits.time_limit_ms as f64 {
                totals.results.push(case_result(
                    index,
                    case,
                    &expected,
                    &actual,
                    run.time_ms,
                    run.memory_kb,
                    TestCaseStatus::TimeLimitExceeded,
                    String::new(),
                ));
                return CaseFlow::Stop(halted_outcome(
                    totals,
                    total,
                    Verdict::TimeLimitExceeded,
                    format!("Test case {} exceeded time limit", index),
                ));
            }

            if run.memory_kb.unwrap_or(0) > limits.memory_limit_kb {
                totals.results.push(case_result(
                    index,
                    case,
                    &expected,
                    &actual,
                    run.time_ms,
                    run.memory_kb,
                    TestCaseStatus::MemoryLimitExceeded,
                    String::new(),
                ));
                return CaseFlow::Stop(halted_outcome(
                    totals,
                    total,
                    Verdict::MemoryLimitExceeded,
                    format!("Test case {} exceeded memory limit", index),
                ));
            }

            // Exact comparison on trimmed strings - no whitespace-insensitive
            // or numeric-tolerant matching.
            let status = if actual == expected {
                totals.passed += 1;
                TestCaseStatus::Passed
            } else {
                TestCaseStatus::Failed
            };
            totals.results.push(case_result(
                index,
                case,
                &expected,
                &actual,
                run.time_ms,
                run.memory_kb,
                status,
                String::new(),
            ));
            CaseFlow::Continue(totals)
        }
        Err(failure) => {
            // Compile failures surfacing mid-run can only come from variants
            // that recompile per case; the most recent compile outcome wins.
            let (status, verdict) = match &failure {
                RunFailure::Compile { .. } => {
                    (TestCaseStatus::CompilationError, Verdict::CompilationError)
                }
                RunFailure::Timeout { .. } => {
                    (TestCaseStatus::TimeLimitExceeded, Verdict::TimeLimitExceeded)
                }
                RunFailure::Runtime { .. } => (TestCaseStatus::RuntimeError, Verdict::RuntimeError),
                RunFailure::Spawn { .. } => (TestCaseStatus::Error, Verdict::RuntimeError),
            };
            let error = failure.stderr();
            totals.results.push(case_result(
                index,
                case,
                &expected,
                "",
                failure.time_ms().unwrap_or(0.0),
                failure.memory_kb(),
                status,
                error.clone(),
            ));
            CaseFlow::Stop(halted_outcome(totals, total, verdict, error))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn case_result(
    index: u32,
    case: &TestCase,
    expected: &str,
    actual: &str,
    execution_time_ms: f64,
    memory_kb: Option<u64>,
    status: TestCaseStatus,
    error: String,
) -> TestCaseResult {
    TestCaseResult {
        index,
        input: case.input.clone(),
        expected_output: expected.to_string(),
        actual_output: actual.to_string(),
        execution_time_ms,
        memory_kb,
        status,
        error,
    }
}

fn completed_outcome(totals: Totals, total: u32) -> JudgeOutcome {
    let verdict = if totals.passed == total {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    };
    let output = totals
        .results
        .iter()
        .map(|r| r.actual_output.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    JudgeOutcome {
        verdict,
        execution_time_ms: totals.time_ms,
        memory_used_kb: totals.memory_kb,
        passed: totals.passed,
        total,
        output,
        error: String::new(),
        results: totals.results,
    }
}

fn halted_outcome(totals: Totals, total: u32, verdict: Verdict, error: String) -> JudgeOutcome {
    JudgeOutcome {
        verdict,
        execution_time_ms: totals.time_ms,
        memory_used_kb: totals.memory_kb,
        passed: totals.passed,
        total,
        output: String::new(),
        error,
        results: totals.results,
    }
}

/// Staging failed before any case ran: a compile error is a terminal
/// verdict of its own, everything else is a runtime error.
fn staging_failure_outcome(failure: RunFailure, total: u32) -> JudgeOutcome {
    let verdict = match &failure {
        RunFailure::Compile { .. } => Verdict::CompilationError,
        _ => Verdict::RuntimeError,
    };
    JudgeOutcome {
        verdict,
        execution_time_ms: 0.0,
        memory_used_kb: 0,
        passed: 0,
        total,
        output: String::new(),
        error: failure.stderr(),
        results: Vec::new(),
    }
}

/// Single execution against custom input: no case loop, no verdict, no
/// persistence. Used by the interactive run endpoint.
pub async fn run_once(
    root: &Path,
    language: Language,
    code: &str,
    input: &str,
    timeout_ms: u64,
) -> Result<RunOutput, RunFailure> {
    let job_dir = root.join(Uuid::new_v4().to_string());
    let result = match stage(&job_dir, language, code).await {
        Ok(mut case_runner) => case_runner.execute(input, timeout_ms).await,
        Err(failure) => Err(failure),
    };
    cleanup_job_dir(&job_dir).await;
    result
}

/// Best-effort removal of the per-job directory (source, artifacts, mem
/// files). Never escalates past a warning and never masks the verdict.
async fn cleanup_job_dir(job_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(job_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %job_dir.display(), error = %e, "Scratch cleanup failed");
        }
    }
}
