use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared domain types - the single source of truth for the shapes the
/// intake, the worker and the stores exchange. Field names follow the
/// collaborator data model (camelCase JSON) so persisted documents stay
/// readable by the web layer.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    Python,
    Javascript,
}

impl Language {
    /// Source file extension used for scratch files.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "py",
            Language::Javascript => "js",
        }
    }

    /// The one toolchain that mandates a fixed source filename: javac
    /// requires the file to be named after its public class.
    pub fn fixed_source_name(&self) -> Option<&'static str> {
        match self {
            Language::Java => Some("Main.java"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Javascript => "javascript",
        };
        write!(f, "{}", name)
    }
}

/// Final classification of a submission. `Pending` is set by intake and is
/// never re-entered once judging completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pending,
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Compilation Error")]
    CompilationError,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Verdict::Pending => "Pending",
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompilationError => "Compilation Error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestCaseStatus {
    Passed,
    Failed,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    Error,
}

/// One (input, expected output) pair a submission is checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Per-case outcome. Immutable once produced; `index` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub index: u32,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub execution_time_ms: f64,
    pub memory_kb: Option<u64>,
    pub status: TestCaseStatus,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub user_id: String,
    pub problem_id: String,
    pub code: String,
    pub language: Language,
    pub verdict: Verdict,
    pub execution_time: Option<f64>,
    pub memory_used: Option<u64>,
    pub passed_test_cases: u32,
    pub total_test_cases: u32,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub test_case_results: Vec<TestCaseResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

fn default_time_limit() -> u64 {
    1
}

fn default_memory_limit() -> u64 {
    256
}

/// Read-only to the judge. Sample cases are evaluated before hidden cases,
/// in one combined ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub sample_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCase>,
    /// Per-case wall-clock limit in seconds.
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    /// Peak resident memory limit in megabytes.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: u64,
}

impl Problem {
    /// Combined ordered case list: samples first, then hidden cases.
    pub fn all_test_cases(&self) -> Vec<TestCase> {
        let mut cases = self.sample_test_cases.clone();
        cases.extend(self.hidden_test_cases.iter().cloned());
        cases
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionHistoryEntry {
    pub problem_id: String,
    pub status: Verdict,
    pub language: Language,
    pub code: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedByDifficulty {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl SolvedByDifficulty {
    pub fn increment(&mut self, difficulty: Difficulty) {
        match difficulty {
            Difficulty::Easy => self.easy += 1,
            Difficulty::Medium => self.medium += 1,
            Difficulty::Hard => self.hard += 1,
        }
    }
}

/// Only the judging-relevant slice of the user document is modeled here;
/// profile fields belong to the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub submissions: Vec<SubmissionHistoryEntry>,
    #[serde(default)]
    pub solved_problems: Vec<String>,
    #[serde(default)]
    pub solved_by_difficulty: SolvedByDifficulty,
}

/// The queue message. Ephemeral; carries nothing but the submission id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionJob {
    pub submission_id: String,
}

/// What the orchestrator hands back to the consumer once a verdict exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeSummary {
    pub verdict: Verdict,
    pub execution_time: Option<f64>,
    pub memory_used: Option<u64>,
    pub passed_test_cases: u32,
    pub total_test_cases: u32,
}
