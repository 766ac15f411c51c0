//! Judge Orchestrator - the judging pipeline for one submission id:
//! load the documents, drive the harness, persist the result, update the
//! author's record. Holds no mutable state between jobs, so re-judging the
//! same submission is safe end to end.

use std::sync::Arc;

use arbiter_common::store::{ProblemStore, StoreError, SubmissionStore, UserStore};
use arbiter_common::types::{
    JudgeSummary, Problem, Submission, SubmissionHistoryEntry, User, Verdict,
};
use arbiter_engine::harness::{CaseLimits, TestHarness};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("submission {0} not found")]
    SubmissionNotFound(String),
    #[error("problem {0} not found")]
    ProblemNotFound(String),
    #[error("problem {0} has no test cases")]
    NoTestCases(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct JudgeOrchestrator {
    submissions: Arc<dyn SubmissionStore>,
    problems: Arc<dyn ProblemStore>,
    users: Arc<dyn UserStore>,
    harness: Arc<dyn TestHarness>,
}

impl JudgeOrchestrator {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        problems: Arc<dyn ProblemStore>,
        users: Arc<dyn UserStore>,
        harness: Arc<dyn TestHarness>,
    ) -> Self {
        Self {
            submissions,
            problems,
            users,
            harness,
        }
    }

    /// Judge one submission to completion. Fatal errors (missing documents,
    /// no test cases) bubble up so the consumer can discard the job.
    pub async fn judge(&self, submission_id: &str) -> Result<JudgeSummary, JudgeError> {
        let mut submission = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or_else(|| JudgeError::SubmissionNotFound(submission_id.to_string()))?;

        let problem = self
            .problems
            .get(&submission.problem_id)
            .await?
            .ok_or_else(|| JudgeError::ProblemNotFound(submission.problem_id.clone()))?;

        let cases = problem.all_test_cases();
        if cases.is_empty() {
            return Err(JudgeError::NoTestCases(problem.id.clone()));
        }

        let limits = CaseLimits::new(problem.time_limit, problem.memory_limit);
        info!(
            submission_id = %submission.id,
            problem_id = %problem.id,
            language = %submission.language,
            test_cases = cases.len(),
            "Judging submission"
        );

        let outcome = self
            .harness
            .run(&submission.code, submission.language, &cases, limits)
            .await;

        submission.verdict = outcome.verdict;
        submission.execution_time = Some(outcome.execution_time_ms);
        submission.memory_used = Some(outcome.memory_used_kb);
        submission.passed_test_cases = outcome.passed;
        submission.total_test_cases = outcome.total;
        submission.error = outcome.error;
        submission.test_case_results = outcome.results;
        self.submissions.save(&submission).await?;

        self.record_on_user(&submission, &problem).await?;

        info!(
            submission_id = %submission.id,
            verdict = %submission.verdict,
            passed = submission.passed_test_cases,
            total = submission.total_test_cases,
            "Verdict persisted"
        );

        Ok(JudgeSummary {
            verdict: submission.verdict,
            execution_time: submission.execution_time,
            memory_used: submission.memory_used,
            passed_test_cases: submission.passed_test_cases,
            total_test_cases: submission.total_test_cases,
        })
    }

    /// Append the attempt to the user's history and, on a first accepted
    /// solution of this problem, bump the solved counters. The solved update
    /// is guarded by membership, so re-judging never double-counts.
    async fn record_on_user(
        &self,
        submission: &Submission,
        problem: &Problem,
    ) -> Result<(), JudgeError> {
        let Some(mut user) = self.users.get(&submission.user_id).await? else {
            // The verdict stands on its own; a missing user document is a
            // collaborator-side inconsistency, not a judging failure.
            warn!(
                user_id = %submission.user_id,
                submission_id = %submission.id,
                "User not found, skipping record update"
            );
            return Ok(());
        };

        apply_submission(&mut user, submission, problem);
        self.users.save(&user).await?;
        Ok(())
    }
}

fn apply_submission(user: &mut User, submission: &Submission, problem: &Problem) {
    user.submissions.push(SubmissionHistoryEntry {
        problem_id: submission.problem_id.clone(),
        status: submission.verdict,
        language: submission.language,
        code: submission.code.clone(),
        submitted_at: Utc::now(),
    });

    if submission.verdict == Verdict::Accepted
        && !user.solved_problems.contains(&submission.problem_id)
    {
        user.solved_problems.push(submission.problem_id.clone());
        user.solved_by_difficulty.increment(problem.difficulty);
    }
}
