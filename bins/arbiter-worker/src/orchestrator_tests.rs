/// Pipeline tests for the judge orchestrator against in-memory stores and a
/// stubbed harness. These verify the persistence and user-update semantics:
/// 1. Every result field lands on the submission document
/// 2. Re-judging never double-counts a solved problem
/// 3. Missing documents and empty case lists are fatal
/// 4. Sample cases are judged before hidden cases
/// 5. A missing user document does not lose the verdict

mod judge_pipeline_tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use arbiter_common::store::{ProblemStore, StoreError, SubmissionStore, UserStore};
    use arbiter_common::types::{
        Difficulty, Language, Problem, Submission, TestCase, TestCaseResult, TestCaseStatus, User,
        Verdict,
    };
    use arbiter_engine::harness::{CaseLimits, JudgeOutcome, TestHarness};
    use async_trait::async_trait;

    use crate::orchestrator::{JudgeError, JudgeOrchestrator};

    #[derive(Default)]
    struct MemStore {
        submissions: Mutex<HashMap<String, Submission>>,
        problems: Mutex<HashMap<String, Problem>>,
        users: Mutex<HashMap<String, User>>,
    }

    #[async_trait]
    impl SubmissionStore for MemStore {
        async fn get(&self, id: &str) -> Result<Option<Submission>, StoreError> {
            Ok(self.submissions.lock().unwrap().get(id).cloned())
        }

        async fn save(&self, submission: &Submission) -> Result<(), StoreError> {
            self.submissions
                .lock()
                .unwrap()
                .insert(submission.id.clone(), submission.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl ProblemStore for MemStore {
        async fn get(&self, id: &str) -> Result<Option<Problem>, StoreError> {
            Ok(self.problems.lock().unwrap().get(id).cloned())
        }
    }

    #[async_trait]
    impl UserStore for MemStore {
        async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
            Ok(self.users.lock().unwrap().get(id).cloned())
        }

        async fn save(&self, user: &User) -> Result<(), StoreError> {
            self.users
                .lock()
                .unwrap()
                .insert(user.id.clone(), user.clone());
            Ok(())
        }
    }

    /// Returns a fixed verdict and records the case list it was handed.
    struct StubHarness {
        verdict: Verdict,
        seen_cases: Mutex<Vec<Vec<TestCase>>>,
    }

    impl StubHarness {
        fn new(verdict: Verdict) -> Self {
            Self {
                verdict,
                seen_cases: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TestHarness for StubHarness {
        async fn run(
            &self,
            _code: &str,
            _language: Language,
            cases: &[TestCase],
            _limits: CaseLimits,
        ) -> JudgeOutcome {
            self.seen_cases.lock().unwrap().push(cases.to_vec());
            let total = cases.len() as u32;
            let passed = if self.verdict == Verdict::Accepted {
                total
            } else {
                total.saturating_sub(1)
            };
            JudgeOutcome {
                verdict: self.verdict,
                execution_time_ms: 42.0,
                memory_used_kb: 2048,
                passed,
                total,
                output: String::new(),
                error: String::new(),
                results: vec![TestCaseResult {
                    index: 1,
                    input: "1".to_string(),
                    expected_output: "1".to_string(),
                    actual_output: "1".to_string(),
                    execution_time_ms: 42.0,
                    memory_kb: Some(2048),
                    status: TestCaseStatus::Passed,
                    error: String::new(),
                }],
            }
        }
    }

    fn pending_submission() -> Submission {
        Submission {
            id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            problem_id: "p-1".to_string(),
            code: "print(1)".to_string(),
            language: Language::Python,
            verdict: Verdict::Pending,
            execution_time: None,
            memory_used: None,
            passed_test_cases: 0,
            total_test_cases: 0,
            error: String::new(),
            test_case_results: Vec::new(),
        }
    }

    fn problem() -> Problem {
        Problem {
            id: "p-1".to_string(),
            difficulty: Difficulty::Easy,
            sample_test_cases: vec![TestCase {
                input: "sample".to_string(),
                expected_output: "1".to_string(),
            }],
            hidden_test_cases: vec![TestCase {
                input: "hidden".to_string(),
                expected_output: "2".to_string(),
            }],
            time_limit: 1,
            memory_limit: 256,
        }
    }

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            submissions: Vec::new(),
            solved_problems: Vec::new(),
            solved_by_difficulty: Default::default(),
        }
    }

    fn orchestrator(store: Arc<MemStore>, verdict: Verdict) -> JudgeOrchestrator {
        JudgeOrchestrator::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(StubHarness::new(verdict)),
        )
    }

    fn seeded_store() -> Arc<MemStore> {
        let store = Arc::new(MemStore::default());
        store
            .submissions
            .lock()
            .unwrap()
            .insert("s-1".to_string(), pending_submission());
        store
            .problems
            .lock()
            .unwrap()
            .insert("p-1".to_string(), problem());
        store.users.lock().unwrap().insert("u-1".to_string(), user());
        store
    }

    #[tokio::test]
    async fn judge_persists_every_result_field() {
        let store = seeded_store();
        let summary = orchestrator(store.clone(), Verdict::Accepted)
            .judge("s-1")
            .await
            .unwrap();

        assert_eq!(summary.verdict, Verdict::Accepted);
        assert_eq!(summary.passed_test_cases, 2);
        assert_eq!(summary.total_test_cases, 2);

        let saved = store.submissions.lock().unwrap().get("s-1").cloned().unwrap();
        assert_eq!(saved.verdict, Verdict::Accepted);
        assert_eq!(saved.execution_time, Some(42.0));
        assert_eq!(saved.memory_used, Some(2048));
        assert_eq!(saved.passed_test_cases, 2);
        assert_eq!(saved.total_test_cases, 2);
        assert_eq!(saved.test_case_results.len(), 1);
    }

    #[tokio::test]
    async fn accepted_submission_updates_user_record() {
        let store = seeded_store();
        orchestrator(store.clone(), Verdict::Accepted)
            .judge("s-1")
            .await
            .unwrap();

        let saved = store.users.lock().unwrap().get("u-1").cloned().unwrap();
        assert_eq!(saved.submissions.len(), 1);
        assert_eq!(saved.submissions[0].problem_id, "p-1");
        assert_eq!(saved.submissions[0].status, Verdict::Accepted);
        assert_eq!(saved.solved_problems, vec!["p-1".to_string()]);
        assert_eq!(saved.solved_by_difficulty.easy, 1);
    }

    #[tokio::test]
    async fn rejudging_never_double_counts_a_solve() {
        let store = seeded_store();
        let orchestrator = orchestrator(store.clone(), Verdict::Accepted);
        orchestrator.judge("s-1").await.unwrap();
        orchestrator.judge("s-1").await.unwrap();

        let saved = store.users.lock().unwrap().get("u-1").cloned().unwrap();
        assert_eq!(saved.solved_problems.len(), 1);
        assert_eq!(saved.solved_by_difficulty.easy, 1);
        // History still records both attempts.
        assert_eq!(saved.submissions.len(), 2);
    }

    #[tokio::test]
    async fn non_accepted_verdict_never_touches_solved_counters() {
        let store = seeded_store();
        orchestrator(store.clone(), Verdict::WrongAnswer)
            .judge("s-1")
            .await
            .unwrap();

        let saved = store.users.lock().unwrap().get("u-1").cloned().unwrap();
        assert_eq!(saved.submissions.len(), 1);
        assert_eq!(saved.submissions[0].status, Verdict::WrongAnswer);
        assert!(saved.solved_problems.is_empty());
        assert_eq!(saved.solved_by_difficulty.easy, 0);
    }

    #[tokio::test]
    async fn samples_are_judged_before_hidden_cases() {
        let store = seeded_store();
        let harness = Arc::new(StubHarness::new(Verdict::Accepted));
        let orchestrator = JudgeOrchestrator::new(
            store.clone(),
            store.clone(),
            store,
            harness.clone(),
        );
        orchestrator.judge("s-1").await.unwrap();

        let seen = harness.seen_cases.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].input, "sample");
        assert_eq!(seen[0][1].input, "hidden");
    }

    #[tokio::test]
    async fn missing_submission_is_fatal() {
        let store = Arc::new(MemStore::default());
        let err = orchestrator(store, Verdict::Accepted)
            .judge("nope")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::SubmissionNotFound(_)));
    }

    #[tokio::test]
    async fn missing_problem_is_fatal() {
        let store = seeded_store();
        store.problems.lock().unwrap().clear();
        let err = orchestrator(store, Verdict::Accepted)
            .judge("s-1")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::ProblemNotFound(_)));
    }

    #[tokio::test]
    async fn problem_without_cases_is_fatal() {
        let store = seeded_store();
        {
            let mut problems = store.problems.lock().unwrap();
            let p = problems.get_mut("p-1").unwrap();
            p.sample_test_cases.clear();
            p.hidden_test_cases.clear();
        }
        let err = orchestrator(store, Verdict::Accepted)
            .judge("s-1")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::NoTestCases(_)));
    }

    #[tokio::test]
    async fn missing_user_still_persists_the_verdict() {
        let store = seeded_store();
        store.users.lock().unwrap().clear();
        orchestrator(store.clone(), Verdict::Accepted)
            .judge("s-1")
            .await
            .unwrap();

        let saved = store.submissions.lock().unwrap().get("s-1").cloned().unwrap();
        assert_eq!(saved.verdict, Verdict::Accepted);
    }
}
