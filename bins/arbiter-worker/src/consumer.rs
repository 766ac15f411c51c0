//! Queue consumer loop for one worker slot. Ack only after a verdict is
//! persisted; poison jobs (unparseable payloads, missing documents) are
//! discarded so they cannot wedge the queue.

use arbiter_common::queue::JobQueue;
use tracing::{error, info};

use crate::orchestrator::JudgeOrchestrator;

/// Blocking-fetch timeout. Short enough that shutdown is never far away.
const FETCH_TIMEOUT_SECONDS: f64 = 5.0;

pub async fn consume(mut queue: JobQueue, orchestrator: JudgeOrchestrator, slot: usize) {
    // Requeue jobs a previous process left in flight. All slots recover at
    // boot, before any fetch, so a live delivery is never touched.
    match queue.recover().await {
        Ok(0) => {}
        Ok(moved) => info!(slot, moved, "Requeued in-flight jobs from a previous run"),
        Err(e) => error!(slot, error = %e, "Failed to requeue in-flight jobs"),
    }

    loop {
        match queue.fetch(FETCH_TIMEOUT_SECONDS).await {
            Ok(Some(delivery)) => {
                let job = match delivery.job() {
                    Ok(job) => job,
                    Err(e) => {
                        error!(slot, error = %e, "Discarding malformed job payload");
                        if let Err(e) = queue.reject(delivery).await {
                            error!(slot, error = %e, "Failed to discard job");
                        }
                        continue;
                    }
                };

                info!(slot, submission_id = %job.submission_id, "Received job");

                match orchestrator.judge(&job.submission_id).await {
                    Ok(summary) => {
                        info!(
                            slot,
                            submission_id = %job.submission_id,
                            verdict = %summary.verdict,
                            passed = summary.passed_test_cases,
                            total = summary.total_test_cases,
                            "Job complete"
                        );
                        if let Err(e) = queue.ack(delivery).await {
                            // The verdict is already persisted; a redelivery
                            // would re-judge idempotently.
                            error!(slot, error = %e, "Failed to ack job");
                        }
                    }
                    Err(e) => {
                        error!(
                            slot,
                            submission_id = %job.submission_id,
                            error = %e,
                            "Judging failed, discarding job"
                        );
                        if let Err(e) = queue.reject(delivery).await {
                            error!(slot, error = %e, "Failed to discard job");
                        }
                    }
                }
            }
            Ok(None) => {
                // Fetch timeout, loop around.
                continue;
            }
            Err(e) => {
                error!(slot, error = %e, "Queue error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
