use crate::types::SubmissionJob;
use redis::{AsyncCommands, Direction};
use thiserror::Error;
use tracing::{debug, warn};

/// Durable job queue over Redis lists - defines only semantics, not worker
/// logic. The producer RPUSHes onto the pending list; a consumer BLMOVEs the
/// message onto a processing list, so a worker crash leaves the message
/// recoverable (at-least-once delivery); `recover` moves such leftovers back
/// to pending at startup. `ack` removes the message for good; `reject` also
/// removes it - poison jobs are discarded, never requeued.

pub const QUEUE_PREFIX: &str = "arbiter:queue";
pub const SUBMISSION_QUEUE: &str = "submissions";

/// Pending-list key for a named queue.
pub fn queue_key(queue: &str) -> String {
    format!("{}:{}", QUEUE_PREFIX, queue)
}

/// Processing-list key for a named queue.
pub fn processing_key(queue: &str) -> String {
    format!("{}:{}:processing", QUEUE_PREFIX, queue)
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed job payload: {0}")]
    MalformedJob(#[from] serde_json::Error),
}

/// An in-flight message. Holds the raw payload so that malformed bodies can
/// still be rejected by exact value.
#[derive(Debug)]
pub struct Delivery {
    payload: String,
}

impl Delivery {
    pub fn job(&self) -> Result<SubmissionJob, QueueError> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Explicitly owned queue handle: connected once at startup and passed to
/// the producer/consumer, closed when dropped.
pub struct JobQueue {
    conn: redis::aio::ConnectionManager,
    queue_key: String,
    processing_key: String,
}

impl JobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self::new(conn, SUBMISSION_QUEUE))
    }

    pub fn new(conn: redis::aio::ConnectionManager, queue: &str) -> Self {
        Self {
            conn,
            queue_key: queue_key(queue),
            processing_key: processing_key(queue),
        }
    }

    /// Publish one job per submission. Fire-and-forget for the producer;
    /// durability comes from Redis persistence of the list.
    pub async fn publish(&mut self, job: &SubmissionJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let _: () = self.conn.rpush(&self.queue_key, &payload).await?;
        debug!(submission_id = %job.submission_id, "Job published");
        Ok(())
    }

    /// Drain messages a previous process left on the processing list back
    /// onto the front of the pending list. Run before the first fetch:
    /// recovery while a live consumer holds a delivery would requeue an
    /// in-flight job. Returns the number of messages moved.
    pub async fn recover(&mut self) -> Result<usize, QueueError> {
        let mut moved = 0;
        loop {
            let payload: Option<String> = self
                .conn
                .lmove(
                    &self.processing_key,
                    &self.queue_key,
                    Direction::Left,
                    Direction::Left,
                )
                .await?;
            match payload {
                Some(payload) => {
                    debug!(payload = %payload, "Requeued in-flight job");
                    moved += 1;
                }
                None => break,
            }
        }
        Ok(moved)
    }

    /// Block up to `timeout_seconds` for the next message, moving it onto the
    /// processing list. Returns `None` on timeout so callers can poll for
    /// shutdown between fetches.
    pub async fn fetch(&mut self, timeout_seconds: f64) -> Result<Option<Delivery>, QueueError> {
        let payload: Option<String> = self
            .conn
            .blmove(
                &self.queue_key,
                &self.processing_key,
                Direction::Left,
                Direction::Right,
                timeout_seconds,
            )
            .await?;
        Ok(payload.map(|payload| Delivery { payload }))
    }

    /// Permanently remove a processed message. Called after the orchestrator
    /// produced a verdict - any verdict, not just Accepted.
    pub async fn ack(&mut self, delivery: Delivery) -> Result<(), QueueError> {
        let _: usize = self
            .conn
            .lrem(&self.processing_key, 1, &delivery.payload)
            .await?;
        Ok(())
    }

    /// Discard a message without requeueing it. Used for poison jobs; the
    /// referenced submission stays in Pending, which is surfaced by the
    /// collaborator UI, not retried here.
    pub async fn reject(&mut self, delivery: Delivery) -> Result<(), QueueError> {
        warn!(payload = %delivery.payload, "Discarding job without requeue");
        let _: usize = self
            .conn
            .lrem(&self.processing_key, 1, &delivery.payload)
            .await?;
        Ok(())
    }
}
