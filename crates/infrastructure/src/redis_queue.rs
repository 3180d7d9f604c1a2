use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use domainscout_domain::{ScoutError, ScoutResult, TaskMessage, TaskOutcome, TaskQueue};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

const PENDING_QUEUE: &str = "scout:pending";
const PROCESSING_HASH: &str = "scout:processing";
const ACKED_PREFIX: &str = "scout:acked:";
const ACKED_TTL_SECONDS: u64 = 86_400;

/// Redis-backed task queue. Pending tasks live on a list consumed with
/// `BLPOP`, which pops atomically and therefore gives the claim
/// mutual-exclusion guarantee for free; claimed tasks are parked in a
/// processing hash until acked or their lease expires.
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    lease: Duration,
}

impl RedisTaskQueue {
    /// Connects and verifies the server responds to `PING`. A connection
    /// failure maps to `BackendUnavailable` so the mode selector can react.
    pub async fn connect(url: &str, lease: Duration, connect_timeout: Duration) -> ScoutResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ScoutError::BackendUnavailable(format!("invalid redis url: {e}")))?;

        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                ScoutError::BackendUnavailable(format!(
                    "redis connect timed out after {}s",
                    connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| ScoutError::BackendUnavailable(format!("redis connect failed: {e}")))?;

        let queue = Self { conn, lease };
        if !queue.ping().await {
            return Err(ScoutError::BackendUnavailable(
                "redis did not answer ping".to_string(),
            ));
        }
        info!("connected to redis task queue at {}", url);
        Ok(queue)
    }

    fn acked_key(task_id: &str) -> String {
        format!("{ACKED_PREFIX}{task_id}")
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, job_id: &str, domains: &[String]) -> ScoutResult<()> {
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = domains
            .iter()
            .enumerate()
            .map(|(sequence, domain)| {
                serde_json::to_string(&TaskMessage::new(job_id, domain, sequence as u32))
            })
            .collect::<Result<_, _>>()?;

        // one RPUSH keeps the batch contiguous in enqueue order
        let _: () = conn
            .rpush(PENDING_QUEUE, payloads)
            .await
            .map_err(|e| ScoutError::queue(format!("enqueue failed: {e}")))?;
        debug!("enqueued {} tasks for job {}", domains.len(), job_id);
        Ok(())
    }

    async fn claim(&self, worker_id: &str, timeout: Duration) -> ScoutResult<Option<TaskMessage>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .blpop(PENDING_QUEUE, timeout.as_secs_f64().max(0.01))
            .await
            .map_err(|e| ScoutError::queue(format!("claim failed: {e}")))?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };

        let task: TaskMessage = serde_json::from_str(&payload)?;
        let task = task.claimed_by(worker_id);
        let _: () = conn
            .hset(PROCESSING_HASH, &task.id, serde_json::to_string(&task)?)
            .await
            .map_err(|e| ScoutError::queue(format!("failed to park claim: {e}")))?;
        Ok(Some(task))
    }

    async fn ack(&self, task_id: &str, outcome: TaskOutcome) -> ScoutResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(PROCESSING_HASH, task_id)
            .await
            .map_err(|e| ScoutError::queue(format!("ack failed: {e}")))?;

        if removed == 1 {
            let _: () = conn
                .set_ex(Self::acked_key(task_id), "1", ACKED_TTL_SECONDS)
                .await
                .map_err(|e| ScoutError::queue(format!("failed to mark ack: {e}")))?;
            debug!("acked task {} ({:?})", task_id, outcome);
            return Ok(());
        }

        let already: bool = conn
            .exists(Self::acked_key(task_id))
            .await
            .map_err(|e| ScoutError::queue(format!("ack lookup failed: {e}")))?;
        if already {
            Err(ScoutError::AlreadyAcked {
                id: task_id.to_string(),
            })
        } else {
            Err(ScoutError::UnknownTask {
                id: task_id.to_string(),
            })
        }
    }

    async fn requeue_expired(&self) -> ScoutResult<u32> {
        let mut conn = self.conn.clone();
        let parked: Vec<(String, String)> = conn
            .hgetall(PROCESSING_HASH)
            .await
            .map_err(|e| ScoutError::queue(format!("requeue scan failed: {e}")))?;

        let cutoff = Utc::now() - ChronoDuration::seconds(self.lease.as_secs() as i64);
        let mut requeued = 0;
        for (task_id, payload) in parked {
            let task: TaskMessage = match serde_json::from_str(&payload) {
                Ok(task) => task,
                Err(e) => {
                    warn!("dropping unparseable parked task {}: {}", task_id, e);
                    let _: i64 = conn
                        .hdel(PROCESSING_HASH, &task_id)
                        .await
                        .map_err(|e| ScoutError::queue(format!("requeue cleanup failed: {e}")))?;
                    continue;
                }
            };
            let Some(claimed_at) = task.claimed_at else {
                continue;
            };
            if claimed_at > cutoff {
                continue;
            }

            // HDEL returning 0 means another recovery pass got here first
            let removed: i64 = conn
                .hdel(PROCESSING_HASH, &task_id)
                .await
                .map_err(|e| ScoutError::queue(format!("requeue failed: {e}")))?;
            if removed == 1 {
                warn!(
                    "lease expired for task {} (domain {}), requeueing",
                    task_id, task.domain
                );
                let _: () = conn
                    .rpush(PENDING_QUEUE, serde_json::to_string(&task.released())?)
                    .await
                    .map_err(|e| ScoutError::queue(format!("requeue push failed: {e}")))?;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn pending_tasks(&self) -> ScoutResult<u32> {
        let mut conn = self.conn.clone();
        let len: i64 = conn
            .llen(PENDING_QUEUE)
            .await
            .map_err(|e| ScoutError::queue(format!("llen failed: {e}")))?;
        Ok(len as u32)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        matches!(
            redis::cmd("PING").query_async::<String>(&mut conn).await,
            Ok(response) if response == "PONG"
        )
    }
}
