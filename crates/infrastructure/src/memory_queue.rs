use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domainscout_domain::{ScoutError, ScoutResult, TaskMessage, TaskOutcome, TaskQueue};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// How long terminal task ids are remembered for `AlreadyAcked` detection.
const ACK_RETENTION: Duration = Duration::from_secs(3600);

/// In-memory task queue built on a tokio channel, used for embedded
/// deployments and tests. The channel receiver sits behind a mutex so
/// multiple worker loops can share one queue; a task handed out by `recv`
/// is gone for every other claimer, which is the mutual-exclusion property
/// the claim contract requires.
pub struct MemoryTaskQueue {
    sender: mpsc::UnboundedSender<TaskMessage>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<TaskMessage>>>,
    claims: Arc<Mutex<ClaimTable>>,
    pending: Arc<AtomicU32>,
    lease: Duration,
}

#[derive(Default)]
struct ClaimTable {
    in_flight: HashMap<String, InFlightTask>,
    acked: HashMap<String, Instant>,
}

struct InFlightTask {
    task: TaskMessage,
    lease_deadline: Instant,
}

impl MemoryTaskQueue {
    pub fn new(lease: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            claims: Arc::new(Mutex::new(ClaimTable::default())),
            pending: Arc::new(AtomicU32::new(0)),
            lease,
        }
    }

    fn push(&self, task: TaskMessage) -> ScoutResult<()> {
        self.sender
            .send(task)
            .map_err(|e| ScoutError::queue(format!("queue channel closed: {e}")))?;
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(900))
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, job_id: &str, domains: &[String]) -> ScoutResult<()> {
        for (sequence, domain) in domains.iter().enumerate() {
            self.push(TaskMessage::new(job_id, domain, sequence as u32))?;
        }
        debug!("enqueued {} tasks for job {}", domains.len(), job_id);
        Ok(())
    }

    async fn claim(&self, worker_id: &str, timeout: Duration) -> ScoutResult<Option<TaskMessage>> {
        let receiver = Arc::clone(&self.receiver);
        let recv = async {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };

        match tokio::time::timeout(timeout, recv).await {
            Ok(Some(task)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                let task = task.claimed_by(worker_id);
                let mut claims = self.claims.lock().await;
                claims.in_flight.insert(
                    task.id.clone(),
                    InFlightTask {
                        task: task.clone(),
                        lease_deadline: Instant::now() + self.lease,
                    },
                );
                Ok(Some(task))
            }
            Ok(None) => Err(ScoutError::queue("queue channel closed")),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&self, task_id: &str, outcome: TaskOutcome) -> ScoutResult<()> {
        let mut claims = self.claims.lock().await;
        if claims.in_flight.remove(task_id).is_some() {
            claims.acked.insert(task_id.to_string(), Instant::now());
            debug!("acked task {} ({:?})", task_id, outcome);
            return Ok(());
        }
        if claims.acked.contains_key(task_id) {
            return Err(ScoutError::AlreadyAcked {
                id: task_id.to_string(),
            });
        }
        Err(ScoutError::UnknownTask {
            id: task_id.to_string(),
        })
    }

    async fn requeue_expired(&self) -> ScoutResult<u32> {
        let now = Instant::now();
        let expired: Vec<TaskMessage> = {
            let mut claims = self.claims.lock().await;
            let ids: Vec<String> = claims
                .in_flight
                .iter()
                .filter(|(_, f)| f.lease_deadline <= now)
                .map(|(id, _)| id.clone())
                .collect();
            let tasks = ids
                .iter()
                .filter_map(|id| claims.in_flight.remove(id))
                .map(|f| f.task)
                .collect();
            claims.acked.retain(|_, acked_at| now.duration_since(*acked_at) < ACK_RETENTION);
            tasks
        };

        let count = expired.len() as u32;
        for task in expired {
            warn!(
                "lease expired for task {} (domain {}), requeueing",
                task.id, task.domain
            );
            self.push(task.released())?;
        }
        Ok(count)
    }

    async fn pending_tasks(&self) -> ScoutResult<u32> {
        Ok(self.pending.load(Ordering::Relaxed))
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|d| d.to_string()).collect()
    }

    #[tokio::test]
    async fn claim_returns_enqueued_tasks() {
        let queue = MemoryTaskQueue::default();
        queue
            .enqueue("job-1", &domains(&["a.com", "b.com"]))
            .await
            .unwrap();

        let task = queue
            .claim("w1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.job_id, "job-1");
        assert_eq!(task.worker_id.as_deref(), Some("w1"));
        assert!(task.claimed_at.is_some());
        assert_eq!(queue.pending_tasks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_on_empty_queue_times_out_with_none() {
        let queue = MemoryTaskQueue::default();
        let start = Instant::now();
        let claimed = queue.claim("w1", Duration::from_millis(50)).await.unwrap();
        assert!(claimed.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn concurrent_claims_never_hand_out_the_same_task() {
        let queue = Arc::new(MemoryTaskQueue::default());
        let all: Vec<String> = (0..100).map(|i| format!("domain-{i}.com")).collect();
        queue.enqueue("job-1", &all).await.unwrap();

        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::new();
        for w in 0..8 {
            let queue = Arc::clone(&queue);
            let seen = Arc::clone(&seen);
            handles.push(tokio::spawn(async move {
                let worker_id = format!("w{w}");
                while let Some(task) = queue
                    .claim(&worker_id, Duration::from_millis(20))
                    .await
                    .unwrap()
                {
                    let fresh = seen.lock().await.insert(task.id.clone());
                    assert!(fresh, "task {} claimed twice", task.id);
                    queue.ack(&task.id, TaskOutcome::Success).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(seen.lock().await.len(), 100);
        assert_eq!(queue.pending_tasks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_of_unclaimed_task_is_rejected() {
        let queue = MemoryTaskQueue::default();
        let err = queue
            .ack("never-claimed", TaskOutcome::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::UnknownTask { .. }));
    }

    #[tokio::test]
    async fn double_ack_is_rejected() {
        let queue = MemoryTaskQueue::default();
        queue.enqueue("job-1", &domains(&["a.com"])).await.unwrap();
        let task = queue
            .claim("w1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();

        queue.ack(&task.id, TaskOutcome::Success).await.unwrap();
        let err = queue.ack(&task.id, TaskOutcome::Success).await.unwrap_err();
        assert!(matches!(err, ScoutError::AlreadyAcked { .. }));
    }

    #[tokio::test]
    async fn expired_lease_puts_task_back_on_the_queue() {
        let queue = MemoryTaskQueue::new(Duration::from_millis(10));
        queue.enqueue("job-1", &domains(&["a.com"])).await.unwrap();

        let task = queue
            .claim("w1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(queue.requeue_expired().await.unwrap(), 1);
        let again = queue
            .claim("w2", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, task.id);
        assert_eq!(again.domain, task.domain);
        assert_eq!(again.worker_id.as_deref(), Some("w2"));

        // re-delivery keeps the task id, so exactly one ack wins
        queue.ack(&again.id, TaskOutcome::Success).await.unwrap();
        let err = queue.ack(&task.id, TaskOutcome::Success).await.unwrap_err();
        assert!(matches!(err, ScoutError::AlreadyAcked { .. }));
    }

    #[tokio::test]
    async fn unexpired_lease_is_left_alone() {
        let queue = MemoryTaskQueue::new(Duration::from_secs(60));
        queue.enqueue("job-1", &domains(&["a.com"])).await.unwrap();
        queue
            .claim("w1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.requeue_expired().await.unwrap(), 0);
    }
}
