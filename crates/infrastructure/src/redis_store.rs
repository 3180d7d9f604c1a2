use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domainscout_domain::{
    Job, JobMetrics, JobStatus, JobStore, JobView, LogEntry, ProcessingMode, ScoutError,
    ScoutResult, TaskReport, WorkerSnapshot, WorkerState,
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

/// Redis-backed job record store. Counters live in a per-job hash mutated
/// with `HINCRBY`, result idempotency comes from `HSETNX` on the results
/// hash, and every key carries the retention TTL so expired jobs simply
/// disappear.
pub struct RedisJobStore {
    conn: ConnectionManager,
    retention_seconds: u64,
    log_limit: usize,
}

impl RedisJobStore {
    pub async fn connect(
        url: &str,
        retention_seconds: u64,
        log_limit: usize,
        connect_timeout: Duration,
    ) -> ScoutResult<Self> {
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
        info!("connected to redis job store at {}", url);
        Ok(Self {
            conn,
            retention_seconds,
            log_limit,
        })
    }

    fn job_key(job_id: &str) -> String {
        format!("scout:job:{job_id}")
    }

    fn domains_key(job_id: &str) -> String {
        format!("scout:job:{job_id}:domains")
    }

    fn logs_key(job_id: &str) -> String {
        format!("scout:job:{job_id}:logs")
    }

    fn workers_key(job_id: &str) -> String {
        format!("scout:job:{job_id}:workers")
    }

    fn timings_key(job_id: &str) -> String {
        format!("scout:job:{job_id}:timings")
    }

    fn results_key(job_id: &str) -> String {
        format!("scout:job:{job_id}:results")
    }

    async fn ensure_exists(&self, conn: &mut ConnectionManager, job_id: &str) -> ScoutResult<()> {
        let exists: bool = conn
            .exists(Self::job_key(job_id))
            .await
            .map_err(|e| ScoutError::store(format!("job lookup failed: {e}")))?;
        if exists {
            Ok(())
        } else {
            Err(ScoutError::unknown_job(job_id))
        }
    }

    async fn current_status(
        &self,
        conn: &mut ConnectionManager,
        job_id: &str,
    ) -> ScoutResult<JobStatus> {
        let raw: String = conn
            .hget(Self::job_key(job_id), "status")
            .await
            .map_err(|e| ScoutError::store(format!("status read failed: {e}")))?;
        parse_status(&raw)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create_job(&self, domains: &[String], mode: ProcessingMode) -> ScoutResult<Job> {
        if domains.is_empty() {
            return Err(ScoutError::invalid_submission(
                "refusing to create a job with zero domains",
            ));
        }

        let job = Job::new(domains.to_vec(), mode);
        let fields: Vec<(&str, String)> = vec![
            ("mode", job.mode.to_string()),
            ("total", job.total.to_string()),
            ("completed", "0".to_string()),
            ("failed", "0".to_string()),
            ("status", job.status.to_string()),
            ("created_at", job.created_at.to_rfc3339()),
        ];

        let mut conn = self.conn.clone();
        let ttl = self.retention_seconds as i64;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(Self::job_key(&job.id), &fields)
            .rpush(Self::domains_key(&job.id), &job.domains)
            .expire(Self::job_key(&job.id), ttl)
            .expire(Self::domains_key(&job.id), ttl);
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| ScoutError::store(format!("create job failed: {e}")))?;

        debug!("created job {} with {} domains ({})", job.id, job.total, mode);
        Ok(job)
    }

    async fn mark_processing(&self, job_id: &str) -> ScoutResult<()> {
        let mut conn = self.conn.clone();
        self.ensure_exists(&mut conn, job_id).await?;

        if self.current_status(&mut conn, job_id).await? == JobStatus::Queued {
            let mut pipe = redis::pipe();
            pipe.atomic()
                .hset(
                    Self::job_key(job_id),
                    "status",
                    JobStatus::Processing.to_string(),
                )
                .hset_nx(Self::job_key(job_id), "started_at", Utc::now().to_rfc3339());
            let _: () = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| ScoutError::store(format!("mark processing failed: {e}")))?;
        }
        Ok(())
    }

    async fn record_result(
        &self,
        job_id: &str,
        report: &TaskReport,
        logs: Vec<LogEntry>,
    ) -> ScoutResult<JobStatus> {
        let mut conn = self.conn.clone();
        self.ensure_exists(&mut conn, job_id).await?;

        let domains: Vec<String> = conn
            .lrange(Self::domains_key(job_id), 0, -1)
            .await
            .map_err(|e| ScoutError::store(format!("domain list read failed: {e}")))?;
        if !domains.contains(&report.domain) {
            return Err(ScoutError::UnknownTask {
                id: format!("{}:{}", job_id, report.domain),
            });
        }

        // HSETNX is the idempotency gate: only the first result per domain
        // gets to touch the counters.
        let fresh: bool = conn
            .hset_nx(
                Self::results_key(job_id),
                &report.domain,
                serde_json::to_string(report)?,
            )
            .await
            .map_err(|e| ScoutError::store(format!("result write failed: {e}")))?;
        if !fresh {
            warn!(
                "duplicate result for {} in job {}, ignoring",
                report.domain, job_id
            );
            let entry = LogEntry::warning(format!("duplicate result for {} ignored", report.domain));
            let _: () = conn
                .rpush(Self::logs_key(job_id), serde_json::to_string(&entry)?)
                .await
                .map_err(|e| ScoutError::store(format!("log append failed: {e}")))?;
            return self.current_status(&mut conn, job_id).await;
        }

        let counter = if report.is_success() { "completed" } else { "failed" };
        let _: i64 = conn
            .hincr(Self::job_key(job_id), counter, 1)
            .await
            .map_err(|e| ScoutError::store(format!("counter update failed: {e}")))?;

        let ttl = self.retention_seconds as i64;
        let mut pipe = redis::pipe();
        pipe.hset(
            Self::timings_key(job_id),
            &report.domain,
            report.duration_ms,
        );
        for entry in &logs {
            pipe.rpush(Self::logs_key(job_id), serde_json::to_string(entry)?);
        }
        pipe.expire(Self::results_key(job_id), ttl)
            .expire(Self::timings_key(job_id), ttl)
            .expire(Self::logs_key(job_id), ttl);
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| ScoutError::store(format!("result bookkeeping failed: {e}")))?;

        let (completed, failed, total): (u32, u32, u32) = conn
            .hget(Self::job_key(job_id), &["completed", "failed", "total"])
            .await
            .map_err(|e| ScoutError::store(format!("counter read failed: {e}")))?;

        if completed + failed >= total {
            let status = if failed == 0 {
                JobStatus::Completed
            } else {
                JobStatus::CompletedWithFailures
            };
            let now = Utc::now().to_rfc3339();
            let mut pipe = redis::pipe();
            pipe.atomic()
                .hset(Self::job_key(job_id), "status", status.to_string())
                .hset(Self::job_key(job_id), "completed_at", now.clone())
                .hset(Self::job_key(job_id), "finished_at", now);
            let _: () = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| ScoutError::store(format!("finalize failed: {e}")))?;
            info!(
                "job {} finished: {} completed, {} failed",
                job_id, completed, failed
            );
            Ok(status)
        } else {
            // results can land before the enqueue path calls mark_processing
            if self.current_status(&mut conn, job_id).await? == JobStatus::Queued {
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .hset(
                        Self::job_key(job_id),
                        "status",
                        JobStatus::Processing.to_string(),
                    )
                    .hset_nx(Self::job_key(job_id), "started_at", Utc::now().to_rfc3339());
                let _: () = pipe
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| ScoutError::store(format!("mark processing failed: {e}")))?;
            }
            Ok(JobStatus::Processing)
        }
    }

    async fn append_log(&self, job_id: &str, entry: LogEntry) -> ScoutResult<()> {
        let mut conn = self.conn.clone();
        self.ensure_exists(&mut conn, job_id).await?;

        let mut pipe = redis::pipe();
        pipe.rpush(Self::logs_key(job_id), serde_json::to_string(&entry)?)
            .expire(Self::logs_key(job_id), self.retention_seconds as i64);
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| ScoutError::store(format!("log append failed: {e}")))?;
        Ok(())
    }

    async fn update_worker(&self, job_id: &str, snapshot: WorkerSnapshot) -> ScoutResult<()> {
        let mut conn = self.conn.clone();
        self.ensure_exists(&mut conn, job_id).await?;

        let mut pipe = redis::pipe();
        pipe.hset(
            Self::workers_key(job_id),
            &snapshot.worker_id,
            serde_json::to_string(&snapshot)?,
        )
        .expire(Self::workers_key(job_id), self.retention_seconds as i64);
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| ScoutError::store(format!("worker update failed: {e}")))?;
        Ok(())
    }

    async fn get_status(&self, job_id: &str) -> ScoutResult<JobView> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(Self::job_key(job_id))
            .await
            .map_err(|e| ScoutError::store(format!("job read failed: {e}")))?;
        if fields.is_empty() {
            return Err(ScoutError::unknown_job(job_id));
        }

        let mode = parse_mode(field(&fields, "mode")?)?;
        let status = parse_status(field(&fields, "status")?)?;
        let total = parse_count(&fields, "total")?;
        let completed = parse_count(&fields, "completed")?;
        let failed = parse_count(&fields, "failed")?;
        let created_at = parse_time(field(&fields, "created_at")?)?;
        let completed_at = fields
            .get("completed_at")
            .map(|raw| parse_time(raw))
            .transpose()?;
        let started_at = fields
            .get("started_at")
            .map(|raw| parse_time(raw))
            .transpose()?;
        let finished_at = fields
            .get("finished_at")
            .map(|raw| parse_time(raw))
            .transpose()?;

        let tail = -(self.log_limit.max(1) as isize);
        let raw_logs: Vec<String> = conn
            .lrange(Self::logs_key(job_id), tail, -1)
            .await
            .map_err(|e| ScoutError::store(format!("log read failed: {e}")))?;
        let logs: Vec<LogEntry> = raw_logs
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect::<Result<_, _>>()?;

        let raw_workers: HashMap<String, String> = conn
            .hgetall(Self::workers_key(job_id))
            .await
            .map_err(|e| ScoutError::store(format!("worker read failed: {e}")))?;
        let mut workers: Vec<WorkerSnapshot> = raw_workers
            .values()
            .map(|raw| serde_json::from_str(raw))
            .collect::<Result<_, _>>()?;
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        let domain_timings_ms: HashMap<String, u64> = conn
            .hgetall(Self::timings_key(job_id))
            .await
            .map_err(|e| ScoutError::store(format!("timing read failed: {e}")))?;

        let current_domain = workers
            .iter()
            .find(|w| w.state == WorkerState::Processing)
            .and_then(|w| w.current_domain.clone());

        Ok(JobView {
            job_id: job_id.to_string(),
            mode,
            status,
            total,
            completed,
            failed,
            pending: total.saturating_sub(completed + failed),
            current_domain,
            logs,
            workers,
            metrics: JobMetrics {
                started_at,
                finished_at,
                domain_timings_ms,
            },
            created_at,
            completed_at,
        })
    }

    async fn reap_expired(&self) -> ScoutResult<u32> {
        // every key was written with the retention TTL, redis reaps for us
        Ok(0)
    }
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> ScoutResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ScoutError::store(format!("job record missing field '{name}'")))
}

fn parse_count(fields: &HashMap<String, String>, name: &str) -> ScoutResult<u32> {
    field(fields, name)?
        .parse()
        .map_err(|e| ScoutError::store(format!("bad counter '{name}': {e}")))
}

fn parse_time(raw: &str) -> ScoutResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ScoutError::store(format!("bad timestamp '{raw}': {e}")))
}

fn parse_mode(raw: &str) -> ScoutResult<ProcessingMode> {
    match raw {
        "parallel" => Ok(ProcessingMode::Parallel),
        "sequential" => Ok(ProcessingMode::Sequential),
        other => Err(ScoutError::store(format!("unknown mode '{other}'"))),
    }
}

fn parse_status(raw: &str) -> ScoutResult<JobStatus> {
    match raw {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "completed_with_failures" => Ok(JobStatus::CompletedWithFailures),
        other => Err(ScoutError::store(format!("unknown status '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_display_form() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::CompletedWithFailures,
        ] {
            assert_eq!(parse_status(&status.to_string()).unwrap(), status);
        }
        assert!(parse_status("cancelled").is_err());
    }

    #[test]
    fn mode_round_trips_through_its_display_form() {
        for mode in [ProcessingMode::Parallel, ProcessingMode::Sequential] {
            assert_eq!(parse_mode(&mode.to_string()).unwrap(), mode);
        }
        assert!(parse_mode("batch").is_err());
    }

    #[test]
    fn timestamps_survive_the_rfc3339_round_trip() {
        let now = Utc::now();
        let parsed = parse_time(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
    }
}
