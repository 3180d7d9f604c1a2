use std::sync::Arc;
use std::time::{Duration, Instant};

use domainscout_domain::{DomainPipeline, FailureKind, ScoutError, TaskReport};
use tracing::{debug, warn};

/// Executes one domain against the pipeline and converts every possible
/// outcome (success, pipeline error, timeout, panic) into a [`TaskReport`].
/// The runner itself never fails; a task failure is data, not an error.
pub struct TaskRunner {
    pipeline: Arc<dyn DomainPipeline>,
    task_timeout: Duration,
}

impl TaskRunner {
    pub fn new(pipeline: Arc<dyn DomainPipeline>, task_timeout: Duration) -> Self {
        Self {
            pipeline,
            task_timeout,
        }
    }

    pub async fn execute(&self, domain: &str) -> TaskReport {
        let started = Instant::now();
        let pipeline = Arc::clone(&self.pipeline);
        let owned = domain.to_string();

        // run in a spawned task so a panicking pipeline only fails this
        // domain instead of tearing down the worker loop
        let work = tokio::spawn(async move { pipeline.process(&owned).await });

        let outcome = tokio::time::timeout(self.task_timeout, work).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(Ok(output))) => {
                debug!(
                    "pipeline produced {} bytes of profile data for {}",
                    output.company_data.to_string().len(),
                    domain
                );
                TaskReport::success(domain, duration_ms)
            }
            Ok(Ok(Err(e))) => {
                let kind = match e {
                    ScoutError::Pipeline { .. } => FailureKind::Pipeline,
                    _ => FailureKind::Internal,
                };
                warn!("pipeline failed for {}: {}", domain, e);
                TaskReport::failure(domain, kind, e.to_string(), duration_ms)
            }
            Ok(Err(join_error)) => {
                warn!("pipeline task for {} aborted: {}", domain, join_error);
                TaskReport::failure(
                    domain,
                    FailureKind::Internal,
                    format!("pipeline task aborted: {join_error}"),
                    duration_ms,
                )
            }
            Err(_) => {
                let e = ScoutError::TaskTimeout {
                    domain: domain.to_string(),
                    timeout_seconds: self.task_timeout.as_secs(),
                };
                warn!("{}", e);
                TaskReport::failure(domain, FailureKind::Timeout, e.to_string(), duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domainscout_domain::{PipelineOutput, ScoutResult, TaskOutcome};

    struct StubPipeline {
        delay: Duration,
        fail: bool,
        panic: bool,
    }

    #[async_trait]
    impl DomainPipeline for StubPipeline {
        async fn process(&self, domain: &str) -> ScoutResult<PipelineOutput> {
            tokio::time::sleep(self.delay).await;
            if self.panic {
                panic!("pipeline blew up");
            }
            if self.fail {
                return Err(ScoutError::Pipeline {
                    domain: domain.to_string(),
                    message: "extraction failed".to_string(),
                });
            }
            Ok(PipelineOutput {
                company_data: serde_json::json!({ "domain": domain }),
            })
        }
    }

    fn runner(delay_ms: u64, fail: bool, panic: bool, timeout_ms: u64) -> TaskRunner {
        TaskRunner::new(
            Arc::new(StubPipeline {
                delay: Duration::from_millis(delay_ms),
                fail,
                panic,
            }),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn success_produces_a_success_report() {
        let report = runner(0, false, false, 1000).execute("a.com").await;
        assert_eq!(report.outcome, TaskOutcome::Success);
        assert!(report.failure_kind.is_none());
    }

    #[tokio::test]
    async fn pipeline_error_is_a_pipeline_failure() {
        let report = runner(0, true, false, 1000).execute("a.com").await;
        assert_eq!(report.outcome, TaskOutcome::Failure);
        assert_eq!(report.failure_kind, Some(FailureKind::Pipeline));
        assert!(report.error.as_deref().unwrap().contains("extraction failed"));
    }

    #[tokio::test]
    async fn slow_pipeline_is_a_timeout_failure() {
        let report = runner(200, false, false, 20).execute("a.com").await;
        assert_eq!(report.failure_kind, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn panicking_pipeline_is_contained_as_internal_failure() {
        let report = runner(0, false, true, 1000).execute("a.com").await;
        assert_eq!(report.failure_kind, Some(FailureKind::Internal));
    }
}
