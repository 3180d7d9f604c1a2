use async_trait::async_trait;
use domainscout_domain::{DomainPipeline, PipelineOutput, ScoutError, ScoutResult};
use tokio::process::Command;
use tracing::debug;

/// Runs the scrape/extract pipeline as an external executable, invoked as
/// `{command} {args..} {domain}`. The child's stdout must be a single JSON
/// document with the extracted company profile.
pub struct CommandPipeline {
    command: String,
    args: Vec<String>,
}

impl CommandPipeline {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl DomainPipeline for CommandPipeline {
    async fn process(&self, domain: &str) -> ScoutResult<PipelineOutput> {
        debug!("running {} for {}", self.command, domain);
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(domain)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScoutError::Pipeline {
                domain: domain.to_string(),
                message: format!("failed to spawn {}: {e}", self.command),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoutError::Pipeline {
                domain: domain.to_string(),
                message: format!(
                    "{} exited with {}: {}",
                    self.command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let company_data =
            serde_json::from_slice(&output.stdout).map_err(|e| ScoutError::Pipeline {
                domain: domain.to_string(),
                message: format!("unparseable pipeline output: {e}"),
            })?;
        Ok(PipelineOutput { company_data })
    }
}
