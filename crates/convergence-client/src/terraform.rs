//! Terraform CLI driver
//!
//! Each job owns a working directory `<state_dir>/<name>/<purpose>` holding
//! the copied template files, the rendered `terraform.tfvars.json` and the
//! local `terraform.tfstate`.

use crate::engine_trait::ConvergenceEngine;
use crate::error::ConvergenceError;
use crate::job::{ConvergenceJob, JobId, TemplateBinding};
use crate::state::{parse_state_outputs, StateLookup, StateOutputs};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const STATE_FILE: &str = "terraform.tfstate";
const VARS_FILE: &str = "terraform.tfvars.json";
const STDERR_TAIL_CHARS: usize = 1000;

/// Settings for [`TerraformEngine`]
#[derive(Debug, Clone)]
pub struct TerraformEngineConfig {
    /// Path or name of the terraform executable
    pub binary: PathBuf,
    /// Directory containing one sub-directory per template ID
    pub templates_dir: PathBuf,
    /// Root of the per-job working directories
    ///
    /// Holds the only copy of the engine state, so it has to outlive the
    /// process (a persistent volume in a pod).
    pub state_dir: PathBuf,
    /// Upper bound on the runtime of a single terraform command
    pub command_timeout: Duration,
}

impl Default for TerraformEngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
            templates_dir: PathBuf::from("/charts"),
            state_dir: PathBuf::from("/var/lib/infra-controller/state"),
            command_timeout: Duration::from_secs(1800),
        }
    }
}

/// Convergence engine backed by the Terraform CLI
#[derive(Debug, Clone)]
pub struct TerraformEngine {
    config: TerraformEngineConfig,
}

impl TerraformEngine {
    pub fn new(config: TerraformEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TerraformEngineConfig {
        &self.config
    }

    /// Number of cluster directories under the state root
    ///
    /// A missing root counts as empty.
    pub async fn recorded_clusters(&self) -> Result<usize, ConvergenceError> {
        let mut entries = match tokio::fs::read_dir(&self.config.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Working directory of a job
    pub fn work_dir(&self, id: &JobId) -> PathBuf {
        self.config.state_dir.join(&id.name).join(id.purpose.as_str())
    }

    /// Copy the template files and write the rendered variables into the working directory
    async fn render(&self, work_dir: &Path, binding: &TemplateBinding) -> Result<(), ConvergenceError> {
        let template_dir = self.config.templates_dir.join(&binding.template_id);
        match tokio::fs::metadata(&template_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ConvergenceError::TemplateNotFound(binding.template_id.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConvergenceError::TemplateNotFound(binding.template_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        tokio::fs::create_dir_all(work_dir).await?;

        let mut copied = 0usize;
        let mut entries = tokio::fs::read_dir(&template_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let is_config = name.ends_with(".tf") || name.ends_with(".tf.json");
            if !is_config || name == VARS_FILE || !entry.file_type().await?.is_file() {
                continue;
            }
            tokio::fs::copy(entry.path(), work_dir.join(&file_name)).await?;
            copied += 1;
        }
        if copied == 0 {
            return Err(ConvergenceError::TemplateNotFound(format!(
                "{} (no configuration files)",
                binding.template_id
            )));
        }

        tokio::fs::write(work_dir.join(VARS_FILE), binding.config.to_bytes()?).await?;
        debug!(
            "Rendered template {} ({} files) into {}",
            binding.template_id,
            copied,
            work_dir.display()
        );
        Ok(())
    }

    /// Run one terraform sub-command inside the job's working directory
    async fn run(&self, job: &ConvergenceJob, work_dir: &Path, args: &[&str]) -> Result<(), ConvergenceError> {
        let command = format!("terraform {}", args.first().copied().unwrap_or_default());
        debug!("Running {} for job {}", command, job.id());

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args)
            .current_dir(work_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(job.variables().iter())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.config.command_timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConvergenceError::Timeout {
                    command,
                    after_secs: self.config.command_timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(ConvergenceError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }

    async fn state_file_exists(&self, work_dir: &Path) -> Result<bool, ConvergenceError> {
        match tokio::fs::metadata(work_dir.join(STATE_FILE)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

#[async_trait::async_trait]
impl ConvergenceEngine for TerraformEngine {
    async fn apply(&self, job: &ConvergenceJob) -> Result<(), ConvergenceError> {
        let binding = job
            .binding()
            .ok_or_else(|| ConvergenceError::NotInitialized(job.id().to_string()))?;
        let work_dir = self.work_dir(job.id());

        info!("Applying template {} for job {}", binding.template_id, job.id());
        self.render(&work_dir, binding).await?;
        self.run(job, &work_dir, &["init", "-input=false", "-no-color"]).await?;
        self.run(job, &work_dir, &["apply", "-input=false", "-auto-approve", "-no-color"])
            .await?;
        info!("Applied job {}", job.id());
        Ok(())
    }

    async fn destroy(&self, job: &ConvergenceJob) -> Result<(), ConvergenceError> {
        let work_dir = self.work_dir(job.id());
        if !self.state_file_exists(&work_dir).await? {
            info!("No state recorded for job {}, nothing to destroy", job.id());
            return Ok(());
        }

        info!("Destroying job {}", job.id());
        if let Some(binding) = job.binding() {
            self.render(&work_dir, binding).await?;
        }
        self.run(job, &work_dir, &["init", "-input=false", "-no-color"]).await?;
        self.run(job, &work_dir, &["destroy", "-input=false", "-auto-approve", "-no-color"])
            .await?;
        tokio::fs::remove_dir_all(&work_dir).await?;
        info!("Destroyed job {}", job.id());
        Ok(())
    }

    async fn has_state(&self, id: &JobId) -> Result<bool, ConvergenceError> {
        self.state_file_exists(&self.work_dir(id)).await
    }

    async fn state_output_variables(&self, id: &JobId, names: &[&str]) -> StateLookup<StateOutputs> {
        let path = self.work_dir(id).join(STATE_FILE);
        match tokio::fs::read(&path).await {
            Ok(state) => parse_state_outputs(&state, names),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state file for job {}", id);
                StateLookup::NotFound
            }
            Err(e) => StateLookup::Error(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_end_of_output() {
        let long = format!("{}Error: quota exceeded", "x".repeat(5000));
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS);
        assert!(tail.ends_with("Error: quota exceeded"));
        assert_eq!(stderr_tail(b"  short\n"), "short");
    }

    #[test]
    fn test_work_dir_layout() {
        let engine = TerraformEngine::new(TerraformEngineConfig {
            state_dir: PathBuf::from("/state"),
            ..TerraformEngineConfig::default()
        });
        let dir = engine.work_dir(&JobId::new("shoot--dev--alpha", crate::job::Purpose::Infra));
        assert_eq!(dir, PathBuf::from("/state/shoot--dev--alpha/infra"));
    }
}
