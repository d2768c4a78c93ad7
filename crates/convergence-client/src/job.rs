//! Convergence jobs: identity, bound template and variables

use crate::environment::VariablesEnvironment;
use crate::error::ConvergenceError;
use serde::Serialize;
use std::fmt;

/// What a job's state is for; each purpose keeps its own state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Cluster network infrastructure
    Infra,
    /// Backup bucket and its access resources
    Backup,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Infra => "infra",
            Purpose::Backup => "backup",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which the engine keeps state: (name, purpose)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    pub name: String,
    pub purpose: Purpose,
}

impl JobId {
    pub fn new(name: impl Into<String>, purpose: Purpose) -> Self {
        Self {
            name: name.into(),
            purpose,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.purpose)
    }
}

/// Deterministic configuration tree handed to the engine
///
/// Equal trees always serialize to equal bytes (see [`ConvergenceConfig::to_bytes`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceConfig(serde_json::Value);

impl ConvergenceConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Build a config from any serializable value
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, ConvergenceError> {
        Ok(Self(serde_json::to_value(value)?))
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Canonical serialized form, with object keys sorted at every level
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConvergenceError> {
        Ok(serde_json::to_vec_pretty(&canonical(&self.0))?)
    }

    /// Look up a nested value by a `/`-separated JSON pointer
    pub fn pointer(&self, pointer: &str) -> Option<&serde_json::Value> {
        self.0.pointer(pointer)
    }
}

fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key.clone(), canonical(item)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// A named template bound to a rendered configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateBinding {
    pub template_id: String,
    pub config: ConvergenceConfig,
}

/// One apply or destroy request
///
/// Built fluently: `ConvergenceJob::new(id).with_variables(env).initialize_with(template, config)`.
/// The job is immutable once handed to the engine.
#[derive(Debug, Clone)]
pub struct ConvergenceJob {
    id: JobId,
    variables: VariablesEnvironment,
    binding: Option<TemplateBinding>,
}

impl ConvergenceJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            variables: VariablesEnvironment::new(),
            binding: None,
        }
    }

    /// Set the sensitive variables environment for this run
    #[must_use]
    pub fn with_variables(mut self, variables: VariablesEnvironment) -> Self {
        self.variables = variables;
        self
    }

    /// Bind a named template to its rendered configuration
    #[must_use]
    pub fn initialize_with(mut self, template_id: impl Into<String>, config: ConvergenceConfig) -> Self {
        self.binding = Some(TemplateBinding {
            template_id: template_id.into(),
            config,
        });
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn variables(&self) -> &VariablesEnvironment {
        &self.variables
    }

    pub fn binding(&self) -> Option<&TemplateBinding> {
        self.binding.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_bytes_are_key_order_independent() {
        let a = ConvergenceConfig::new(json!({"b": 1, "a": {"y": true, "x": "v"}}));
        let b = ConvergenceConfig::new(json!({"a": {"x": "v", "y": true}, "b": 1}));
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_job_builder_binds_template() {
        let job = ConvergenceJob::new(JobId::new("shoot--dev--alpha", Purpose::Backup))
            .initialize_with("alicloud-backup", ConvergenceConfig::new(json!({"bucket": {"name": "b"}})));
        assert_eq!(job.id().to_string(), "shoot--dev--alpha/backup");
        let binding = job.binding().unwrap();
        assert_eq!(binding.template_id, "alicloud-backup");
        assert_eq!(binding.config.pointer("/bucket/name"), Some(&json!("b")));
        assert!(job.variables().is_empty());
    }
}
