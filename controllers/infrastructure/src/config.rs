//! Environment-driven controller configuration.

use crate::error::ControllerError;
use convergence_client::TerraformEngineConfig;
use infra_orchestrator::DEFAULT_MAX_PAGES;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_OBJECT_PAGE_SIZE: usize = 1000;
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 3600;
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Settings read once at start-up
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    pub engine: TerraformEngineConfig,
    pub purge_max_pages: usize,
    pub object_page_size: usize,
    /// Override for the Alicloud VPC OpenAPI endpoint
    pub alicloud_vpc_endpoint: Option<String>,
    /// How long a converged object rests before it is converged again
    pub resync_interval: Duration,
    pub metrics_addr: SocketAddr,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = TerraformEngineConfig::default();
        let engine = TerraformEngineConfig {
            binary: get("TERRAFORM_BINARY").map(PathBuf::from).unwrap_or(defaults.binary),
            templates_dir: get("TEMPLATES_DIR").map(PathBuf::from).unwrap_or(defaults.templates_dir),
            state_dir: get("STATE_DIR").map(PathBuf::from).unwrap_or(defaults.state_dir),
            command_timeout: Duration::from_secs(positive(
                "ENGINE_TIMEOUT_SECS",
                get("ENGINE_TIMEOUT_SECS"),
                DEFAULT_ENGINE_TIMEOUT_SECS,
            )?),
        };

        let metrics_addr = match get("METRICS_ADDR") {
            Some(raw) => parse("METRICS_ADDR", &raw)?,
            None => parse("METRICS_ADDR", DEFAULT_METRICS_ADDR)?,
        };

        Ok(Self {
            namespace: get("WATCH_NAMESPACE"),
            engine,
            purge_max_pages: positive("PURGE_MAX_PAGES", get("PURGE_MAX_PAGES"), DEFAULT_MAX_PAGES)?,
            object_page_size: positive("OBJECT_PAGE_SIZE", get("OBJECT_PAGE_SIZE"), DEFAULT_OBJECT_PAGE_SIZE)?,
            alicloud_vpc_endpoint: get("ALICLOUD_VPC_ENDPOINT"),
            resync_interval: Duration::from_secs(positive(
                "RESYNC_INTERVAL_SECS",
                get("RESYNC_INTERVAL_SECS"),
                DEFAULT_RESYNC_INTERVAL_SECS,
            )?),
            metrics_addr,
        })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{} has invalid value '{}': {}", key, raw, e)))
}

fn positive<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ControllerError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: T = parse(key, &raw)?;
    if value == T::default() {
        return Err(ControllerError::InvalidConfig(format!("{} must be greater than zero", key)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.engine.binary, PathBuf::from("terraform"));
        assert_eq!(config.engine.templates_dir, PathBuf::from("/charts"));
        assert_eq!(config.engine.command_timeout, Duration::from_secs(1800));
        assert_eq!(config.purge_max_pages, 10_000);
        assert_eq!(config.object_page_size, 1000);
        assert_eq!(config.alicloud_vpc_endpoint, None);
        assert_eq!(config.resync_interval, Duration::from_secs(3600));
        assert_eq!(config.metrics_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("WATCH_NAMESPACE", "garden"),
            ("TERRAFORM_BINARY", "/usr/local/bin/tofu"),
            ("STATE_DIR", "/data/state"),
            ("ENGINE_TIMEOUT_SECS", "600"),
            ("PURGE_MAX_PAGES", "50"),
            ("OBJECT_PAGE_SIZE", "200"),
            ("ALICLOUD_VPC_ENDPOINT", "https://vpc.eu-central-1.aliyuncs.com"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ])
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("garden"));
        assert_eq!(config.engine.binary, PathBuf::from("/usr/local/bin/tofu"));
        assert_eq!(config.engine.state_dir, PathBuf::from("/data/state"));
        assert_eq!(config.engine.command_timeout, Duration::from_secs(600));
        assert_eq!(config.purge_max_pages, 50);
        assert_eq!(config.object_page_size, 200);
        assert_eq!(
            config.alicloud_vpc_endpoint.as_deref(),
            Some("https://vpc.eu-central-1.aliyuncs.com")
        );
        assert_eq!(config.metrics_addr.port(), 9090);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("WATCH_NAMESPACE", "  "), ("PURGE_MAX_PAGES", "")]).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.purge_max_pages, 10_000);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = config_from(&[("ENGINE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref msg) if msg.contains("ENGINE_TIMEOUT_SECS")));
    }

    #[test]
    fn test_zero_rejected() {
        let err = config_from(&[("OBJECT_PAGE_SIZE", "0")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref msg) if msg.contains("greater than zero")));
    }

    #[test]
    fn test_invalid_metrics_addr_rejected() {
        assert!(matches!(
            config_from(&[("METRICS_ADDR", "localhost")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
