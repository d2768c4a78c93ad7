//! Sensitive variables environment injected into engine runs

use crate::error::ConvergenceError;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix the engine uses to pick up input variables from the environment
pub const VARIABLE_PREFIX: &str = "TF_VAR_";

/// Environment variables carrying credentials into an engine run
///
/// Values are never printed: `Debug` only lists the variable names.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct VariablesEnvironment {
    vars: BTreeMap<String, String>,
}

impl VariablesEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the environment from secret data
    ///
    /// `mapping` pairs an engine variable name with the secret data key holding
    /// its value; each variable is exported as `TF_VAR_<name>`.
    pub fn from_secret_data(
        data: &BTreeMap<String, Vec<u8>>,
        mapping: &[(&str, &str)],
    ) -> Result<Self, ConvergenceError> {
        let mut env = Self::new();
        for (variable, key) in mapping {
            let value = data
                .get(*key)
                .ok_or_else(|| ConvergenceError::MissingVariable(format!("{variable} (secret key '{key}')")))?;
            let value = String::from_utf8(value.clone())
                .map_err(|_| ConvergenceError::MissingVariable(format!("{variable} (secret key '{key}' is not UTF-8)")))?;
            env.insert(variable, value);
        }
        Ok(env)
    }

    /// Add a variable; the `TF_VAR_` prefix is applied when missing
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = if name.starts_with(VARIABLE_PREFIX) {
            name.to_string()
        } else {
            format!("{VARIABLE_PREFIX}{name}")
        };
        self.vars.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for VariablesEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariablesEnvironment")
            .field("names", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> BTreeMap<String, Vec<u8>> {
        BTreeMap::from([
            ("accessKeyID".to_string(), b"AKID".to_vec()),
            ("accessKeySecret".to_string(), b"s3cr3t".to_vec()),
        ])
    }

    #[test]
    fn test_from_secret_data_prefixes_variables() {
        let env = VariablesEnvironment::from_secret_data(
            &secret(),
            &[("ACCESS_KEY_ID", "accessKeyID"), ("ACCESS_KEY_SECRET", "accessKeySecret")],
        )
        .unwrap();
        assert_eq!(env.get("TF_VAR_ACCESS_KEY_ID"), Some("AKID"));
        assert_eq!(env.get("TF_VAR_ACCESS_KEY_SECRET"), Some("s3cr3t"));
    }

    #[test]
    fn test_missing_secret_key_is_an_error() {
        let result = VariablesEnvironment::from_secret_data(&secret(), &[("TOKEN", "token")]);
        assert!(matches!(result, Err(ConvergenceError::MissingVariable(_))));
    }

    #[test]
    fn test_debug_redacts_values() {
        let mut env = VariablesEnvironment::new();
        env.insert("ACCESS_KEY_SECRET", "s3cr3t");
        let printed = format!("{env:?}");
        assert!(printed.contains("TF_VAR_ACCESS_KEY_SECRET"));
        assert!(!printed.contains("s3cr3t"));
    }
}
