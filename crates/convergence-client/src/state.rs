//! Engine state outputs and the tagged lookup result

use crate::error::ConvergenceError;
use std::collections::BTreeMap;

/// Named outputs read from the state of the last successful apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateOutputs(BTreeMap<String, String>);

impl StateOutputs {
    pub fn new(outputs: BTreeMap<String, String>) -> Self {
        Self(outputs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Output value, or `InvalidState` when the engine did not return it
    pub fn require(&self, name: &str) -> Result<&str, ConvergenceError> {
        self.get(name)
            .ok_or_else(|| ConvergenceError::InvalidState(format!("output '{name}' missing from state")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StateOutputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Result of a state query
///
/// `NotFound` means no matching prior output exists (for instance no apply
/// has ever succeeded); it is distinct from a failure of the query itself.
#[derive(Debug)]
pub enum StateLookup<T> {
    Found(T),
    NotFound,
    Error(ConvergenceError),
}

impl<T> StateLookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, StateLookup::Found(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateLookup::NotFound)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StateLookup<U> {
        match self {
            StateLookup::Found(value) => StateLookup::Found(f(value)),
            StateLookup::NotFound => StateLookup::NotFound,
            StateLookup::Error(e) => StateLookup::Error(e),
        }
    }

    /// Collapse into `Result<Option<T>>`, treating `NotFound` as `None`
    pub fn into_option(self) -> Result<Option<T>, ConvergenceError> {
        match self {
            StateLookup::Found(value) => Ok(Some(value)),
            StateLookup::NotFound => Ok(None),
            StateLookup::Error(e) => Err(e),
        }
    }
}

impl<T> From<Result<Option<T>, ConvergenceError>> for StateLookup<T> {
    fn from(result: Result<Option<T>, ConvergenceError>) -> Self {
        match result {
            Ok(Some(value)) => StateLookup::Found(value),
            Ok(None) => StateLookup::NotFound,
            Err(e) => StateLookup::Error(e),
        }
    }
}

/// Extract the requested outputs from a Terraform state document
///
/// Returns `NotFound` when any requested output is absent. String outputs are
/// taken verbatim; other JSON values are rendered as compact JSON.
pub fn parse_state_outputs(state: &[u8], names: &[&str]) -> StateLookup<StateOutputs> {
    let document: serde_json::Value = match serde_json::from_slice(state) {
        Ok(document) => document,
        Err(e) => return StateLookup::Error(ConvergenceError::Serialization(e)),
    };
    let Some(outputs) = document.get("outputs") else {
        return StateLookup::NotFound;
    };
    let Some(outputs) = outputs.as_object() else {
        return StateLookup::Error(ConvergenceError::InvalidState(
            "'outputs' is not an object".to_string(),
        ));
    };

    let mut found = BTreeMap::new();
    for name in names {
        let Some(value) = outputs.get(*name).and_then(|o| o.get("value")) else {
            return StateLookup::NotFound;
        };
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        found.insert((*name).to_string(), rendered);
    }
    StateLookup::Found(StateOutputs(found))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE: &str = r#"{
        "version": 4,
        "terraform_version": "1.5.7",
        "outputs": {
            "vpc_id": {"value": "vpc-123", "type": "string"},
            "zone_count": {"value": 3, "type": "number"}
        },
        "resources": []
    }"#;

    #[test]
    fn test_parse_found_outputs() {
        let outputs = parse_state_outputs(STATE.as_bytes(), &["vpc_id", "zone_count"])
            .into_option()
            .unwrap()
            .unwrap();
        assert_eq!(outputs.get("vpc_id"), Some("vpc-123"));
        assert_eq!(outputs.get("zone_count"), Some("3"));
    }

    #[test]
    fn test_missing_output_is_not_found() {
        let lookup = parse_state_outputs(STATE.as_bytes(), &["vpc_id", "bucketName"]);
        assert!(lookup.is_not_found());
    }

    #[test]
    fn test_state_without_outputs_is_not_found() {
        let lookup = parse_state_outputs(br#"{"version": 4}"#, &["vpc_id"]);
        assert!(lookup.is_not_found());
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let lookup = parse_state_outputs(b"{not json", &["vpc_id"]);
        assert!(matches!(lookup, StateLookup::Error(ConvergenceError::Serialization(_))));
    }

    #[test]
    fn test_require_reports_missing_output() {
        let outputs: StateOutputs = [("bucketName", "b")].into_iter().collect();
        assert_eq!(outputs.require("bucketName").unwrap(), "b");
        assert!(outputs.require("storageEndpoint").is_err());
    }
}
