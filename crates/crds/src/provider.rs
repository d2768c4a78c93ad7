//! Cloud provider tags

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider tag selecting the capability set used for a cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Alibaba Cloud (VPC + OSS)
    #[default]
    #[serde(alias = "Alicloud")]
    Alicloud,
}

impl ProviderKind {
    /// Lowercase provider name, as used in template identifiers
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Alicloud => "alicloud",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
