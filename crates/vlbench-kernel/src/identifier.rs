//! Model identifiers
//!
//! A [`ModelIdentifier`] is an opaque, case-sensitive `namespace/name` string.
//! It is used verbatim as the registry key and the synthesis cache key, and in
//! normalized form as the name of a persisted adapter unit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every persisted adapter unit name
pub const UNIT_PREFIX: &str = "adapter_";

/// Character substituted for anything that is not valid in a unit name
pub const UNIT_PLACEHOLDER: char = '_';

/// Opaque model identifier (`namespace/name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelIdentifier(String);

impl ModelIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the first `/`, if the identifier has one
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once('/').map(|(ns, _)| ns)
    }

    /// Part after the first `/`, or the whole identifier
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or(&self.0)
    }

    /// Deterministic unit name for a synthesized adapter.
    ///
    /// Every character outside `[A-Za-z0-9_]` becomes [`UNIT_PLACEHOLDER`], so
    /// `vendor/new-model.v2` maps to `adapter_vendor_new_model_v2`.
    pub fn unit_name(&self) -> String {
        let normalized: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    UNIT_PLACEHOLDER
                }
            })
            .collect();
        format!("{UNIT_PREFIX}{normalized}")
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelIdentifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModelIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ModelIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
