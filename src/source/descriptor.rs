//! Serializable source descriptors.
//!
//! A [`SourceDescriptor`] records which backend opened a source and with what
//! arguments, so "which source produced these pixels" can be persisted and
//! later replayed through [`crate::source::BackendRegistry::open_descriptor`]
//! without persisting any pixel data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Backend tag plus constructor arguments for one source.
///
/// Arguments use a sorted map so serialization is stable, which keeps the
/// derived source id stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// [`crate::source::BackendBuilder::tag`] of the backend that opened it
    pub backend: String,

    /// The locator handed to the backend (path, URL)
    pub locator: String,

    /// Backend-specific open arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(backend: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            locator: locator.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Stable identity for cache keys: two opens of the same image share
    /// tile identities, two differently-parameterized opens do not.
    pub fn source_id(&self) -> String {
        if self.args.is_empty() {
            self.locator.clone()
        } else {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("{}?{}", self.locator, args.join("&"))
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.backend, self.source_id())
    }
}

// =============================================================================
// Tests
// =============================================================================
