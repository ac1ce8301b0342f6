//! Serializable cassette types.
//!
//! A cassette is one JSON document: the captured calls in the order they
//! happened plus the time the recording finished.

use crate::errors::TapedeckError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedCall {
    pub target_id: String,
    pub arg_key: Value,
    pub return_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cassette {
    pub calls: Vec<CapturedCall>,
    pub recorded_at_unix_ns: u64,
}

impl Cassette {
    pub fn new(calls: Vec<CapturedCall>, recorded_at_unix_ns: u64) -> Self {
        Self {
            calls,
            recorded_at_unix_ns,
        }
    }

    /// Distinct target ids, sorted.
    pub fn targets(&self) -> Vec<String> {
        self.calls
            .iter()
            .map(|c| c.target_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// All calls for one target, in recording order.
    pub fn calls_for(&self, target_id: &str) -> Vec<&CapturedCall> {
        self.calls
            .iter()
            .filter(|c| c.target_id == target_id)
            .collect()
    }
}

/// A validated cassette identifier, safe to use as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CassetteName(String);

impl CassetteName {
    /// Accepts plain names (`fetch-user`) and symbolic names (`:fetch-user`).
    pub fn parse(raw: &str) -> Result<Self, TapedeckError> {
        let name = raw.strip_prefix(':').unwrap_or(raw);
        if name.is_empty() {
            return Err(TapedeckError::InvalidCassetteName(format!(
                "{raw:?} is empty"
            )));
        }
        if name.starts_with('.') {
            return Err(TapedeckError::InvalidCassetteName(format!(
                "{raw:?} must not start with '.'"
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(TapedeckError::InvalidCassetteName(format!(
                "{raw:?} contains {bad:?}"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CassetteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
