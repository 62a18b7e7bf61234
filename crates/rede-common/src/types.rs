//! Shared domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

/// A target jurisdiction: a two-letter uppercase US state code (e.g. `CA`).
///
/// Used both as a record-filter value and as a destination-key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JurisdictionCode(String);

impl JurisdictionCode {
    /// Parse and validate a jurisdiction code.
    ///
    /// The token must be exactly two ASCII uppercase letters. Codes are
    /// compared byte-for-byte against record fields, so no case folding is
    /// applied here or anywhere downstream.
    pub fn new(raw: &str) -> Result<Self> {
        let token = raw.trim();
        if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(PipelineError::Config(format!(
                "invalid jurisdiction code '{}': expected two uppercase letters",
                raw
            )));
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JurisdictionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JurisdictionCode {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<JurisdictionCode> for String {
    fn from(code: JurisdictionCode) -> Self {
        code.0
    }
}

/// What to do with the original downloaded artifact after its job completes.
///
/// Validated at configuration-load time; defaults to `Delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispositionPolicy {
    /// Relocate into the processed-artifacts area, removing it from staging.
    Move,
    /// Duplicate into the processed-artifacts area and remove from staging.
    Copy,
    /// Remove from staging without retention.
    #[default]
    Delete,
}

impl fmt::Display for DispositionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispositionPolicy::Move => write!(f, "move"),
            DispositionPolicy::Copy => write!(f, "copy"),
            DispositionPolicy::Delete => write!(f, "delete"),
        }
    }
}
