//! Inconsistency events emitted by the validator and consumed by the fixer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Side;

/// What kind of divergence was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InconsistentEventType {
    /// Base has the record, target does not.
    #[serde(rename = "target_missing")]
    TargetMissing,
    /// Both have it but content differs.
    #[serde(rename = "neq")]
    NotEqual,
    /// Target has the record, base does not.
    #[serde(rename = "base_missing")]
    BaseMissing,
}

impl InconsistentEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TargetMissing => "target_missing",
            Self::NotEqual => "neq",
            Self::BaseMissing => "base_missing",
        }
    }
}

impl fmt::Display for InconsistentEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One divergent record, tagged with the side to repair from.
///
/// Wire form: `{"Id":5,"Direction":"SRC","Type":"target_missing"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InconsistentEvent {
    pub id: i64,
    /// The authoritative side.
    pub direction: Side,
    #[serde(rename = "Type")]
    pub kind: InconsistentEventType,
}

impl InconsistentEvent {
    pub fn new(id: i64, direction: Side, kind: InconsistentEventType) -> Self {
        Self {
            id,
            direction,
            kind,
        }
    }
}
