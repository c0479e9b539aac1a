//! Double-write patterns and the two sides they route between.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MigratorError;

/// One of the two stores being reconciled.
///
/// Serialized as `SRC`/`DST`, which is also how inconsistency events name
/// the authoritative side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "SRC")]
    Src,
    #[serde(rename = "DST")]
    Dst,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Src => "SRC",
            Self::Dst => "DST",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Src => Self::Dst,
            Self::Dst => Self::Src,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SRC" => Ok(Self::Src),
            "DST" => Ok(Self::Dst),
            _ => Err(MigratorError::UnknownDirection {
                direction: s.to_string(),
            }),
        }
    }
}

/// Where reads and writes land while a migration is in progress.
///
/// | pattern     | reads | writes            | authoritative |
/// |-------------|-------|-------------------|---------------|
/// | `src_only`  | src   | src               | src           |
/// | `src_first` | src   | src, then dst     | src           |
/// | `dst_first` | dst   | dst, then src     | dst           |
/// | `dst_only`  | dst   | dst               | dst           |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    #[default]
    SrcOnly,
    SrcFirst,
    DstFirst,
    DstOnly,
}

impl Pattern {
    pub const ALL: [Pattern; 4] = [
        Pattern::SrcOnly,
        Pattern::SrcFirst,
        Pattern::DstFirst,
        Pattern::DstOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SrcOnly => "src_only",
            Self::SrcFirst => "src_first",
            Self::DstFirst => "dst_first",
            Self::DstOnly => "dst_only",
        }
    }

    /// The side every call executes on first and whose outcome is returned.
    pub fn primary(self) -> Side {
        match self {
            Self::SrcOnly | Self::SrcFirst => Side::Src,
            Self::DstOnly | Self::DstFirst => Side::Dst,
        }
    }

    /// The best-effort replication side, if this pattern double-writes.
    pub fn secondary(self) -> Option<Side> {
        match self {
            Self::SrcFirst => Some(Side::Dst),
            Self::DstFirst => Some(Side::Src),
            Self::SrcOnly | Self::DstOnly => None,
        }
    }

    /// The side a validation run launched under this pattern treats as base.
    pub fn authoritative(self) -> Side {
        self.primary()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| MigratorError::UnknownPattern {
                pattern: s.to_string(),
            })
    }
}
