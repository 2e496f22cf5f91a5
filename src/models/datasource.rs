//! Datasource identity and status models.

use crate::models::BackendKind;
use serde::{Deserialize, Serialize};

/// Identifier of one registry slot.
///
/// Id 0 is the primary datasource, id 1 the secondary used for comparisons,
/// id 2 conventionally holds backups. Any other value is ad hoc.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DatasourceId(pub u32);

impl DatasourceId {
    pub const PRIMARY: Self = Self(0);
    pub const SECONDARY: Self = Self(1);
    pub const BACKUP: Self = Self(2);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// One-based number used in environment variable and default key names.
    pub const fn ordinal(self) -> u32 {
        self.0 + 1
    }
}

impl From<u32> for DatasourceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DatasourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Information about a datasource, returned after successful init.
#[derive(Debug, Clone, Serialize)]
pub struct DatasourceInfo {
    pub id: DatasourceId,
    /// Selection key the host descriptor was resolved from.
    pub key: String,
    pub kind: BackendKind,
    pub db_name: String,
    pub server_version: Option<String>,
}

/// Datasource listing entry (no secrets exposed).
#[derive(Debug, Clone, Serialize)]
pub struct DatasourceSummary {
    pub id: DatasourceId,
    pub key: String,
    pub kind: BackendKind,
    pub db_name: String,
    /// True once the memoized default mapper has been built.
    pub mapper_built: bool,
    pub closed: bool,
}

/// Result of a primary/secondary swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapOutcome {
    Swapped,
    /// Id 1 was absent or not fully initialized; nothing changed.
    SecondaryNotSet,
}

impl SwapOutcome {
    pub fn is_swapped(&self) -> bool {
        matches!(self, Self::Swapped)
    }
}

impl std::fmt::Display for SwapOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Swapped => write!(f, "switch of data sources successful"),
            Self::SecondaryNotSet => write!(f, "data source 2 not set"),
        }
    }
}
