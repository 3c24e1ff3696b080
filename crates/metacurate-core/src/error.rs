//! Batch error taxonomy and non-fatal warnings.

use thiserror::Error;

use crate::entity::MetaId;
use crate::finder::FinderError;
use metacurate_counter::CounterError;

/// Fatal batch errors. Any of these aborts the batch before an action log
/// is emitted; the Curator never partially commits.
#[derive(Error, Debug)]
pub enum CuratorError {
    #[error("row {row}: identifiers name two distinct existing entities {a} and {b}")]
    MergeConflict { row: usize, a: MetaId, b: MetaId },

    #[error("row {row}: omid {omid} does not exist in the triplestore")]
    UnknownOmid { row: usize, omid: MetaId },

    #[error("row {row}: conflicting {field}: {detail}")]
    DataConflict {
        row: usize,
        field: &'static str,
        detail: String,
    },

    #[error("row {row}: volume or issue supplied without any venue")]
    VenueRequired { row: usize },

    #[error("triplestore unavailable: {0}")]
    Network(#[from] FinderError),

    #[error("counter failure: {0}")]
    Counter(#[from] CounterError),
}

impl CuratorError {
    /// Stable machine-readable kind for logs and exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            CuratorError::MergeConflict { .. } => "merge_conflict",
            CuratorError::UnknownOmid { .. } => "unknown_omid",
            CuratorError::DataConflict { .. } => "data_conflict",
            CuratorError::VenueRequired { .. } => "venue_required",
            CuratorError::Network(_) => "network_unavailable",
            CuratorError::Counter(_) => "network_unavailable",
        }
    }
}

/// Non-fatal findings surfaced alongside the curated batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    InvalidIdentifier,
    AmbiguousAuthor,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::InvalidIdentifier => "invalid_identifier",
            WarningKind::AmbiguousAuthor => "ambiguous_author",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub row: usize,
    pub kind: WarningKind,
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}: {}", self.row, self.kind.as_str(), self.message)
    }
}
