//! Batch I/O: CSV rows in, curated CSV rows and a JSON-lines action log out.

use thiserror::Error;

pub mod csv_rows;
pub mod log_writer;

pub use csv_rows::{read_rows, read_rows_from_path, write_rows, write_rows_to_path};
pub use log_writer::{write_action_log, write_action_log_to_path};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required column {0:?} in header")]
    MissingColumn(&'static str),

    #[error("row {row}: type {kind:?} is a container and cannot stand alone")]
    ForbiddenLeafType { row: usize, kind: String },

    #[error("action log serialisation: {0}")]
    Json(#[from] serde_json::Error),
}
