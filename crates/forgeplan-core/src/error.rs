use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("malformed COPY header ({reason}): {line:?}")]
    CopyHeader { reason: &'static str, line: String },

    #[error("COPY row column mismatch for table={table}: expected {expected} fields, got {got}")]
    CopyColumnMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("missing or invalid column {column:?} in table {table:?}")]
    RowField { table: String, column: String },

    #[error("unexpected array literal: {raw:?}")]
    ArrayLiteral { raw: String },

    #[error("could not find :backup_id: in {path:?}")]
    MissingBackupId { path: PathBuf },

    #[error("expected db/database.sql.gz (or db/database.sql) under {backup_root:?}")]
    MissingDump { backup_root: PathBuf },

    #[error("no group namespace found with path {path:?}")]
    RootGroupNotFound { path: String },

    #[error("did not find any projects; unable to derive descendant group set")]
    NoProjects,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlanError>;

impl From<serde_json::Error> for PlanError {
    fn from(e: serde_json::Error) -> Self {
        PlanError::Serialization(e.to_string())
    }
}
