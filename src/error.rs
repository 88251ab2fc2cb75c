use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::SnpFormat;

#[derive(Debug, Error, Diagnostic)]
pub enum SnpError {
    #[error("there is already a SNP set named {0}; delete it first")]
    #[diagnostic(help("run `snp-import delete <set>` before importing it again"))]
    DuplicateSet(String),

    #[error("unknown SNP type in manifest: {0}")]
    UnsupportedFormat(String),

    #[error("SNP format not implemented yet: {0}")]
    NotImplemented(SnpFormat),

    #[error("no SNP set named {0}")]
    SetNotFound(String),

    #[error("invalid set name: {0}")]
    InvalidSetName(String),

    #[error("record {record} could not be normalized: {source}")]
    Normalization {
        record: u64,
        #[source]
        source: NormalizeError,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid package manifest: {0}")]
    Manifest(String),

    #[error("failed to extract package: {0}")]
    Archive(String),

    #[error("failed to read SNP records: {0}")]
    Source(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("import cancelled")]
    Cancelled,
}

impl From<rusqlite::Error> for SnpError {
    fn from(err: rusqlite::Error) -> Self {
        SnpError::Storage(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),

    #[error("field {field} has invalid value {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid coordinates start={start} end={end}")]
    InvalidCoordinates { start: i64, end: i64 },
}
