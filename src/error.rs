use thiserror::Error;

/// Reason a single raw record could not be normalized.
/// Scoped to one record: a batch keeps going and reports the index.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecord {
    #[error("unknown protocol \"{0}\"")]
    UnknownProtocol(String),

    #[error("negative packet length {0}")]
    NegativeLength(i64),

    #[error("packet length {0} does not fit in 32 bits")]
    LengthOverflow(i64),

    #[error("{field} {value} outside [0, 65535]")]
    PortOutOfRange { field: &'static str, value: i64 },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] MalformedRecord),

    #[error("feature schema has no columns")]
    EmptySchema,

    #[error("batch is empty")]
    EmptyBatch,

    #[error("no model has been fitted or loaded")]
    UnfittedModel,

    #[error("row {row} does not conform to the model schema: {reason}")]
    SchemaMismatch { row: usize, reason: String },

    #[error("duplicate feature column \"{0}\"")]
    DuplicateColumn(String),

    #[error("{features} feature rows but {labels} labels")]
    LabelCountMismatch { features: usize, labels: usize },

    #[error("trend window capacity must be at least 1")]
    ZeroCapacity,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model artifact error: {0}")]
    Artifact(String),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::Artifact(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
