use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate entity name: {0}")]
    DuplicateEntity(String),

    #[error("Invalid start position '{value}': {reason}")]
    InvalidCursor { value: String, reason: String },

    #[error("Unknown CSV dialect: {0}")]
    UnknownDialect(String),

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Cannot decode row {row} of {file} as {encoding}")]
    Decode {
        file: String,
        row: u64,
        encoding: String,
    },

    #[error("Cannot read {file}: {reason}")]
    FileAccess { file: String, reason: String },

    #[error("Malformed row {row} in {file}: {reason}")]
    RowParse { file: String, row: u64, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, TapError>;

/// How far an error reaches when it surfaces during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts the run before any extraction starts.
    Configuration,
    /// Abandons the current file; the entity moves on to the next one.
    File,
    /// Drops the current row only.
    Row,
}

impl TapError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TapError::ConfigError(_)
            | TapError::DuplicateEntity(_)
            | TapError::InvalidCursor { .. }
            | TapError::UnknownDialect(_)
            | TapError::UnknownEncoding(_) => ErrorClass::Configuration,
            TapError::RowParse { .. } => ErrorClass::Row,
            TapError::CsvError(e) => match e.kind() {
                csv::ErrorKind::Io(_) => ErrorClass::File,
                _ => ErrorClass::Row,
            },
            _ => ErrorClass::File,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }
}
