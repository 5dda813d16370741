use thiserror::Error;

/// Classification of an `Error`, independent of its specific variant. This
/// is the taxonomy from spec §7: it drives retry policy in the Worker and
/// the CLI exit code at the admin surface, the way `meilisearch_types::Code`
/// drives HTTP status there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad source, unsupported MIME, impossible options. Never retried.
    Validation,
    /// Network / adapter temporarily unavailable. Retried with backoff.
    Transient,
    /// Extractor hard failure or timeout. Record -> Failed, job retries to ceiling.
    Extraction,
    /// Detected by `verify_consistency` or a violated step precondition.
    Consistency,
    /// Cooperative cancellation; durable state left recoverable.
    Cancellation,
    /// Invariant I2 or I5 violated at runtime. No auto-repair.
    FatalInvariant,
}

impl ErrorKind {
    /// CLI exit code per spec §6.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::Transient | ErrorKind::Extraction => 3,
            ErrorKind::Consistency => 4,
            ErrorKind::Cancellation => 0,
            ErrorKind::FatalInvariant => 5,
        }
    }

    /// Whether the Worker should retry a job that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Extraction)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid source: {0}")]
    InvalidSource(String),
    #[error("unsupported mime type: {0}")]
    UnsupportedMime(String),
    #[error("invalid processing options: {0}")]
    InvalidOptions(String),

    #[error("extraction timed out after {0:?}")]
    ExtractionTimeout(std::time::Duration),
    #[error("extraction unsupported: {0}")]
    ExtractionUnsupported(String),
    #[error("extraction upstream error: {0}")]
    ExtractionUpstream(String),

    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("vectorizer error: {0}")]
    VectorizerError(String),

    #[error("consistency violation for doc {doc_id}: {detail}")]
    Consistency { doc_id: String, detail: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("fatal invariant breach: {0}")]
    FatalInvariant(String),

    #[error(transparent)]
    Heed(#[from] heed::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSource(_) | Error::UnsupportedMime(_) | Error::InvalidOptions(_) => {
                ErrorKind::Validation
            }
            Error::ExtractionTimeout(_)
            | Error::ExtractionUnsupported(_)
            | Error::ExtractionUpstream(_) => ErrorKind::Extraction,
            Error::AdapterUnavailable(_) | Error::VectorizerError(_) => ErrorKind::Transient,
            Error::Consistency { .. } => ErrorKind::Consistency,
            Error::Cancelled => ErrorKind::Cancellation,
            Error::FatalInvariant(_) => ErrorKind::FatalInvariant,
            Error::Heed(_) | Error::Io(_) | Error::Serde(_) => ErrorKind::Transient,
        }
    }
}
