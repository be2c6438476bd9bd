use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaybriefError {
    /// Store unreachable while loading sources. Fatal; no branch starts.
    #[error("Source store unavailable: {0}")]
    SourceUnavailable(String),

    /// Network error, HTTP 5xx, timeout, or 429 from a content provider.
    #[error("Transient provider error: {0}")]
    ProviderTransient(String),

    /// Auth failure, non-429 4xx, or malformed provider response.
    #[error("Provider error: {0}")]
    ProviderFatal(String),

    /// Extractor output violating the candidate invariants.
    #[error("Malformed extractor output: {0}")]
    ExtractorMalformed(String),

    /// Retriable store failure.
    #[error("Transient store error: {0}")]
    StoreTransient(String),

    /// Unique-constraint collision during insert. Not a failure: the
    /// caller re-reads and takes the increment path.
    #[error("Store conflict on insert: {0}")]
    StoreConflict(String),

    /// Whole-run deadline fired. Branches cancel; synthesis proceeds.
    #[error("Run deadline exceeded")]
    RunDeadlineExceeded,

    /// Store read failed during synthesis after retries. Fatal.
    #[error("Synthesis failed: {0}")]
    SynthesizeFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DaybriefError {
    /// Whether the retry policy applies.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DaybriefError::ProviderTransient(_) | DaybriefError::StoreTransient(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DaybriefError>;
