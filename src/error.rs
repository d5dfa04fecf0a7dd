use thiserror::Error;

/// Network or HTTP-level failure for a single GET
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("GET {url} returned {status} {reason}")]
    Status {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Markup that could not be interpreted the way the adapter expects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },

    #[error("empty document at {url}")]
    EmptyDocument { url: String },

    #[error("invalid url `{url}`: {message}")]
    Url { url: String, message: String },
}

/// A required field could not be located on a detail page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("required field `{field}` missing at {url}")]
pub struct ExtractionError {
    pub field: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure on an index page. Ends the walk for the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure on a detail page. Recovered per listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}
