use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced when reading or writing a document.
pub enum DocumentError {
    #[error("JSON error: {0}")]
    /// The input was not valid JSON, or the document could not be encoded.
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
/// Errors produced when applying a patch list.
pub enum PatchError {
    #[error("patch path is empty")]
    /// A patch had no path segments.
    EmptyPath,

    #[error("path not found: {0}")]
    /// A path segment did not resolve to an existing value.
    PathNotFound(String),

    #[error("invalid array index '{segment}' at {path}")]
    /// An array was addressed with a segment that is not a usable index.
    InvalidIndex {
        /// The offending segment.
        segment: String,
        /// The full patch path, `/`-joined.
        path: String,
    },

    #[error("{op} patch at {path} has no value")]
    /// An `add`/`replace` patch was missing its value.
    MissingValue {
        /// The patch operation.
        op: &'static str,
        /// The full patch path, `/`-joined.
        path: String,
    },

    #[error("patched document is invalid: {0}")]
    /// The patched JSON no longer describes a document.
    InvalidDocument(#[from] serde_json::Error),
}
