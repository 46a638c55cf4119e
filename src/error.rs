//! Error taxonomy for the chunked I/O and reduction engine.

use thiserror::Error;

/// The crate-wide error type.
///
/// Every variant is surfaced to the caller; the engine never retries on its
/// own (retry, if wanted, is the caller's responsibility).
#[derive(Debug, Error)]
pub enum Error {
    /// Bad URI, missing variable name, unsupported `method`, conflicting
    /// `valid_range`/`valid_min`/`valid_max`, or an out-of-range selection.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The file or object named by a URI does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A feature named by the request is recognized but not implemented,
    /// e.g. a non-null `compression`/`filters` sent to the remote reducer,
    /// or an unknown HDF5 filter ID.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The active-storage server responded with a non-2xx status.
    #[error("remote reduction failed: HTTP {status}: {body}")]
    RemoteReductionFailure {
        /// The HTTP status code returned by the server.
        status: u16,
        /// The decoded error body, or `"-"` if it could not be decoded.
        body: String,
    },

    /// A connect timeout, DNS failure, TLS error, or other I/O error
    /// occurred while talking to storage or the active-storage server.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Compressed/filtered bytes did not round-trip, or a response body's
    /// length was inconsistent with its declared shape and dtype.
    #[error("decode failure: {0}")]
    DecodeFailure(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            _ => Error::TransportFailure(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TransportFailure(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DecodeFailure(err.to_string())
    }
}
