//! Error types for tuning-table persistence.
//!
//! A malformed persisted table aborts the whole load: a partially loaded
//! table would silently degrade performance without signalling why.

use thiserror::Error;

/// Errors from loading or saving a tuning-parameter table.
#[derive(Debug, Error)]
pub enum TunerError {
    /// The tuning file could not be read or written.
    #[error("I/O error on tuning file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted row does not match `key;lws_x;lws_y;lws_z`.
    #[error("malformed tuning table row at {path}:{line_no}: '{line}' (expected key;lws_x;lws_y;lws_z)")]
    Parse { path: String, line_no: usize, line: String },

    /// A JSON snapshot could not be parsed or produced.
    #[error("invalid JSON tuning snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
