/*!

  Error types shared across the library and fuzzing crate.

*/

use thiserror::Error;

/// The unified error type for netlist construction, mutation and (de)serialization.
#[derive(Debug, Error)]
pub enum Error {
    /// A cell name was not found in the library.
    #[error("unknown cell: {0}")]
    UnknownCell(String),

    /// A weighted or filtered pick was attempted over an empty candidate set.
    #[error("no candidate satisfies the request: {0}")]
    NoCandidate(String),

    /// A library entry, buffer request, or slice target was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A JSON snapshot referenced a net id that was never declared.
    #[error("net not found: {0}")]
    NetNotFound(crate::types::Id),

    /// A module id was referenced but never declared.
    #[error("module not found: {0}")]
    ModuleNotFound(crate::types::Id),

    /// Reading or writing a settings, library, or snapshot file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A library or settings file failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// A JSON snapshot failed to parse or serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
