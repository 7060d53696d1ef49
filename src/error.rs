//! Error types for the MCP server.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// MCP server errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Tool not found.
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Malformed request (missing URI segment, missing arguments).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// AnkiConnect answered with an error string.
    #[error("anki error: {0}")]
    Backend(String),

    /// AnkiConnect could not be reached.
    #[error("anki connection error: {0}")]
    Http(#[from] reqwest::Error),

    /// AnkiConnect answered with a body that is not JSON.
    #[error("undecodable anki response: {0}")]
    Decode(String),

    /// Some answers in a batch were rejected.
    #[error("failed to update cards: {}", join_ids(.0))]
    CardsRejected(Vec<i64>),

    /// The target deck could not be provisioned.
    #[error("deck unavailable: {0}")]
    DeckUnavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::ToolNotFound(_) => codes::METHOD_NOT_FOUND,
            Error::InvalidParams(_) => codes::INVALID_PARAMS,
            Error::InvalidRequest(_) => codes::INVALID_REQUEST,
            Error::Backend(_) => -32001,
            Error::Http(_) => -32002,
            Error::Decode(_) => -32003,
            Error::CardsRejected(_) => -32004,
            Error::DeckUnavailable(_) => -32005,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::Io(_) => -32006,
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}
