//! Error types for the REDCap API client.
//!
//! # Design
//! Every failure surfaces as a distinct, matchable variant; nothing is
//! swallowed and nothing is retried. `ConfigMismatch` gets its own variant
//! because a wrong `username` in the spec would otherwise read as a silent
//! false negative during access validation — callers must be able to tell
//! "user not in project" apart from "user found but lacking access."

use thiserror::Error;

use crate::types::ExportAccess;

/// Errors returned by spec construction, request building, transport, and
/// response parsing.
#[derive(Debug, Error)]
pub enum RedcapError {
    /// The spec failed fail-fast validation at construction time.
    #[error("invalid redcap spec: {0}")]
    InvalidSpec(String),

    /// The REDCap server could not be reached or the connection broke.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the token (HTTP 401/403).
    #[error("token rejected: HTTP {status}: {message}")]
    Auth { status: u16, message: String },

    /// The spec's username is not among the users returned for the token.
    #[error("username [{0}] not found in the REDCap project")]
    ConfigMismatch(String),

    /// The user exists but lacks Full Data Set export access.
    #[error("user [{username}] does not have Full Data Set export access (has {access:?})")]
    InsufficientAccess {
        username: String,
        access: ExportAccess,
    },

    /// The server answered with a status outside the expected/auth families.
    #[error("unexpected response: HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A payload could not be serialized, or a response body could not be
    /// decoded into the expected shape.
    #[error("malformed API payload: {0}")]
    Protocol(String),

    /// The caller's deadline elapsed before a response was received. The
    /// in-flight request is aborted and no partial state remains.
    #[error("request cancelled before completion")]
    Cancelled,
}
