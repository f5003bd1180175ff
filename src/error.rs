//! # Relying Party Errors
//!
//! Errors surfaced by request construction, response dispatch and the
//! out-of-band transport. Collaborator failures are wrapped as
//! [`Error::ServerError`].

use thiserror::Error;

/// Relying Party error codes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The user-supplied identifier could not be parsed or normalized.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The realm (trust root) is malformed, cannot be resolved, or does not
    /// cover the return URL.
    #[error("invalid realm: {0}")]
    InvalidRealm(String),

    /// A provider endpoint is not an absolute HTTP or HTTPS URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Discovery failed with a transport or protocol error. "No endpoints
    /// found" is not an error and yields an empty candidate sequence.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The endpoint advertises none of the known protocol service types.
    #[error("unknown protocol version for endpoint {0}")]
    VersionUnknown(String),

    /// An incoming or handed-back response cannot be used.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A correlation entry or callback argument was attached twice.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// An assertion was neither positive, negative, setup-required nor
    /// extensions-only. Fatal: signals an inconsistent verifier.
    #[error("unexpected assertion classification: {0}")]
    UnexpectedClassification(String),

    /// A client script extension collides with an existing registration.
    #[error("extension collision: {0}")]
    ExtensionCollision(String),

    /// The token manager does not hold the requested token.
    #[error("token not found: {0}")]
    TokenNotFound(String),

    /// A collaborator encountered an unexpected condition.
    #[error("server error: {0}")]
    ServerError(String),
}
