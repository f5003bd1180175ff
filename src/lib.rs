//! An `OpenID` Relying Party library for orchestrating authentication against
//! user-supplied identifiers.
//!
//! The library turns an identifier into candidate authentication requests
//! ([`build_requests`]), correlates each provider response with the request
//! that produced it, and dispatches every response exactly once
//! ([`dispatch`]), whether it arrives by full-page redirect, in a popup
//! window or in a hidden iframe ([`transport`]).
//!
//! Discovery, message signing and verification, record storage and result
//! notification are supplied by the host through the [`provider`] traits.

pub mod config;
pub mod context;
mod core;
pub mod correlation;
pub mod discovery;
pub mod dispatch;
pub mod endpoint;
mod error;
pub mod extension;
pub mod identifier;
pub mod oauth;
pub mod provider;
pub mod request;
pub mod transport;

pub use crate::context::{Behavior, Context};
pub use crate::discovery::discovery_result;
pub use crate::dispatch::{Dispatch, IncomingResponse, Outcome, Status, dispatch};
pub use crate::error::Error;
pub use crate::request::{AuthRequest, BuildRequest, Candidates, build_requests};

/// Result type for relying party operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
