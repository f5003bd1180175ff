//! # Relying Party Provider
//!
//! Traits implemented by the host to supply the collaborators the library
//! relies on: discovery, the trusted message channel, dispatch record
//! storage and result notification.

use std::collections::BTreeMap;
use std::future::Future;

pub use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AssociationPreference;
use crate::dispatch::{DispatchRecord, Status};
use crate::endpoint::ProviderEndpoint;
use crate::identifier::Identifier;
use crate::request::IndirectMessage;

/// Relying Party Provider trait.
pub trait Provider: Discovery + Channel + DispatchStore + Callback + Clone {}

/// Discovery failures. "Not found" is distinguished from transport failures
/// because it is not an error for request construction.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The identifier resolved, but no provider endpoints were found.
    #[error("no provider endpoints found")]
    NotFound,

    /// Discovery could not be completed.
    #[error("discovery transport failure: {0}")]
    Transport(String),
}

/// `Discovery` resolves a user-supplied identifier to provider endpoints.
pub trait Discovery: Send + Sync {
    /// Discover the provider endpoints for `identifier`, in discovery order.
    fn discover(
        &self, identifier: &Identifier,
    ) -> impl Future<Output = Result<Vec<ProviderEndpoint>, DiscoveryError>> + Send;
}

/// The verdict reached by the channel when verifying an assertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Verdict {
    /// A valid positive assertion.
    Authenticated,

    /// The user canceled.
    Canceled,

    /// The assertion is negative or failed verification.
    Failed,

    /// An immediate request needs user interaction.
    SetupRequired,

    /// Neither positive nor negative.
    Unclassified,
}

/// The result of verifying an incoming message.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Verification {
    /// Channel verdict.
    pub verdict: Verdict,

    /// Verified claimed identifier, for positive assertions.
    pub claimed_identifier: Option<String>,

    /// Response nonce, for replay detection.
    pub nonce: Option<String>,

    /// Extensions present in the message, keyed by type URI.
    pub extensions: BTreeMap<String, BTreeMap<String, String>>,
}

/// `Channel` is the trusted message channel. It signs outgoing requests,
/// verifies incoming assertions and detects replayed nonces.
pub trait Channel: Send + Sync {
    /// Prepare an outgoing message, establishing or reusing an association as
    /// `association` allows.
    fn sign(
        &self, message: &mut IndirectMessage, association: AssociationPreference,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Verify an incoming message.
    fn verify(
        &self, params: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Verification>> + Send;

    /// Record `nonce` against the response `fingerprint`, returning `true` if
    /// the nonce was already used by a different response. Re-deliveries of
    /// the same response share a fingerprint and are not replays.
    fn detect_replay(
        &self, nonce: &str, fingerprint: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// `DispatchStore` holds dispatch records keyed by assertion fingerprint.
pub trait DispatchStore: Send + Sync {
    /// Retrieve the record for `fingerprint`, if any.
    fn get(&self, fingerprint: &str)
    -> impl Future<Output = Result<Option<DispatchRecord>>> + Send;

    /// Store `record` unless one already exists for its fingerprint. Returns
    /// the existing record when there is one. Check and insert must be a
    /// single atomic step.
    fn put_if_absent(
        &self, record: &DispatchRecord, expiry: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<DispatchRecord>>> + Send;
}

/// Result notification sent once per processed assertion.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Payload {
    /// Receiver of the dispatched response.
    pub id: String,

    /// Outcome status.
    pub status: Status,

    /// Claimed identifier, for authenticated outcomes.
    pub claimed_identifier: Option<String>,

    /// Index of the candidate that produced the response.
    pub index: Option<usize>,
}

/// `Callback` notifies the host of dispatched results.
pub trait Callback: Send + Sync {
    /// Notify the host of a dispatched result.
    fn callback(&self, pl: &Payload) -> impl Future<Output = Result<()>> + Send;
}
