//! # Response Dispatch
//!
//! Dispatch maps an incoming provider response to exactly one outcome and
//! fires the matching side effect exactly once, no matter how many times, or
//! by how many transports, the same response is delivered.
//!
//! A response is recognized by the presence of `openid.mode`. Its correlation
//! state is recovered and checked against the current context's receiver, the
//! raw parameters are fingerprinted, and the fingerprint is looked up before
//! anything else happens. Only when the response has not been seen is it
//! verified by the channel, its correlation state compared with the copy in
//! the signed `openid.return_to`, and classified. Nonces are checked against
//! the fingerprint, so twin deliveries of one response racing each other are
//! not mistaken for replays. The record is then stored with a single atomic
//! `put_if_absent`; only the caller whose insert succeeded fires the
//! callback.

mod persist;
mod record;

use std::collections::BTreeMap;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;
use url::Url;

pub use self::persist::{PERSISTENT_IDENTIFIER_COOKIE, PersistentIdentifier};
pub use self::record::{DispatchRecord, Expire, MemoryStore};
use crate::config::LogOnPersistence;
use crate::context::Context;
use crate::correlation::{CorrelationState, Found, key};
use crate::extension::ExtensionRegistry;
use crate::provider::{Callback, Channel, DispatchStore, Payload, Provider, Verdict, Verification};
use crate::transport::HAND_BACK_PARAM;
use crate::{Error, Result};

/// The parameter identifying a provider response.
pub const MODE_PARAM: &str = "openid.mode";

/// The signed return URL of a response.
pub const RETURN_TO_PARAM: &str = "openid.return_to";

/// Outcome status of a processed response.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Status {
    /// A verified positive assertion.
    Authenticated,

    /// The user canceled at the provider.
    Canceled,

    /// A negative or unverifiable assertion.
    Failed,

    /// An immediate request needs user interaction.
    SetupRequired,

    /// No positive or negative verdict, but recognized extensions are
    /// present.
    ExtensionsOnly,
}

/// The outcome of processing a response.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Outcome status.
    pub status: Status,

    /// Verified claimed identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_identifier: Option<String>,

    /// Identifier as the user typed it, echoed in correlation state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_supplied_identifier: Option<String>,

    /// Provider endpoint the request was sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_endpoint: Option<String>,

    /// Index of the candidate that produced the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Requested log on persistence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<LogOnPersistence>,

    /// Registered extensions present in the response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl Outcome {
    /// An outcome with `status` and nothing else.
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            claimed_identifier: None,
            user_supplied_identifier: None,
            provider_endpoint: None,
            index: None,
            persistence: None,
            extensions: Vec::new(),
        }
    }
}

/// Result of offering a response to [`dispatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The request carries no provider response.
    NoResponse,

    /// The response belongs to another receiver. Nothing was changed.
    NotForMe,

    /// The response was processed by this call. Side effects have fired.
    Processed(Outcome),

    /// The response was already processed. The recorded outcome is returned
    /// and no side effect fires.
    Duplicate(Outcome),
}

impl Dispatch {
    /// The outcome, for processed and duplicate responses.
    #[must_use]
    pub const fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Processed(outcome) | Self::Duplicate(outcome) => Some(outcome),
            Self::NoResponse | Self::NotForMe => None,
        }
    }
}

/// An incoming HTTP request that may carry a provider response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingResponse {
    url: Url,
    form: BTreeMap<String, String>,
}

impl IncomingResponse {
    /// A response delivered by redirect.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            form: BTreeMap::new(),
        }
    }

    /// A response delivered by form post.
    #[must_use]
    pub fn post(url: Url, form: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            url,
            form: form.into_iter().collect(),
        }
    }

    /// The request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Posted form fields.
    #[must_use]
    pub const fn form(&self) -> &BTreeMap<String, String> {
        &self.form
    }

    /// Whether the response was handed back by an out-of-band window.
    #[must_use]
    pub fn is_hand_back(&self) -> bool {
        self.url.query_pairs().any(|(k, _)| k == HAND_BACK_PARAM)
    }

    /// Query and form parameters, form fields taking precedence. The
    /// hand-back marker is not part of the response and is excluded.
    #[must_use]
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params: BTreeMap<String, String> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != HAND_BACK_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.extend(self.form.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}

/// Fingerprint of the raw response parameters: SHA-256 over the parameters
/// in key order, base64url encoded. Identical deliveries share a
/// fingerprint whatever the transport.
#[must_use]
pub fn fingerprint(params: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in params {
        hasher.update(k.len().to_be_bytes());
        hasher.update(k.as_bytes());
        hasher.update(v.len().to_be_bytes());
        hasher.update(v.as_bytes());
    }
    Base64UrlUnpadded::encode_string(&hasher.finalize())
}

/// Dispatch an incoming response.
///
/// # Errors
///
/// Returns [`Error::UnexpectedClassification`] if the channel reaches no
/// verdict and no registered extension is present, and
/// [`Error::ServerError`] if a collaborator fails.
#[instrument(level = "debug", skip(provider))]
pub async fn dispatch(
    provider: impl Provider, context: &Context, response: &IncomingResponse,
) -> Result<Dispatch> {
    let params = response.params();
    if !params.contains_key(MODE_PARAM) {
        return Ok(Dispatch::NoResponse);
    }

    let correlation = verify(context, &params)?;
    let Some(correlation) = correlation else {
        return Ok(Dispatch::NotForMe);
    };

    process(provider, context, &params, &correlation).await
}

// Recover correlation state and check the receiver. `None` means the
// response belongs to another receiver or carries state this library cannot
// read.
fn verify(
    context: &Context, params: &BTreeMap<String, String>,
) -> Result<Option<CorrelationState>> {
    tracing::debug!("dispatch::verify");

    let correlation = match CorrelationState::find(params) {
        Found::State(correlation) => correlation,
        Found::Missing => {
            tracing::debug!("no correlation state in response");
            CorrelationState::new()
        }
        Found::Malformed => {
            tracing::debug!("undecodable correlation state in response");
            return Ok(None);
        }
    };

    if let Some(receiver) = correlation.receiver() {
        if receiver != context.receiver() {
            tracing::debug!("response is for receiver {receiver}");
            return Ok(None);
        }
    }
    Ok(Some(correlation))
}

async fn process(
    provider: impl Provider, context: &Context, params: &BTreeMap<String, String>,
    correlation: &CorrelationState,
) -> Result<Dispatch> {
    tracing::debug!("dispatch::process");

    let fingerprint = fingerprint(params);
    if let Some(record) = lookup(&provider, context, &fingerprint).await? {
        if record.processed {
            tracing::debug!("response already processed");
            return Ok(Dispatch::Duplicate(record.outcome));
        }
    }

    let verification = Channel::verify(&provider, params)
        .await
        .map_err(|e| Error::ServerError(format!("issue verifying response: {e}")))?;
    if !is_signed(params, correlation, verification.verdict) {
        tracing::warn!("correlation state differs from the signed return URL");
        return Ok(Dispatch::NotForMe);
    }
    let mut status = classify(&verification, context.extensions())?;

    if status == Status::Authenticated {
        if let Some(nonce) = &verification.nonce {
            let replayed = Channel::detect_replay(&provider, nonce, &fingerprint)
                .await
                .map_err(|e| Error::ServerError(format!("issue checking nonce: {e}")))?;
            if replayed {
                tracing::warn!("replayed nonce in positive assertion");
                status = Status::Failed;
            }
        }
    }

    let outcome = outcome(status, &verification, correlation, context.extensions());
    let record = DispatchRecord {
        fingerprint,
        processed: true,
        outcome: outcome.clone(),
        expires_at: Utc::now() + Expire::Dispatch.duration(),
    };

    // whoever stores the record first owns the side effects
    if let Some(existing) = claim(&provider, context, &record).await? {
        tracing::debug!("response processed concurrently");
        return Ok(Dispatch::Duplicate(existing.outcome));
    }

    if outcome.status == Status::Authenticated {
        for behavior in context.behaviors() {
            behavior.on_incoming_assertion(&outcome);
        }
    }

    let payload = Payload {
        id: context.receiver().to_string(),
        status: outcome.status,
        claimed_identifier: outcome.claimed_identifier.clone(),
        index: outcome.index,
    };
    Callback::callback(&provider, &payload)
        .await
        .map_err(|e| Error::ServerError(format!("issue sending notification: {e}")))?;

    Ok(Dispatch::Processed(outcome))
}

// The correlation state must match the copy inside the return URL the
// provider signed. Positive assertions always carry one.
fn is_signed(
    params: &BTreeMap<String, String>, correlation: &CorrelationState, verdict: Verdict,
) -> bool {
    let Some(return_to) = params.get(RETURN_TO_PARAM) else {
        return verdict != Verdict::Authenticated || correlation.is_empty();
    };
    match CorrelationState::from_return_to(return_to) {
        Found::State(signed) => signed == *correlation,
        Found::Missing => correlation.is_empty(),
        Found::Malformed => false,
    }
}

fn classify(verification: &Verification, extensions: &ExtensionRegistry) -> Result<Status> {
    match verification.verdict {
        Verdict::Authenticated => Ok(Status::Authenticated),
        Verdict::Canceled => Ok(Status::Canceled),
        Verdict::Failed => Ok(Status::Failed),
        Verdict::SetupRequired => Ok(Status::SetupRequired),
        Verdict::Unclassified if extensions.recognizes_any(verification.extensions.keys()) => {
            Ok(Status::ExtensionsOnly)
        }
        Verdict::Unclassified => Err(Error::UnexpectedClassification(
            "no verdict and no recognized extensions".to_string(),
        )),
    }
}

fn outcome(
    status: Status, verification: &Verification, correlation: &CorrelationState,
    extensions: &ExtensionRegistry,
) -> Outcome {
    let claimed_identifier = if status == Status::Authenticated {
        verification.claimed_identifier.clone()
    } else {
        None
    };

    Outcome {
        status,
        claimed_identifier,
        user_supplied_identifier: correlation.get(key::USER_SUPPLIED).map(ToString::to_string),
        provider_endpoint: correlation.get(key::OP_ENDPOINT).map(ToString::to_string),
        index: correlation.index(),
        persistence: correlation.get(key::PERSISTENCE).and_then(LogOnPersistence::from_name),
        extensions: verification
            .extensions
            .keys()
            .filter(|t| extensions.is_registered(t))
            .cloned()
            .collect(),
    }
}

// Stateless contexts keep records to themselves.
async fn lookup(
    provider: &impl Provider, context: &Context, fingerprint: &str,
) -> Result<Option<DispatchRecord>> {
    let found = if context.settings().stateless {
        context.records().get(fingerprint).await
    } else {
        DispatchStore::get(provider, fingerprint).await
    };
    found.map_err(|e| Error::ServerError(format!("issue retrieving dispatch record: {e}")))
}

async fn claim(
    provider: &impl Provider, context: &Context, record: &DispatchRecord,
) -> Result<Option<DispatchRecord>> {
    let existing = if context.settings().stateless {
        context.records().put_if_absent(record, record.expires_at).await
    } else {
        DispatchStore::put_if_absent(provider, record, record.expires_at).await
    };
    existing.map_err(|e| Error::ServerError(format!("issue saving dispatch record: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::JsonArgs;

    fn verification(verdict: Verdict) -> Verification {
        Verification {
            verdict,
            claimed_identifier: Some("http://alice.example/".to_string()),
            nonce: None,
            extensions: BTreeMap::new(),
        }
    }

    #[test]
    fn classification() {
        let registry = ExtensionRegistry::new();
        let status = classify(&verification(Verdict::Canceled), &registry);
        assert_eq!(status, Ok(Status::Canceled));

        let status = classify(&verification(Verdict::Unclassified), &registry);
        assert!(matches!(status, Err(Error::UnexpectedClassification(_))));

        let mut registry = ExtensionRegistry::new();
        registry.register("urn:ext", "ext", JsonArgs).expect("should register");
        let mut unclassified = verification(Verdict::Unclassified);
        unclassified.extensions.insert("urn:ext".to_string(), BTreeMap::new());
        assert_eq!(classify(&unclassified, &registry), Ok(Status::ExtensionsOnly));
    }

    #[test]
    fn correlation_must_match_signed_return_to() {
        let mut correlation = CorrelationState::new();
        correlation.put(key::INDEX, "0");
        let mut return_to = Url::parse("https://rp.example/login").expect("should parse");
        correlation.append_to(&mut return_to);

        let mut params = BTreeMap::from([(RETURN_TO_PARAM.to_string(), return_to.to_string())]);
        assert!(is_signed(&params, &correlation, Verdict::Authenticated));

        let mut forged = CorrelationState::new();
        forged.put(key::INDEX, "7");
        assert!(!is_signed(&params, &forged, Verdict::Authenticated));

        // negative responses need not echo the return URL
        params.clear();
        assert!(is_signed(&params, &correlation, Verdict::Canceled));
        assert!(!is_signed(&params, &correlation, Verdict::Authenticated));
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = BTreeMap::from([
            ("openid.mode".to_string(), "id_res".to_string()),
            ("openid.sig".to_string(), "abc".to_string()),
        ]);
        let mut b = BTreeMap::new();
        b.insert("openid.sig".to_string(), "abc".to_string());
        b.insert("openid.mode".to_string(), "id_res".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));

        b.insert("openid.sig".to_string(), "abd".to_string());
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn params_exclude_hand_back_marker() {
        let url = Url::parse("https://rp.example/login?openid.mode=cancel&vrp_parent=1")
            .expect("should parse");
        let response = IncomingResponse::post(url, [("a".to_string(), "b".to_string())]);

        assert!(response.is_hand_back());
        let params = response.params();
        assert_eq!(params.len(), 2);
        assert!(!params.contains_key(HAND_BACK_PARAM));
    }

    #[test]
    fn outcome_from_correlation() {
        let mut correlation = CorrelationState::new();
        correlation.put(key::INDEX, "1");
        correlation.put(key::USER_SUPPLIED, "alice.example");
        correlation.put(key::PERSISTENCE, "SessionAndPersistentIdentifier");

        let registry = ExtensionRegistry::new();
        let canceled =
            outcome(Status::Canceled, &verification(Verdict::Canceled), &correlation, &registry);
        assert_eq!(canceled.claimed_identifier, None);
        assert_eq!(canceled.index, Some(1));
        assert_eq!(canceled.persistence, Some(LogOnPersistence::SessionAndPersistentIdentifier));
    }
}
