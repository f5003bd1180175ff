//! # Correlation State
//!
//! Correlation state is a small bag of string entries attached to an outgoing
//! authentication request and recovered, unchanged, from the provider's
//! response. It is carried in a single crate-owned return URL parameter
//! ([`STATE_PARAM`]) as base64url-encoded JSON, so it survives every transport
//! (redirect, popup, iframe) without colliding with host parameters.

use std::collections::BTreeMap;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::{Map, Value};
use url::Url;

use crate::{Error, Result};

/// Return URL parameter carrying the encoded correlation state.
pub const STATE_PARAM: &str = "vrp_state";

/// Keys used by the request builder and dispatcher.
pub mod key {
    /// Identifier of the context that created the request.
    pub const RECEIVER: &str = "receiver";

    /// Position of the candidate in the candidate sequence.
    pub const INDEX: &str = "index";

    /// Set when the response is expected inside a popup or iframe window.
    pub const UI_POPUP: &str = "uipopup";

    /// Set when the provider was asked to size its popup UI.
    pub const POPUP_UI_SUPPORTED: &str = "popupUISupported";

    /// Requested log on persistence.
    pub const PERSISTENCE: &str = "persist";

    /// Provider endpoint the request was sent to.
    pub const OP_ENDPOINT: &str = "op_endpoint";

    /// Claimed identifier of the candidate.
    pub const CLAIMED_ID: &str = "claimed_id";

    /// Identifier as typed by the user.
    pub const USER_SUPPLIED: &str = "user_supplied";
}

/// Correlation state as found in a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Found {
    /// No state parameter.
    Missing,

    /// A state parameter that does not decode.
    Malformed,

    /// Decoded state.
    State(CorrelationState),
}

/// String key/value entries correlating a response with its request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrelationState {
    entries: BTreeMap<String, String>,
}

impl CorrelationState {
    /// Create an empty correlation state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if `key` is already attached.
    pub fn attach(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.entries.insert(key, value.into());
        Ok(())
    }

    // Internal insert for keys known to be distinct.
    pub(crate) fn put(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    /// The value attached for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Receiver of the request, absent in stateless mode.
    #[must_use]
    pub fn receiver(&self) -> Option<&str> {
        self.get(key::RECEIVER)
    }

    /// Candidate index of the request.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.get(key::INDEX).and_then(|i| i.parse().ok())
    }

    /// Whether no entries are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as base64url JSON.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(&self.entries).unwrap_or_default();
        Base64UrlUnpadded::encode_string(&json)
    }

    /// Decode an encoded state. Entries with non-string values are ignored.
    /// Returns `None` for anything that is not an encoded JSON object, never
    /// an error.
    #[must_use]
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = Base64UrlUnpadded::decode_vec(encoded).ok()?;
        let map: Map<String, Value> = serde_json::from_slice(&bytes).ok()?;

        let entries = map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();
        Some(Self { entries })
    }

    /// Recover the state from response parameters.
    #[must_use]
    pub fn from_params(params: &BTreeMap<String, String>) -> Option<Self> {
        match Self::find(params) {
            Found::State(state) => Some(state),
            Found::Missing | Found::Malformed => None,
        }
    }

    /// Look for the state in response parameters, distinguishing a missing
    /// state from one that cannot be decoded.
    #[must_use]
    pub fn find(params: &BTreeMap<String, String>) -> Found {
        match params.get(STATE_PARAM) {
            None => Found::Missing,
            Some(encoded) => Self::decode(encoded).map_or(Found::Malformed, Found::State),
        }
    }

    /// The state carried in a return URL, such as the signed
    /// `openid.return_to` of a response.
    #[must_use]
    pub fn from_return_to(return_to: &str) -> Found {
        let Ok(url) = Url::parse(return_to) else {
            return Found::Malformed;
        };
        let Some((_, encoded)) = url.query_pairs().find(|(k, _)| k == STATE_PARAM) else {
            return Found::Missing;
        };
        Self::decode(&encoded).map_or(Found::Malformed, Found::State)
    }

    /// Append the encoded state to `url` as [`STATE_PARAM`].
    pub fn append_to(&self, url: &mut Url) {
        url.query_pairs_mut().append_pair(STATE_PARAM, &self.encode());
    }
}
