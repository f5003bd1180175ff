//! # Out-of-Band Transport
//!
//! When the provider interaction runs in a popup window or a hidden iframe,
//! the provider's response lands in that window rather than in the page that
//! started the log on. The window hands the response back: a popup to its
//! opener (then closes itself), an iframe to its parent frame (and stays
//! open). A popup that has lost its opener navigates to the response itself.
//!
//! The hand-back payload is always a document-relative URL with any posted
//! fields promoted into the query string, so the receiving window can replay
//! it as a plain GET. The receiving side rebuilds the response with
//! [`IncomingResponse::from_hand_back`] and passes it to
//! [`dispatch`](crate::dispatch::dispatch), where it is fingerprinted like
//! any other delivery.

use std::collections::BTreeMap;

use serde::Serialize;
use url::{Position, Url};

use crate::config::{OutOfBand, Settings, TransportPolicy};
use crate::correlation::{CorrelationState, key};
use crate::dispatch::{IncomingResponse, MODE_PARAM};
use crate::endpoint::{ProviderEndpoint, UI_POPUP};
use crate::extension::{Assignment, ExtensionRegistry};
use crate::request::TransportHint;
use crate::{Error, Result};

/// Query parameter marking a response replayed by the opener or parent.
pub const HAND_BACK_PARAM: &str = "vrp_parent";

const POSITIVE_MODE: &str = "id_res";

/// Choose the transport for a candidate endpoint.
#[must_use]
pub fn select_transport(settings: &Settings, endpoint: &ProviderEndpoint) -> TransportHint {
    let out_of_band = match settings.transport_policy {
        TransportPolicy::Never => false,
        TransportPolicy::Always => true,
        TransportPolicy::IfProviderSupports => endpoint.supports_extension(UI_POPUP),
    };

    match (out_of_band, settings.out_of_band) {
        (false, _) => TransportHint::Redirect,
        (true, OutOfBand::Popup) => TransportHint::Popup,
        (true, OutOfBand::Iframe) => TransportHint::Iframe,
    }
}

/// Whether `response` is a provider response delivered into a popup or
/// iframe window that must be handed back to its opener or parent rather
/// than processed in place.
#[must_use]
pub fn is_popup_response(response: &IncomingResponse) -> bool {
    if response.is_hand_back() {
        return false;
    }
    let params = response.params();
    params.contains_key(MODE_PARAM)
        && CorrelationState::from_params(&params).is_some_and(|c| c.get(key::UI_POPUP) == Some("1"))
}

/// What the user agent reports about the window a response landed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    /// The window was opened by another window that is still reachable.
    pub has_opener: bool,

    /// The window is embedded in a parent frame.
    pub in_frame: bool,
}

/// Where the payload goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Target {
    /// The window that opened the popup.
    Opener,

    /// The frame embedding the iframe.
    Parent,

    /// The window navigates to the payload itself.
    SelfNavigate,
}

/// Instructions for the window a response landed in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandBack {
    /// Recipient of the payload.
    pub target: Target,

    /// Document-relative URL carrying the response.
    pub payload: String,

    /// Extension properties to set on the recipient.
    pub assignments: Vec<Assignment>,

    /// Whether the window closes itself after handing back.
    pub close_window: bool,
}

/// Build the hand-back for a response received in an out-of-band window.
/// Extension assignments are only produced for positive assertions.
#[must_use]
pub fn hand_back(
    window: &Window, response: &IncomingResponse, extensions: &ExtensionRegistry,
) -> HandBack {
    let params = response.params();
    let payload = document_relative(&promote_form(response));
    let assignments = if params.get(MODE_PARAM).is_some_and(|m| m == POSITIVE_MODE) {
        extensions.assignments(&params)
    } else {
        Vec::new()
    };

    let (target, close_window) = if window.in_frame {
        (Target::Parent, false)
    } else if window.has_opener {
        (Target::Opener, true)
    } else {
        tracing::debug!("popup has no opener, navigating in place");
        (Target::SelfNavigate, false)
    };

    HandBack {
        target,
        payload,
        assignments,
        close_window,
    }
}

/// The request URL with posted form fields promoted into the query string.
#[must_use]
pub fn promote_form(response: &IncomingResponse) -> Url {
    let mut url = response.url().clone();
    if response.form().is_empty() {
        return url;
    }

    let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    params.extend(response.form().iter().map(|(k, v)| (k.clone(), v.clone())));
    url.query_pairs_mut().clear().extend_pairs(&params);
    url
}

/// The path and query of `url`.
#[must_use]
pub fn document_relative(url: &Url) -> String {
    url[Position::BeforePath..Position::AfterQuery].to_string()
}

impl IncomingResponse {
    /// Rebuild a response handed back by an out-of-band window. `document`
    /// is the URL of the receiving document; the payload must resolve to the
    /// same origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the payload does not resolve to
    /// a URL on the document's origin.
    pub fn from_hand_back(document: &Url, payload: &str) -> Result<Self> {
        let mut url = document
            .join(payload)
            .map_err(|e| Error::InvalidResponse(format!("hand-back payload: {e}")))?;
        if url.origin() != document.origin() {
            return Err(Error::InvalidResponse("hand-back payload changes origin".to_string()));
        }

        url.query_pairs_mut().append_pair(HAND_BACK_PARAM, "1");
        Ok(Self::get(url))
    }
}
