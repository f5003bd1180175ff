//! # Build Requests
//!
//! Turns a user-supplied identifier into an ordered, deduplicated, lazily
//! configured sequence of candidate authentication requests, one per
//! usable provider endpoint.
//!
//! The realm is resolved against the return URL and validated, the identifier
//! is discovered, endpoints sharing a provider host are collapsed to the
//! first, and each remaining endpoint becomes an [`AuthRequest`] only when the
//! caller asks for it. Endpoints with an unknown protocol version (or, when
//! transport security is required, a plain HTTP endpoint) are skipped without
//! ending the sequence.
//!
//! # Example
//!
//! ```json
//! {
//!     "identifier": "alice.example",
//!     "realm": "https://rp.example/",
//!     "currentUrl": "https://rp.example/login"
//! }
//! ```

mod message;

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

pub use self::message::{
    AuthRequest, ExtensionRequest, IndirectMessage, Mode, OutgoingMessage, TransportHint,
    UI_NAMESPACE,
};
use crate::context::Context;
use crate::correlation::{CorrelationState, key};
use crate::endpoint::{self, ProviderEndpoint, UI_POPUP};
use crate::identifier::{Identifier, Realm};
use crate::provider::{Discovery, DiscoveryError, Provider};
use crate::transport;
use crate::{Error, Result};

/// A request to log on with a user-supplied identifier.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// Identifier as typed by the user.
    pub identifier: String,

    /// Realm (trust root). May be `~/`-relative.
    pub realm: String,

    /// Explicit return URL, absolute or relative to the current URL.
    /// Defaults to the current URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,

    /// URL of the page the log on was started from.
    pub current_url: Url,

    /// Request mode for every candidate.
    #[serde(default)]
    pub mode: Mode,
}

impl BuildRequest {
    /// Create a request with the current URL as return URL.
    #[must_use]
    pub fn new(identifier: impl Into<String>, realm: impl Into<String>, current_url: Url) -> Self {
        Self {
            identifier: identifier.into(),
            realm: realm.into(),
            return_to: None,
            current_url,
            mode: Mode::default(),
        }
    }

    /// Use an explicit return URL.
    #[must_use]
    pub fn with_return_to(mut self, return_to: impl Into<String>) -> Self {
        self.return_to = Some(return_to.into());
        self
    }

    /// Use `mode` for every candidate.
    #[must_use]
    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// Build candidate authentication requests for a user-supplied identifier.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] or [`Error::InvalidRealm`] if the
/// input cannot be used, and [`Error::Discovery`] if discovery fails. When
/// no provider is found, an empty sequence is returned.
#[instrument(level = "debug", skip(provider))]
pub async fn build_requests(
    provider: impl Provider, context: &Context, request: &BuildRequest,
) -> Result<Candidates> {
    let prepared = verify(context, request).await?;
    process(provider, context, request, prepared).await
}

struct Prepared {
    identifier: Identifier,
    realm: Realm,
    return_to: Url,
}

#[allow(clippy::unused_async)]
async fn verify(context: &Context, request: &BuildRequest) -> Result<Prepared> {
    tracing::debug!("build_requests::verify");

    let identifier = Identifier::parse(&request.identifier)?;

    let return_to = match &request.return_to {
        Some(return_to) => request
            .current_url
            .join(return_to)
            .map_err(|e| Error::InvalidRealm(format!("return URL {return_to}: {e}")))?,
        None => request.current_url.clone(),
    };

    let realm = Realm::resolve(&request.realm, &request.current_url, &return_to)?;
    if !realm.contains(&return_to) {
        return Err(Error::InvalidRealm(format!("{return_to} is not within {realm}")));
    }

    if context.security().require_transport_security {
        if !identifier.is_xri() && !identifier.is_secure() {
            return Err(Error::InvalidIdentifier(format!("{identifier} is not HTTPS")));
        }
        if !realm.is_secure() {
            return Err(Error::InvalidRealm(format!("{realm} is not HTTPS")));
        }
    }

    Ok(Prepared {
        identifier,
        realm,
        return_to,
    })
}

async fn process(
    provider: impl Provider, context: &Context, request: &BuildRequest, prepared: Prepared,
) -> Result<Candidates> {
    tracing::debug!("build_requests::process");

    let discovered = match Discovery::discover(&provider, &prepared.identifier).await {
        Ok(endpoints) => endpoints,
        Err(DiscoveryError::NotFound) => {
            tracing::debug!("no endpoints found for {}", prepared.identifier);
            Vec::new()
        }
        Err(DiscoveryError::Transport(e)) => return Err(Error::Discovery(e)),
    };
    let endpoints = endpoint::dedupe(discovered);

    let user_supplied_in_return_to =
        prepared.return_to.query_pairs().any(|(k, _)| k == key::USER_SUPPLIED);

    Ok(Candidates {
        endpoints: endpoints.into(),
        next_index: 0,
        identifier: prepared.identifier,
        realm: prepared.realm,
        return_to: prepared.return_to,
        user_supplied_in_return_to,
        mode: request.mode,
        context: context.clone(),
    })
}

/// Lazily configured candidate requests, in discovery order.
#[derive(Debug)]
pub struct Candidates {
    endpoints: VecDeque<ProviderEndpoint>,
    next_index: usize,
    identifier: Identifier,
    realm: Realm,
    return_to: Url,
    user_supplied_in_return_to: bool,
    mode: Mode,
    context: Context,
}

impl Candidates {
    /// The normalized identifier the candidates were built for.
    #[must_use]
    pub const fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn configure(&self, endpoint: ProviderEndpoint, index: usize) -> Option<AuthRequest> {
        let version = match endpoint.version() {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("skipping endpoint: {e}");
                return None;
            }
        };

        let settings = self.context.settings();
        let security = self.context.security();
        if security.require_transport_security && !endpoint.is_secure() {
            tracing::debug!("skipping insecure endpoint {}", endpoint.provider_endpoint());
            return None;
        }

        let mut correlation = CorrelationState::new();
        correlation.put(key::INDEX, index.to_string());
        if !settings.stateless {
            correlation.put(key::RECEIVER, self.context.receiver());
            correlation.put(key::PERSISTENCE, settings.persistence.as_str());
        }
        if !self.user_supplied_in_return_to {
            correlation.put(key::USER_SUPPLIED, self.identifier.original());
        }
        correlation.put(key::OP_ENDPOINT, endpoint.provider_endpoint().as_str());
        correlation.put(key::CLAIMED_ID, endpoint.claimed_identifier());

        let transport = transport::select_transport(settings, &endpoint);
        let ui_supported = endpoint.supports_extension(UI_POPUP);

        let mut request = AuthRequest {
            endpoint,
            version,
            identifier: self.identifier.clone(),
            realm: self.realm.clone(),
            return_to: self.return_to.clone(),
            mode: self.mode,
            correlation,
            extensions: Vec::new(),
            association: security.association_preference,
            transport,
        };

        // popup and iframe responses are both handed back to the starting page
        if transport != TransportHint::Redirect {
            request.correlation.put(key::UI_POPUP, "1");
        }
        if transport == TransportHint::Popup && ui_supported {
            let args = BTreeMap::from([("mode".to_string(), "popup".to_string())]);
            request.extensions.push(ExtensionRequest {
                type_uri: UI_NAMESPACE.to_string(),
                alias: "ui".to_string(),
                args,
            });
            request.correlation.put(key::POPUP_UI_SUPPORTED, "1");
        }

        for behavior in self.context.behaviors() {
            if !behavior.on_outgoing_request(&mut request) {
                tracing::debug!("candidate {} vetoed", request.endpoint().provider_endpoint());
                return None;
            }
        }
        Some(request)
    }
}

impl Iterator for Candidates {
    type Item = AuthRequest;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(endpoint) = self.endpoints.pop_front() {
            if let Some(request) = self.configure(endpoint, self.next_index) {
                self.next_index += 1;
                return Some(request);
            }
        }
        None
    }
}
