//! # Discovery Result
//!
//! Renders the candidate requests for a user-supplied identifier as a JSON
//! document for script-driven log on pages. Each candidate is offered as a
//! pair of signed URLs: one for an immediate (no interaction) attempt, and
//! one for a setup attempt.
//!
//! ```json
//! {
//!     "claimedIdentifier": "http://alice.example/",
//!     "requests": [{
//!         "endpoint": "https://op1.example/server",
//!         "immediate": "https://op1.example/server?openid.mode=checkid_immediate&...",
//!         "setup": "https://op1.example/server?openid.mode=checkid_setup&..."
//!     }],
//!     "error": null
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::Result;
use crate::context::Context;
use crate::provider::Provider;
use crate::request::{AuthRequest, BuildRequest, Mode, build_requests};

/// Candidate requests rendered for a script-driven log on page.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Claimed identifier of the first candidate, when the user supplied one.
    pub claimed_identifier: Option<String>,

    /// Candidate requests, in order.
    pub requests: Vec<DiscoveredRequest>,

    /// Why no requests could be offered.
    pub error: Option<String>,
}

/// One candidate as a pair of URLs.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DiscoveredRequest {
    /// Provider endpoint.
    pub endpoint: String,

    /// Signed immediate mode request URL.
    pub immediate: String,

    /// Signed setup mode request URL.
    pub setup: String,
}

/// Build the discovery result for a user-supplied identifier. Failures are
/// reported in the result's `error` field rather than returned.
#[instrument(level = "debug", skip(provider))]
pub async fn discovery_result(
    provider: impl Provider, context: &Context, request: &BuildRequest,
) -> DiscoveryResult {
    match process(provider, context, request).await {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!("discovery_result: {e}");
            DiscoveryResult {
                error: Some(e.to_string()),
                ..DiscoveryResult::default()
            }
        }
    }
}

async fn process(
    provider: impl Provider, context: &Context, request: &BuildRequest,
) -> Result<DiscoveryResult> {
    tracing::debug!("discovery_result::process");

    let candidates = build_requests(provider.clone(), context, request).await?;

    let mut result = DiscoveryResult::default();
    for candidate in candidates {
        if result.claimed_identifier.is_none() && !candidate.endpoint().is_op_identifier() {
            result.claimed_identifier = Some(candidate.endpoint().claimed_identifier().to_string());
        }
        result.requests.push(discovered(&provider, candidate).await?);
    }

    if result.requests.is_empty() {
        result.error = Some(format!("no OpenID endpoint found for {}", request.identifier));
    }
    Ok(result)
}

async fn discovered(provider: &impl Provider, candidate: AuthRequest) -> Result<DiscoveredRequest> {
    let mut immediate = candidate.clone();
    immediate.set_mode(Mode::Immediate);
    let mut setup = candidate;
    setup.set_mode(Mode::Setup);

    Ok(DiscoveredRequest {
        endpoint: setup.endpoint().provider_endpoint().to_string(),
        immediate: immediate.signed_uri(provider).await?.to_string(),
        setup: setup.signed_uri(provider).await?.to_string(),
    })
}
