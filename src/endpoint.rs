//! # Provider Endpoints
//!
//! A [`ProviderEndpoint`] is one discovered way of authenticating a claimed
//! identifier: the provider's endpoint URL, the claimed and provider-local
//! identifiers, and the service type URIs the provider advertises. The
//! protocol version is derived from the service types on demand.

use std::collections::HashSet;

use serde::Serialize;
use url::Url;

use crate::{Error, Result};

/// Service type URIs advertised in discovery documents.
pub mod service_type {
    /// `OpenID` 2.0 claimed identifier sign on.
    pub const SIGNON_20: &str = "http://specs.openid.net/auth/2.0/signon";

    /// `OpenID` 2.0 OP identifier (provider-driven identifier selection).
    pub const OP_IDENTIFIER_20: &str = "http://specs.openid.net/auth/2.0/server";

    /// `OpenID` 1.2 sign on.
    pub const SIGNON_12: &str = "http://openid.net/signon/1.2";

    /// `OpenID` 1.1 sign on.
    pub const SIGNON_11: &str = "http://openid.net/signon/1.1";

    /// `OpenID` 1.0 sign on.
    pub const SIGNON_10: &str = "http://openid.net/signon/1.0";
}

/// Placeholder identifier used when the provider selects the identifier.
pub const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// Type URI of the user interface extension requesting popup mode.
pub const UI_POPUP: &str = "http://specs.openid.net/extensions/ui/1.0/mode/popup";

/// OP identifiers of common providers.
pub mod well_known {
    /// Yahoo.
    pub const YAHOO: &str = "https://me.yahoo.com/";

    /// Google.
    pub const GOOGLE: &str = "https://www.google.com/accounts/o8/id";

    /// `MyOpenID`.
    pub const MY_OPENID: &str = "https://www.myopenid.com/";
}

/// Protocol version spoken by a provider endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Version {
    /// `OpenID` 1.0
    V10,

    /// `OpenID` 1.1
    V11,

    /// `OpenID` 1.2
    V12,

    /// `OpenID` 2.0
    V20,
}

impl Version {
    /// The `openid.ns` value for the version, if the version uses one.
    #[must_use]
    pub const fn namespace(self) -> Option<&'static str> {
        match self {
            Self::V20 => Some("http://specs.openid.net/auth/2.0"),
            Self::V10 | Self::V11 | Self::V12 => None,
        }
    }
}

/// A discovered provider endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEndpoint {
    claimed_identifier: String,
    provider_endpoint: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_local_identifier: Option<String>,
    service_types: Vec<String>,
}

impl ProviderEndpoint {
    /// Create an endpoint for a claimed identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if `endpoint` is not an absolute
    /// HTTP or HTTPS URL, or [`Error::InvalidIdentifier`] if the claimed
    /// identifier is empty.
    pub fn new(
        claimed_identifier: impl Into<String>, endpoint: &str, service_types: Vec<String>,
    ) -> Result<Self> {
        let claimed_identifier = claimed_identifier.into();
        if claimed_identifier.is_empty() {
            return Err(Error::InvalidIdentifier("claimed identifier is empty".to_string()));
        }

        let provider_endpoint =
            Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(provider_endpoint.scheme(), "http" | "https") {
            return Err(Error::InvalidEndpoint(format!("{endpoint}: not an HTTP URL")));
        }

        Ok(Self {
            claimed_identifier,
            provider_endpoint,
            provider_local_identifier: None,
            service_types,
        })
    }

    /// Create an endpoint discovered from an OP identifier. The provider
    /// chooses the identifier, so claimed and local identifiers are the
    /// identifier-select placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if `endpoint` is not an absolute
    /// HTTP or HTTPS URL.
    pub fn op_identifier(endpoint: &str, service_types: Vec<String>) -> Result<Self> {
        Self::new(IDENTIFIER_SELECT, endpoint, service_types)
    }

    /// Set the provider-local identifier.
    #[must_use]
    pub fn with_local_identifier(mut self, local: impl Into<String>) -> Self {
        self.provider_local_identifier = Some(local.into());
        self
    }

    /// The identifier the user claims to own.
    #[must_use]
    pub fn claimed_identifier(&self) -> &str {
        &self.claimed_identifier
    }

    /// The provider's endpoint URL.
    #[must_use]
    pub const fn provider_endpoint(&self) -> &Url {
        &self.provider_endpoint
    }

    /// The identifier the provider knows the user by. Defaults to the claimed
    /// identifier.
    #[must_use]
    pub fn provider_local_identifier(&self) -> &str {
        self.provider_local_identifier.as_deref().unwrap_or(&self.claimed_identifier)
    }

    /// Advertised service type URIs, in discovery order.
    #[must_use]
    pub fn service_types(&self) -> &[String] {
        &self.service_types
    }

    /// Whether the provider chooses the identifier.
    #[must_use]
    pub fn is_op_identifier(&self) -> bool {
        self.claimed_identifier == IDENTIFIER_SELECT
    }

    /// Whether the endpoint is reached over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.provider_endpoint.scheme() == "https"
    }

    /// The protocol version spoken by this endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionUnknown`] if no known service type is
    /// advertised.
    pub fn version(&self) -> Result<Version> {
        resolve_version(self)
    }

    /// Whether the endpoint advertises the extension type URI.
    #[must_use]
    pub fn supports_extension(&self, type_uri: &str) -> bool {
        is_extension_supported(self, type_uri)
    }

    fn has_type(&self, type_uri: &str) -> bool {
        self.service_types.iter().any(|t| t == type_uri)
    }
}

/// Resolve the protocol version of an endpoint from its advertised service
/// types. 2.0 (sign on or OP identifier) takes precedence over 1.2, then 1.1,
/// then 1.0, regardless of the order the types were advertised in.
///
/// # Errors
///
/// Returns [`Error::VersionUnknown`] if none of the known service types is
/// present. No default version is assumed.
pub fn resolve_version(endpoint: &ProviderEndpoint) -> Result<Version> {
    if endpoint.has_type(service_type::SIGNON_20) || endpoint.has_type(service_type::OP_IDENTIFIER_20)
    {
        Ok(Version::V20)
    } else if endpoint.has_type(service_type::SIGNON_12) {
        Ok(Version::V12)
    } else if endpoint.has_type(service_type::SIGNON_11) {
        Ok(Version::V11)
    } else if endpoint.has_type(service_type::SIGNON_10) {
        Ok(Version::V10)
    } else {
        Err(Error::VersionUnknown(endpoint.provider_endpoint.to_string()))
    }
}

/// Whether the endpoint advertises `type_uri` among its service types.
#[must_use]
pub fn is_extension_supported(endpoint: &ProviderEndpoint, type_uri: &str) -> bool {
    endpoint.has_type(type_uri)
}

/// Drop endpoints whose provider host has already been seen. Hosts are
/// compared case-insensitively; scheme, port and path are ignored. The first
/// endpoint for a host wins and discovery order is preserved.
pub fn dedupe(endpoints: impl IntoIterator<Item = ProviderEndpoint>) -> Vec<ProviderEndpoint> {
    let mut hosts = HashSet::new();
    let mut kept = Vec::new();

    for endpoint in endpoints {
        let host = endpoint.provider_endpoint.host_str().unwrap_or_default().to_ascii_lowercase();
        if hosts.insert(host) {
            kept.push(endpoint);
        } else {
            tracing::debug!("dropping duplicate endpoint {}", endpoint.provider_endpoint);
        }
    }

    kept
}
