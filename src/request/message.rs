//! Candidate authentication requests and the indirect messages they are
//! sent as.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::AssociationPreference;
use crate::correlation::CorrelationState;
use crate::endpoint::{ProviderEndpoint, Version};
use crate::identifier::{Identifier, Realm};
use crate::provider::Channel;
use crate::{Error, Result};

/// Namespace of the user interface extension.
pub const UI_NAMESPACE: &str = "http://specs.openid.net/extensions/ui/1.0";

/// Whether the provider may interact with the user.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Mode {
    /// The provider must answer without user interaction.
    Immediate,

    /// The provider may interact with the user.
    #[default]
    Setup,
}

impl Mode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "checkid_immediate",
            Self::Setup => "checkid_setup",
        }
    }
}

/// How the request reaches the provider.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum TransportHint {
    /// Full-page redirect.
    #[default]
    Redirect,

    /// Popup window.
    Popup,

    /// Hidden iframe.
    Iframe,
}

/// An extension request carried in an authentication request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionRequest {
    /// Extension namespace URI.
    pub type_uri: String,

    /// Alias used in the message.
    pub alias: String,

    /// Extension arguments.
    pub args: BTreeMap<String, String>,
}

/// One candidate authentication request, bound to a single provider
/// endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRequest {
    pub(super) endpoint: ProviderEndpoint,
    pub(super) version: Version,
    pub(super) identifier: Identifier,
    pub(super) realm: Realm,
    pub(super) return_to: Url,
    pub(super) mode: Mode,
    pub(super) correlation: CorrelationState,
    pub(super) extensions: Vec<ExtensionRequest>,
    pub(super) association: AssociationPreference,
    pub(super) transport: TransportHint,
}

impl AuthRequest {
    /// The provider endpoint the request is addressed to.
    #[must_use]
    pub const fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    /// Protocol version spoken with the endpoint.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// The user-supplied identifier the request was built from.
    #[must_use]
    pub const fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Resolved realm.
    #[must_use]
    pub const fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Return URL, without correlation state.
    #[must_use]
    pub const fn return_to(&self) -> &Url {
        &self.return_to
    }

    /// Request mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Set the request mode.
    pub const fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Correlation state echoed back with the response.
    #[must_use]
    pub const fn correlation(&self) -> &CorrelationState {
        &self.correlation
    }

    /// Candidate index.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.correlation.index()
    }

    /// Merged association preference.
    #[must_use]
    pub const fn association(&self) -> AssociationPreference {
        self.association
    }

    /// Raise the association preference. A weaker preference is ignored.
    pub fn require_association(&mut self, preference: AssociationPreference) {
        self.association = self.association.strengthen(preference);
    }

    /// Selected transport.
    #[must_use]
    pub const fn transport(&self) -> TransportHint {
        self.transport
    }

    /// Extensions requested.
    #[must_use]
    pub fn extensions(&self) -> &[ExtensionRequest] {
        &self.extensions
    }

    /// Attach a callback argument, echoed back with the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the argument is already set.
    pub fn set_callback_argument(
        &mut self, key: impl Into<String>, value: impl Into<String>,
    ) -> Result<()> {
        self.correlation.attach(key, value)
    }

    /// Request an extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the extension or its alias is
    /// already requested.
    pub fn add_extension(
        &mut self, type_uri: &str, alias: &str, args: BTreeMap<String, String>,
    ) -> Result<()> {
        if self.extensions.iter().any(|e| e.type_uri == type_uri || e.alias == alias) {
            return Err(Error::DuplicateKey(format!("extension {alias}")));
        }
        self.extensions.push(ExtensionRequest {
            type_uri: type_uri.to_string(),
            alias: alias.to_string(),
            args,
        });
        Ok(())
    }

    /// Build the indirect message for this request. The correlation state is
    /// appended to the return URL.
    #[must_use]
    pub fn to_message(&self) -> IndirectMessage {
        let mut return_to = self.return_to.clone();
        self.correlation.append_to(&mut return_to);

        let mut fields = BTreeMap::new();
        let mut set = |k: &str, v: &str| {
            fields.insert(k.to_string(), v.to_string());
        };

        set("openid.mode", self.mode.as_str());
        set("openid.identity", self.endpoint.provider_local_identifier());
        set("openid.return_to", return_to.as_str());

        let realm = self.realm.to_string();
        if let Some(ns) = self.version.namespace() {
            set("openid.ns", ns);
            set("openid.claimed_id", self.endpoint.claimed_identifier());
            set("openid.realm", &realm);

            for ext in &self.extensions {
                set(&format!("openid.ns.{}", ext.alias), &ext.type_uri);
                for (k, v) in &ext.args {
                    set(&format!("openid.{}.{k}", ext.alias), v);
                }
            }
        } else {
            set("openid.trust_root", &realm);
            if !self.extensions.is_empty() {
                tracing::debug!("extensions not sent to {:?} endpoint", self.version);
            }
        }

        IndirectMessage {
            endpoint: self.endpoint.provider_endpoint().clone(),
            fields,
        }
    }

    /// Sign the request and return it as a URL, whatever its length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerError`] if the channel cannot sign the message.
    pub async fn signed_uri(&self, channel: &impl Channel) -> Result<Url> {
        let mut message = self.to_message();
        channel
            .sign(&mut message, self.association)
            .await
            .map_err(|e| Error::ServerError(format!("issue signing request: {e}")))?;
        Ok(message.direct_uri())
    }

    /// Sign and freeze the request for transmission. Messages whose URL would
    /// exceed `max_url_length` are sent as a form post.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerError`] if the channel cannot sign the message.
    pub async fn transmit(
        self, channel: &impl Channel, max_url_length: usize,
    ) -> Result<OutgoingMessage> {
        let mut message = self.to_message();
        channel
            .sign(&mut message, self.association)
            .await
            .map_err(|e| Error::ServerError(format!("issue signing request: {e}")))?;
        Ok(message.into_outgoing(max_url_length))
    }
}

/// An indirect message addressed to a provider endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndirectMessage {
    /// Provider endpoint.
    pub endpoint: Url,

    /// Message fields.
    pub fields: BTreeMap<String, String>,
}

impl IndirectMessage {
    /// The message encoded into the endpoint's query string.
    #[must_use]
    pub fn direct_uri(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(&self.fields);
        url
    }

    /// Choose redirect or form post by URL length.
    #[must_use]
    pub fn into_outgoing(self, max_url_length: usize) -> OutgoingMessage {
        let uri = self.direct_uri();
        if uri.as_str().len() <= max_url_length {
            OutgoingMessage::Redirect(uri)
        } else {
            OutgoingMessage::FormPost {
                action: self.endpoint,
                fields: self.fields,
            }
        }
    }
}

/// A message ready to send to the user agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum OutgoingMessage {
    /// Redirect the user agent.
    Redirect(Url),

    /// Have the user agent post a form.
    FormPost {
        /// Form action.
        action: Url,

        /// Form fields.
        fields: BTreeMap<String, String>,
    },
}
