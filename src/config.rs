//! # Settings
//!
//! Configuration for a relying party. [`Settings`] can be deserialized from a
//! JSON configuration document (all fields optional) or assembled with the
//! `with_*` builder methods.
//!
//! ```json
//! {
//!     "associationPreference": "RequireAssociation",
//!     "transportPolicy": "IfProviderSupports",
//!     "outOfBand": "Popup",
//!     "requireTransportSecurity": true,
//!     "stateless": false
//! }
//! ```

use serde::{Deserialize, Serialize};

/// The longest indirect message URL sent as a redirect. Longer messages are
/// sent as a self-posting form.
pub const DEFAULT_MAX_URL_LENGTH: usize = 2048;

/// Whether a shared association should be established with the provider
/// before sending the request. Variants are ordered weakest to strongest.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum AssociationPreference {
    /// Use dumb (stateless) mode verification.
    Never,

    /// Use an association when the provider supports one.
    #[default]
    IfPossible,

    /// Fail rather than proceed without an association.
    RequireAssociation,
}

impl AssociationPreference {
    /// Merge two preferences. The result is never weaker than either input.
    #[must_use]
    pub fn strengthen(self, other: Self) -> Self {
        self.max(other)
    }
}

/// When to route the provider interaction through an out-of-band window.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum TransportPolicy {
    /// Always use a full-page redirect.
    #[default]
    Never,

    /// Always use the out-of-band window.
    Always,

    /// Use the out-of-band window only for providers advertising the UI
    /// extension.
    IfProviderSupports,
}

/// The kind of out-of-band window used when the policy selects one.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum OutOfBand {
    /// A popup window with an opener.
    #[default]
    Popup,

    /// A hidden iframe embedded in the parent document.
    Iframe,
}

/// How long a successful log on should be remembered.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum LogOnPersistence {
    /// Only for the current session.
    #[default]
    Session,

    /// For the session, and remember the identifier used for next time.
    SessionAndPersistentIdentifier,

    /// Persist the authentication across sessions.
    PersistentAuthentication,
}

impl LogOnPersistence {
    /// Name used when carrying the persistence choice in correlation state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "Session",
            Self::SessionAndPersistentIdentifier => "SessionAndPersistentIdentifier",
            Self::PersistentAuthentication => "PersistentAuthentication",
        }
    }

    /// Parse a name produced by [`LogOnPersistence::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Session" => Some(Self::Session),
            "SessionAndPersistentIdentifier" => Some(Self::SessionAndPersistentIdentifier),
            "PersistentAuthentication" => Some(Self::PersistentAuthentication),
            _ => None,
        }
    }
}

/// Site-wide security settings. Behaviors may strengthen these but never
/// weaken them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySettings {
    /// The minimum association preference applied to every request.
    pub association_preference: AssociationPreference,

    /// Whether identifiers, realms, return URLs and provider endpoints must
    /// use HTTPS.
    pub require_transport_security: bool,
}

impl SecuritySettings {
    /// Merge `other` into these settings, keeping the stronger of each value.
    pub fn strengthen(&mut self, other: &Self) {
        self.association_preference =
            self.association_preference.strengthen(other.association_preference);
        self.require_transport_security |= other.require_transport_security;
    }
}

/// Relying party settings.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Association preference for outgoing requests. Merged with the ambient
    /// security settings.
    pub association_preference: AssociationPreference,

    /// Out-of-band transport policy.
    pub transport_policy: TransportPolicy,

    /// Window kind used when the policy selects out-of-band transport.
    pub out_of_band: OutOfBand,

    /// Require HTTPS throughout.
    pub require_transport_security: bool,

    /// Do not keep correlation or dispatch state outside the current context.
    pub stateless: bool,

    /// Log on persistence requested by the host.
    pub persistence: LogOnPersistence,

    /// Longest URL sent as a redirect.
    pub max_url_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            association_preference: AssociationPreference::default(),
            transport_policy: TransportPolicy::default(),
            out_of_band: OutOfBand::default(),
            require_transport_security: false,
            stateless: false,
            persistence: LogOnPersistence::default(),
            max_url_length: DEFAULT_MAX_URL_LENGTH,
        }
    }
}

impl Settings {
    /// Create settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the association preference.
    #[must_use]
    pub const fn with_association_preference(mut self, pref: AssociationPreference) -> Self {
        self.association_preference = pref;
        self
    }

    /// Set the out-of-band transport policy.
    #[must_use]
    pub const fn with_transport_policy(mut self, policy: TransportPolicy) -> Self {
        self.transport_policy = policy;
        self
    }

    /// Set the out-of-band window kind.
    #[must_use]
    pub const fn with_out_of_band(mut self, out_of_band: OutOfBand) -> Self {
        self.out_of_band = out_of_band;
        self
    }

    /// Require HTTPS for identifiers, realms, return URLs and endpoints.
    #[must_use]
    pub const fn with_transport_security(mut self, required: bool) -> Self {
        self.require_transport_security = required;
        self
    }

    /// Run without state outside the current context.
    #[must_use]
    pub const fn with_stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    /// Set the log on persistence.
    #[must_use]
    pub const fn with_persistence(mut self, persistence: LogOnPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Set the longest URL sent as a redirect.
    #[must_use]
    pub const fn with_max_url_length(mut self, len: usize) -> Self {
        self.max_url_length = len;
        self
    }

    /// The security settings in force once these settings are merged with
    /// the ambient ones.
    #[must_use]
    pub fn effective_security(&self, ambient: &SecuritySettings) -> SecuritySettings {
        let mut security = SecuritySettings {
            association_preference: self.association_preference,
            require_transport_security: self.require_transport_security,
        };
        security.strengthen(ambient);
        security
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document() {
        let json = r#"{"transportPolicy": "IfProviderSupports", "stateless": true}"#;
        let settings: Settings = serde_json::from_str(json).expect("should deserialize");

        assert_eq!(settings.transport_policy, TransportPolicy::IfProviderSupports);
        assert!(settings.stateless);
        assert_eq!(settings.max_url_length, DEFAULT_MAX_URL_LENGTH);
        assert_eq!(settings.association_preference, AssociationPreference::IfPossible);
    }

    #[test]
    fn never_weakens() {
        let strong = AssociationPreference::RequireAssociation;
        assert_eq!(strong.strengthen(AssociationPreference::Never), strong);
        assert_eq!(AssociationPreference::Never.strengthen(strong), strong);

        let settings = Settings::new().with_association_preference(AssociationPreference::Never);
        let ambient = SecuritySettings {
            association_preference: AssociationPreference::IfPossible,
            require_transport_security: true,
        };
        let security = settings.effective_security(&ambient);
        assert_eq!(security.association_preference, AssociationPreference::IfPossible);
        assert!(security.require_transport_security);

        let mut ambient = ambient;
        ambient.strengthen(&SecuritySettings::default());
        assert!(ambient.require_transport_security);
    }
}
