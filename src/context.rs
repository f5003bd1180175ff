//! # Context
//!
//! The relying party context: identity of the receiver that builds requests
//! and dispatches responses, its settings, the ambient security settings,
//! registered extensions and behaviors.

use std::fmt::Debug;
use std::sync::Arc;

use crate::Result;
use crate::config::{SecuritySettings, Settings};
use crate::core::generate;
use crate::dispatch::{MemoryStore, Outcome};
use crate::extension::{ClientScriptExtension, ExtensionRegistry};
use crate::request::AuthRequest;

/// A behavior observes and adjusts relying party activity. All methods have
/// no-op defaults.
pub trait Behavior: Debug + Send + Sync {
    /// Adjust the ambient security settings. Changes that would weaken the
    /// settings are discarded.
    fn apply_security_settings(&self, _security: &mut SecuritySettings) {}

    /// Inspect or amend a candidate request before it is yielded. Returning
    /// `false` drops the candidate without consuming a correlation index.
    fn on_outgoing_request(&self, _request: &mut AuthRequest) -> bool {
        true
    }

    /// Observe a newly processed positive assertion.
    fn on_incoming_assertion(&self, _outcome: &Outcome) {}
}

/// Relying party context.
#[derive(Clone, Debug)]
pub struct Context {
    receiver: String,
    settings: Settings,
    security: SecuritySettings,
    extensions: ExtensionRegistry,
    behaviors: Vec<Arc<dyn Behavior>>,
    records: MemoryStore,
}

impl Context {
    /// Create a context with a generated receiver identifier.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            receiver: generate::receiver_id(),
            settings,
            security: SecuritySettings::default(),
            extensions: ExtensionRegistry::new(),
            behaviors: Vec::new(),
            records: MemoryStore::default(),
        }
    }

    /// Use a fixed receiver identifier, typically the identifier of the page
    /// element hosting the log on.
    #[must_use]
    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = receiver.into();
        self
    }

    /// Merge site-wide security settings. Settings are only ever
    /// strengthened.
    #[must_use]
    pub fn with_security(mut self, ambient: &SecuritySettings) -> Self {
        self.security.strengthen(ambient);
        self
    }

    /// Register a behavior. The behavior's security settings are applied
    /// immediately.
    #[must_use]
    pub fn with_behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        let mut proposed = self.security.clone();
        behavior.apply_security_settings(&mut proposed);
        self.security.strengthen(&proposed);

        self.behaviors.push(Arc::new(behavior));
        self
    }

    /// Register a client script extension.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ExtensionCollision`] if the type URI or
    /// property name is already registered.
    pub fn with_extension(
        mut self, type_uri: &str, property: &str, handler: impl ClientScriptExtension + 'static,
    ) -> Result<Self> {
        self.extensions.register(type_uri, property, handler)?;
        Ok(self)
    }

    /// Identifier of this context, echoed back in correlation state.
    #[must_use]
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Relying party settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Security settings in force: the settings merged with the ambient
    /// security settings.
    #[must_use]
    pub fn security(&self) -> SecuritySettings {
        self.settings.effective_security(&self.security)
    }

    /// Registered client script extensions.
    #[must_use]
    pub const fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub(crate) fn behaviors(&self) -> impl Iterator<Item = &Arc<dyn Behavior>> {
        self.behaviors.iter()
    }

    // Dispatch records kept when running stateless.
    pub(crate) const fn records(&self) -> &MemoryStore {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssociationPreference;

    #[derive(Debug)]
    struct Weaken;

    impl Behavior for Weaken {
        fn apply_security_settings(&self, security: &mut SecuritySettings) {
            security.association_preference = AssociationPreference::Never;
            security.require_transport_security = false;
        }
    }

    #[derive(Debug)]
    struct RequireSsl;

    impl Behavior for RequireSsl {
        fn apply_security_settings(&self, security: &mut SecuritySettings) {
            security.require_transport_security = true;
        }
    }

    #[test]
    fn behaviors_only_strengthen() {
        let ambient = SecuritySettings {
            association_preference: AssociationPreference::RequireAssociation,
            require_transport_security: false,
        };
        let ctx = Context::new(Settings::new()).with_security(&ambient).with_behavior(RequireSsl);
        assert!(ctx.security().require_transport_security);

        let ctx = ctx.with_behavior(Weaken);
        let security = ctx.security();
        assert!(security.require_transport_security);
        assert_eq!(security.association_preference, AssociationPreference::RequireAssociation);
        assert_eq!(ctx.behaviors().count(), 2);
    }

    #[test]
    fn receivers() {
        let generated = Context::new(Settings::new());
        assert!(!generated.receiver().is_empty());

        let fixed = generated.with_receiver("login-box");
        assert_eq!(fixed.receiver(), "login-box");
    }
}
