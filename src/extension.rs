//! # Extensions
//!
//! Extension arguments carried in `OpenID` messages and the registry of
//! client script extensions. A registered extension is recognized when
//! classifying assertions and, for positive assertions, has its arguments
//! handed back to the opener or parent window as a named property.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde::Serialize;

use crate::{Error, Result};

const NS_PREFIX: &str = "openid.ns.";

/// Turns extension arguments from a positive assertion into the value
/// assigned to the extension's script property.
pub trait ClientScriptExtension: Debug + Send + Sync {
    /// The property value, or `None` to leave the property unset.
    fn initialize(&self, args: &BTreeMap<String, String>) -> Option<String>;
}

/// Assigns the extension arguments as a JSON object.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonArgs;

impl ClientScriptExtension for JsonArgs {
    fn initialize(&self, args: &BTreeMap<String, String>) -> Option<String> {
        serde_json::to_string(args).ok()
    }
}

/// A property assignment handed back with an out-of-band response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// Script property name.
    pub property: String,

    /// Value assigned to the property.
    pub value: String,
}

#[derive(Clone, Debug)]
struct Registration {
    property: String,
    handler: Arc<dyn ClientScriptExtension>,
}

/// Registry of client script extensions, keyed by extension type URI.
#[derive(Clone, Debug, Default)]
pub struct ExtensionRegistry {
    registrations: BTreeMap<String, Registration>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `type_uri`, exposed as `property`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtensionCollision`] if the type URI or the property
    /// name is already registered, or the property name is empty.
    pub fn register(
        &mut self, type_uri: &str, property: &str, handler: impl ClientScriptExtension + 'static,
    ) -> Result<()> {
        if property.is_empty() {
            return Err(Error::ExtensionCollision("property name is empty".to_string()));
        }
        if self.registrations.contains_key(type_uri) {
            return Err(Error::ExtensionCollision(format!("{type_uri} already registered")));
        }
        if self.registrations.values().any(|r| r.property == property) {
            return Err(Error::ExtensionCollision(format!("property {property} already used")));
        }

        self.registrations.insert(
            type_uri.to_string(),
            Registration {
                property: property.to_string(),
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Whether a handler is registered for `type_uri`.
    #[must_use]
    pub fn is_registered(&self, type_uri: &str) -> bool {
        self.registrations.contains_key(type_uri)
    }

    /// Whether any of the extensions present is registered.
    #[must_use]
    pub fn recognizes_any<'a>(&self, type_uris: impl IntoIterator<Item = &'a String>) -> bool {
        type_uris.into_iter().any(|t| self.is_registered(t))
    }

    /// Property assignments for every registered extension present in the
    /// response parameters.
    #[must_use]
    pub fn assignments(&self, params: &BTreeMap<String, String>) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        for (type_uri, registration) in &self.registrations {
            let Some(args) = extension_args(params, type_uri) else {
                continue;
            };
            if let Some(value) = registration.handler.initialize(&args) {
                assignments.push(Assignment {
                    property: registration.property.clone(),
                    value,
                });
            }
        }
        assignments
    }
}

/// The arguments of the extension with `type_uri`, found via its
/// `openid.ns.<alias>` declaration.
#[must_use]
pub fn extension_args(
    params: &BTreeMap<String, String>, type_uri: &str,
) -> Option<BTreeMap<String, String>> {
    let alias = params.iter().find_map(|(k, v)| {
        let alias = k.strip_prefix(NS_PREFIX)?;
        (v == type_uri).then_some(alias)
    })?;

    let prefix = format!("openid.{alias}.");
    let args = params
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|name| (name.to_string(), v.clone())))
        .collect();
    Some(args)
}

/// Every extension declared in the parameters, keyed by type URI.
#[must_use]
pub fn extensions(params: &BTreeMap<String, String>) -> BTreeMap<String, BTreeMap<String, String>> {
    params
        .iter()
        .filter(|(k, _)| k.starts_with(NS_PREFIX))
        .filter_map(|(_, type_uri)| {
            extension_args(params, type_uri).map(|args| (type_uri.clone(), args))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SREG: &str = "http://openid.net/extensions/sreg/1.1";

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("openid.mode".to_string(), "id_res".to_string()),
            ("openid.ns.sreg".to_string(), SREG.to_string()),
            ("openid.sreg.nickname".to_string(), "alice".to_string()),
            ("openid.sreg.email".to_string(), "alice@example.com".to_string()),
        ])
    }

    #[test]
    fn finds_args_by_alias() {
        let args = extension_args(&params(), SREG).expect("should find extension");
        assert_eq!(args.get("nickname").map(String::as_str), Some("alice"));
        assert_eq!(args.len(), 2);

        assert!(extension_args(&params(), "http://openid.net/srv/ax/1.0").is_none());
        assert_eq!(extensions(&params()).len(), 1);
    }

    #[test]
    fn collisions() {
        let mut registry = ExtensionRegistry::new();
        registry.register(SREG, "sreg", JsonArgs).expect("should register");

        let err = registry.register(SREG, "other", JsonArgs).expect_err("type collision");
        assert!(matches!(err, Error::ExtensionCollision(_)));

        let err =
            registry.register("http://openid.net/srv/ax/1.0", "sreg", JsonArgs).expect_err("name");
        assert!(matches!(err, Error::ExtensionCollision(_)));
    }

    #[test]
    fn assigns_registered_only() {
        let mut registry = ExtensionRegistry::new();
        registry.register(SREG, "sreg", JsonArgs).expect("should register");
        registry.register("http://openid.net/srv/ax/1.0", "ax", JsonArgs).expect("should register");

        let assignments = registry.assignments(&params());
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].property, "sreg");
        assert_eq!(assignments[0].value, r#"{"email":"alice@example.com","nickname":"alice"}"#);
    }
}
