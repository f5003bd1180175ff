//! The persistent identifier remembers the identifier a user logged on with
//! so the host can pre-fill it next time.

use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::config::LogOnPersistence;
use crate::dispatch::record::Expire;
use crate::dispatch::{Outcome, Status};

/// Cookie name for the persistent identifier.
pub const PERSISTENT_IDENTIFIER_COOKIE: &str = "vrp_identifier";

/// A persistent identifier cookie value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentIdentifier {
    /// Cookie name.
    pub name: &'static str,

    /// Escaped identifier. Empty when clearing.
    pub value: String,

    /// When the cookie expires.
    pub expires_at: DateTime<Utc>,
}

impl PersistentIdentifier {
    /// Remember `identifier`.
    #[must_use]
    pub fn new(identifier: &str) -> Self {
        Self {
            name: PERSISTENT_IDENTIFIER_COOKIE,
            value: utf8_percent_encode(identifier, NON_ALPHANUMERIC).to_string(),
            expires_at: Utc::now() + Expire::PersistentIdentifier.duration(),
        }
    }

    /// An already-expired value, used to forget the identifier on log off.
    #[must_use]
    pub fn cleared() -> Self {
        Self {
            name: PERSISTENT_IDENTIFIER_COOKIE,
            value: String::new(),
            expires_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// The remembered identifier.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        if self.value.is_empty() {
            return None;
        }
        percent_decode_str(&self.value).decode_utf8().ok().map(|s| s.into_owned())
    }
}

impl Outcome {
    /// The identifier to remember, when the user authenticated and asked for
    /// it to be remembered. Prefers the identifier as the user typed it.
    #[must_use]
    pub fn persistent_identifier(&self) -> Option<PersistentIdentifier> {
        if self.status != Status::Authenticated
            || self.persistence != Some(LogOnPersistence::SessionAndPersistentIdentifier)
        {
            return None;
        }
        let identifier =
            self.user_supplied_identifier.as_deref().or(self.claimed_identifier.as_deref())?;
        Some(PersistentIdentifier::new(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_user_supplied() {
        let mut outcome = Outcome::new(Status::Authenticated);
        outcome.claimed_identifier = Some("http://alice.example/".to_string());
        outcome.user_supplied_identifier = Some("alice.example".to_string());
        assert!(outcome.persistent_identifier().is_none());

        outcome.persistence = Some(LogOnPersistence::SessionAndPersistentIdentifier);
        let cookie = outcome.persistent_identifier().expect("should remember");
        assert_eq!(cookie.value, "alice%2Eexample");
        assert_eq!(cookie.identifier().as_deref(), Some("alice.example"));
        assert!(cookie.expires_at > Utc::now());
    }

    #[test]
    fn not_for_failures() {
        let mut outcome = Outcome::new(Status::Failed);
        outcome.claimed_identifier = Some("http://alice.example/".to_string());
        outcome.persistence = Some(LogOnPersistence::SessionAndPersistentIdentifier);
        assert!(outcome.persistent_identifier().is_none());
    }

    #[test]
    fn cleared() {
        let cookie = PersistentIdentifier::cleared();
        assert!(cookie.identifier().is_none());
        assert!(cookie.expires_at < Utc::now());
    }
}
