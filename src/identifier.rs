//! # Identifiers and Realms
//!
//! Parsing and normalization of user-supplied identifiers and of the realm
//! (trust root) a relying party asks the user to trust.

use std::fmt::{self, Display};
use std::str::FromStr;

use url::Url;

use crate::{Error, Result};

const XRI_GLOBAL_CONTEXT: [char; 6] = ['=', '@', '+', '$', '!', '('];

/// A normalized user-supplied identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identifier {
    original: String,
    normalized: String,
    xri: bool,
}

impl Identifier {
    /// Parse and normalize a user-supplied identifier. URL identifiers without
    /// a scheme are assumed to be `http` and lose any fragment. XRIs are kept
    /// as typed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the identifier is empty or is
    /// not a valid HTTP(S) URL or XRI.
    pub fn parse(identifier: &str) -> Result<Self> {
        let original = identifier.trim();
        if original.is_empty() {
            return Err(Error::InvalidIdentifier("identifier is empty".to_string()));
        }

        let xri = original.strip_prefix("xri://").unwrap_or(original);
        if xri.starts_with(XRI_GLOBAL_CONTEXT) {
            return Ok(Self {
                original: original.to_string(),
                normalized: xri.to_string(),
                xri: true,
            });
        }

        let candidate = if original.contains("://") {
            original.to_string()
        } else {
            format!("http://{original}")
        };
        let mut url = Url::parse(&candidate)
            .map_err(|e| Error::InvalidIdentifier(format!("{original}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::InvalidIdentifier(format!("{original}: not an HTTP URL")));
        }
        url.set_fragment(None);

        Ok(Self {
            original: original.to_string(),
            normalized: url.to_string(),
            xri: false,
        })
    }

    /// The identifier as the user typed it.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Whether the identifier is an XRI.
    #[must_use]
    pub const fn is_xri(&self) -> bool {
        self.xri
    }

    /// Whether the identifier is an HTTPS URL.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        !self.xri && self.normalized.starts_with("https://")
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// The realm (trust root) presented to the provider. A realm may use a
/// wildcard host (`https://*.example.com/`) to cover subdomains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Realm {
    url: Url,
    wildcard: bool,
}

impl Realm {
    /// Parse an absolute realm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRealm`] if the realm is not an absolute HTTP(S)
    /// URL or carries a fragment.
    pub fn parse(realm: &str) -> Result<Self> {
        let (wildcard, stripped) = match realm.split_once("://*.") {
            Some((scheme, rest)) => (true, format!("{scheme}://{rest}")),
            None => (false, realm.to_string()),
        };

        let url = Url::parse(&stripped).map_err(|e| Error::InvalidRealm(format!("{realm}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::InvalidRealm(format!("{realm}: not an HTTP URL")));
        }
        if url.fragment().is_some() {
            return Err(Error::InvalidRealm(format!("{realm}: fragment not allowed")));
        }

        Ok(Self { url, wildcard })
    }

    /// Resolve a realm for a request. `~/` realms are relative to the root of
    /// the current URL. The resolved realm takes the scheme and port of the
    /// return URL so a site served on several ports stays consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRealm`] if the realm cannot be parsed or
    /// resolved.
    pub fn resolve(realm: &str, current: &Url, return_to: &Url) -> Result<Self> {
        let absolute = match realm.strip_prefix("~/") {
            Some(path) => current
                .join(&format!("/{path}"))
                .map_err(|e| Error::InvalidRealm(format!("{realm}: {e}")))?
                .to_string(),
            None => realm.to_string(),
        };

        let mut resolved = Self::parse(&absolute)?;
        resolved
            .url
            .set_scheme(return_to.scheme())
            .map_err(|()| Error::InvalidRealm(format!("{realm}: cannot use scheme")))?;
        resolved
            .url
            .set_port(return_to.port())
            .map_err(|()| Error::InvalidRealm(format!("{realm}: cannot use port")))?;

        Ok(resolved)
    }

    /// Whether `return_to` falls under this realm: same scheme and port, a
    /// matching host (or subdomain for wildcard realms), and a path at or
    /// below the realm's path.
    #[must_use]
    pub fn contains(&self, return_to: &Url) -> bool {
        if self.url.scheme() != return_to.scheme()
            || self.url.port_or_known_default() != return_to.port_or_known_default()
        {
            return false;
        }

        let host = self.url.host_str().unwrap_or_default().to_ascii_lowercase();
        let candidate = return_to.host_str().unwrap_or_default().to_ascii_lowercase();
        let host_matches =
            candidate == host || (self.wildcard && candidate.ends_with(&format!(".{host}")));
        if !host_matches {
            return false;
        }

        let path = self.url.path();
        let candidate = return_to.path();
        if path.ends_with('/') {
            candidate.starts_with(path)
        } else {
            candidate == path || candidate.starts_with(&format!("{path}/"))
        }
    }

    /// Whether the realm is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }
}

impl Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.wildcard {
            return f.write_str(self.url.as_str());
        }
        let host = self.url.host_str().unwrap_or_default();
        write!(f, "{}://*.{host}", self.url.scheme())?;
        if let Some(port) = self.url.port() {
            write!(f, ":{port}")?;
        }
        f.write_str(self.url.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("should parse")
    }

    #[test]
    fn normalizes_identifiers() {
        let id = Identifier::parse(" alice.example ").expect("should parse");
        assert_eq!(id.as_str(), "http://alice.example/");
        assert_eq!(id.original(), "alice.example");
        assert!(!id.is_secure());

        let id: Identifier = "https://alice.example/me#frag".parse().expect("should parse");
        assert_eq!(id.to_string(), "https://alice.example/me");
        assert!(id.is_secure());

        let id = Identifier::parse("=alice").expect("should parse");
        assert!(id.is_xri());
        assert_eq!(id.as_str(), "=alice");
    }

    #[test]
    fn rejects_identifiers() {
        assert!(matches!(Identifier::parse("   "), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(Identifier::parse("ftp://alice.example"), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(Identifier::parse("http://"), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn realm_takes_return_scheme_and_port() {
        let current = url("https://rp.example:8443/login");
        let realm =
            Realm::resolve("http://rp.example/", &current, &current).expect("should resolve");
        assert_eq!(realm.to_string(), "https://rp.example:8443/");
        assert!(realm.contains(&current));
    }

    #[test]
    fn relative_realm() {
        let current = url("https://rp.example/app/login?x=1");
        let realm = Realm::resolve("~/app/", &current, &current).expect("should resolve");
        assert_eq!(realm.to_string(), "https://rp.example/app/");
        assert!(realm.contains(&current));
        assert!(!realm.contains(&url("https://rp.example/other")));
    }

    #[test]
    fn wildcard_realm() {
        let realm = Realm::parse("https://*.rp.example/").expect("should parse");
        assert_eq!(realm.to_string(), "https://*.rp.example/");
        assert!(realm.contains(&url("https://www.rp.example/login")));
        assert!(realm.contains(&url("https://rp.example/login")));
        assert!(!realm.contains(&url("https://evilrp.example/login")));
        assert!(!realm.contains(&url("http://www.rp.example/login")));
    }

    #[test]
    fn invalid_realm() {
        assert!(matches!(Realm::parse("rp.example"), Err(Error::InvalidRealm(_))));
        assert!(matches!(Realm::parse("https://rp.example/#x"), Err(Error::InvalidRealm(_))));
    }
}
