//! # Test Relying Party
//!
//! In-memory provider trait implementations used by the relying party
//! integration tests, plus helpers for simulating provider responses.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use url::Url;
use vercre_rp::AuthRequest;
use vercre_rp::config::AssociationPreference;
use vercre_rp::dispatch::DispatchRecord;
use vercre_rp::endpoint::ProviderEndpoint;
use vercre_rp::extension;
use vercre_rp::identifier::Identifier;
use vercre_rp::oauth::{AccessToken, Consumer, RequestToken, TokenError, TokenManager};
use vercre_rp::provider::{
    Callback, Channel, Discovery, DiscoveryError, DispatchStore, Payload, Provider, Verdict,
    Verification,
};
use vercre_rp::request::IndirectMessage;

pub const RP_URL: &str = "https://rp.example/login";
pub const REALM: &str = "https://rp.example/";
pub const ALICE: &str = "alice.example";
pub const BOB: &str = "https://bob.example/";
pub const NOBODY: &str = "nobody.example";
pub const BROKEN: &str = "broken.example";
pub const SIGNATURE: &str = "valid-signature";
pub const ASSOC_HANDLE: &str = "assoc-1";
pub const CONSUMER_KEY: &str = "consumer-1";
pub const REQUEST_TOKEN: &str = "request-token-1";
pub const ACCESS_TOKEN: &str = "access-token-1";

// initalise tracing once for all tests
static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be set.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

#[derive(Deserialize)]
struct Fixture {
    identifier: String,
    endpoints: Vec<EndpointFixture>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointFixture {
    claimed_identifier: String,
    endpoint: String,
    types: Vec<String>,
    local_identifier: Option<String>,
}

#[derive(Default, Clone, Debug)]
pub struct ProviderImpl {
    discovery: Arc<Mutex<HashMap<String, Vec<ProviderEndpoint>>>>,
    records: Arc<Mutex<HashMap<String, DispatchRecord>>>,
    nonces: Arc<Mutex<HashMap<String, String>>>,
    notifications: Arc<Mutex<Vec<Payload>>>,
    verifications: Arc<AtomicUsize>,
    consumers: Arc<Mutex<HashMap<String, Consumer>>>,
    request_tokens: Arc<Mutex<HashMap<String, RequestToken>>>,
    access_tokens: Arc<Mutex<HashMap<String, AccessToken>>>,
}

impl ProviderImpl {
    #[must_use]
    pub fn new() -> Self {
        let json = include_bytes!("../data/discovery.json");
        let fixtures: Vec<Fixture> = serde_json::from_slice(json).expect("should deserialize");

        let mut discovery = HashMap::new();
        for fixture in fixtures {
            let endpoints = fixture
                .endpoints
                .into_iter()
                .map(|ep| {
                    let endpoint =
                        ProviderEndpoint::new(ep.claimed_identifier, &ep.endpoint, ep.types)
                            .expect("should be valid");
                    match ep.local_identifier {
                        Some(local) => endpoint.with_local_identifier(local),
                        None => endpoint,
                    }
                })
                .collect();
            discovery.insert(fixture.identifier, endpoints);
        }

        let consumer = Consumer {
            key: CONSUMER_KEY.to_string(),
            secret: "consumer-secret".to_string(),
            callback: None,
        };
        let request_token = RequestToken {
            token: REQUEST_TOKEN.to_string(),
            consumer_key: CONSUMER_KEY.to_string(),
            created_at: Utc::now(),
            callback: None,
            verification_code: None,
            authorized_by: None,
        };
        let access_token = AccessToken {
            token: ACCESS_TOKEN.to_string(),
            consumer_key: CONSUMER_KEY.to_string(),
            username: "alice".to_string(),
            scope: vec!["profile".to_string()],
        };

        Self {
            discovery: Arc::new(Mutex::new(discovery)),
            consumers: Arc::new(Mutex::new(HashMap::from([(CONSUMER_KEY.to_string(), consumer)]))),
            request_tokens: Arc::new(Mutex::new(HashMap::from([(
                REQUEST_TOKEN.to_string(),
                request_token,
            )]))),
            access_tokens: Arc::new(Mutex::new(HashMap::from([(
                ACCESS_TOKEN.to_string(),
                access_token,
            )]))),
            ..Self::default()
        }
    }

    /// Notifications received by the callback, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Payload> {
        self.notifications.lock().expect("should lock").clone()
    }

    /// Number of times the channel verified a response.
    #[must_use]
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }

    /// A stored request token.
    #[must_use]
    pub fn stored_request_token(&self, token: &str) -> Option<RequestToken> {
        self.request_tokens.lock().expect("should lock").get(token).cloned()
    }
}

impl Provider for ProviderImpl {}

impl Discovery for ProviderImpl {
    async fn discover(
        &self, identifier: &Identifier,
    ) -> Result<Vec<ProviderEndpoint>, DiscoveryError> {
        if identifier.as_str().contains(BROKEN) {
            return Err(DiscoveryError::Transport("connection reset".to_string()));
        }
        let discovery = self.discovery.lock().expect("should lock");
        discovery.get(identifier.as_str()).cloned().ok_or(DiscoveryError::NotFound)
    }
}

impl Channel for ProviderImpl {
    async fn sign(
        &self, message: &mut IndirectMessage, association: AssociationPreference,
    ) -> Result<()> {
        if association != AssociationPreference::Never {
            message.fields.insert("openid.assoc_handle".to_string(), ASSOC_HANDLE.to_string());
        }
        Ok(())
    }

    async fn verify(&self, params: &BTreeMap<String, String>) -> Result<Verification> {
        // let concurrent dispatches interleave
        tokio::task::yield_now().await;
        self.verifications.fetch_add(1, Ordering::SeqCst);

        let get = |k: &str| params.get(k).cloned();
        let verdict = match params.get("openid.mode").map(String::as_str) {
            Some("id_res") if params.contains_key("openid.user_setup_url") => Verdict::SetupRequired,
            Some("id_res") if get("openid.sig").as_deref() == Some(SIGNATURE) => {
                Verdict::Authenticated
            }
            Some("id_res" | "error") => Verdict::Failed,
            Some("cancel") => Verdict::Canceled,
            Some("setup_needed") => Verdict::SetupRequired,
            Some(_) | None => Verdict::Unclassified,
        };

        Ok(Verification {
            verdict,
            claimed_identifier: get("openid.claimed_id").or_else(|| get("openid.identity")),
            nonce: get("openid.response_nonce"),
            extensions: extension::extensions(params),
        })
    }

    async fn detect_replay(&self, nonce: &str, fingerprint: &str) -> Result<bool> {
        let mut nonces = self.nonces.lock().expect("should lock");
        let seen = nonces.entry(nonce.to_string()).or_insert_with(|| fingerprint.to_string());
        Ok(seen.as_str() != fingerprint)
    }
}

impl DispatchStore for ProviderImpl {
    async fn get(&self, fingerprint: &str) -> Result<Option<DispatchRecord>> {
        Ok(self.records.lock().expect("should lock").get(fingerprint).cloned())
    }

    async fn put_if_absent(
        &self, record: &DispatchRecord, _expiry: DateTime<Utc>,
    ) -> Result<Option<DispatchRecord>> {
        tokio::task::yield_now().await;
        let mut records = self.records.lock().expect("should lock");
        if let Some(existing) = records.get(&record.fingerprint) {
            return Ok(Some(existing.clone()));
        }
        records.insert(record.fingerprint.clone(), record.clone());
        Ok(None)
    }
}

impl Callback for ProviderImpl {
    async fn callback(&self, pl: &Payload) -> Result<()> {
        self.notifications.lock().expect("should lock").push(pl.clone());
        Ok(())
    }
}

impl TokenManager for ProviderImpl {
    async fn consumer(&self, consumer_key: &str) -> Result<Consumer, TokenError> {
        self.consumers
            .lock()
            .map_err(|e| anyhow!("{e}"))?
            .get(consumer_key)
            .cloned()
            .ok_or_else(|| TokenError::NotFound(consumer_key.to_string()))
    }

    async fn request_token(&self, token: &str) -> Result<RequestToken, TokenError> {
        self.request_tokens
            .lock()
            .map_err(|e| anyhow!("{e}"))?
            .get(token)
            .cloned()
            .ok_or_else(|| TokenError::NotFound(token.to_string()))
    }

    async fn access_token(&self, token: &str) -> Result<AccessToken, TokenError> {
        self.access_tokens
            .lock()
            .map_err(|e| anyhow!("{e}"))?
            .get(token)
            .cloned()
            .ok_or_else(|| TokenError::NotFound(token.to_string()))
    }

    async fn update_token(&self, token: &RequestToken) -> Result<(), TokenError> {
        let mut tokens = self.request_tokens.lock().map_err(|e| anyhow!("{e}"))?;
        if !tokens.contains_key(&token.token) {
            return Err(TokenError::NotFound(token.token.clone()));
        }
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }
}

/// The return URL, correlation state included, a provider would send its
/// response to.
#[must_use]
pub fn return_to(request: &AuthRequest) -> Url {
    let message = request.to_message();
    let return_to = message.fields.get("openid.return_to").expect("should have return_to");
    Url::parse(return_to).expect("should parse")
}

/// A signed positive assertion for `request`, as the provider would redirect
/// it.
#[must_use]
pub fn positive_assertion(request: &AuthRequest, nonce: &str) -> Url {
    let return_to = return_to(request);
    let endpoint = request.endpoint();

    let mut url = return_to.clone();
    url.query_pairs_mut()
        .append_pair("openid.ns", "http://specs.openid.net/auth/2.0")
        .append_pair("openid.mode", "id_res")
        .append_pair("openid.op_endpoint", endpoint.provider_endpoint().as_str())
        .append_pair("openid.claimed_id", endpoint.claimed_identifier())
        .append_pair("openid.identity", endpoint.provider_local_identifier())
        .append_pair("openid.return_to", return_to.as_str())
        .append_pair("openid.response_nonce", nonce)
        .append_pair("openid.sig", SIGNATURE);
    url
}

/// A negative response for `request` with the given `openid.mode`.
#[must_use]
pub fn negative_response(request: &AuthRequest, mode: &str) -> Url {
    let mut url = return_to(request);
    url.query_pairs_mut()
        .append_pair("openid.ns", "http://specs.openid.net/auth/2.0")
        .append_pair("openid.mode", mode);
    url
}
