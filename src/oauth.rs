//! # Token Manager
//!
//! A relying party that also acts as an `OAuth` service provider keeps
//! consumers, request tokens and access tokens in a host-supplied
//! [`TokenManager`]. The library only reads tokens and asks the manager to
//! persist changes it makes.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::{Error, Result};

/// Token manager failures.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The consumer or token does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The token store failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A registered consumer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Consumer {
    /// Consumer key.
    pub key: String,

    /// Consumer secret.
    pub secret: String,

    /// Pre-registered callback.
    pub callback: Option<Url>,
}

/// An unauthorized or authorized request token.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestToken {
    /// Token value.
    pub token: String,

    /// Key of the consumer the token was issued to.
    pub consumer_key: String,

    /// When the token was issued.
    pub created_at: DateTime<Utc>,

    /// Callback supplied with the token request.
    pub callback: Option<Url>,

    /// Verification code, set once the user authorizes the token.
    pub verification_code: Option<String>,

    /// Who authorized the token.
    pub authorized_by: Option<String>,
}

impl RequestToken {
    /// Whether the user has authorized the token.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        self.authorized_by.is_some()
    }
}

/// An access token.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// Token value.
    pub token: String,

    /// Key of the consumer the token was issued to.
    pub consumer_key: String,

    /// User the token acts for.
    pub username: String,

    /// Granted scope.
    pub scope: Vec<String>,
}

/// `TokenManager` stores consumers and tokens.
pub trait TokenManager: Send + Sync {
    /// The consumer registered under `consumer_key`.
    fn consumer(
        &self, consumer_key: &str,
    ) -> impl Future<Output = Result<Consumer, TokenError>> + Send;

    /// The request token `token`.
    fn request_token(
        &self, token: &str,
    ) -> impl Future<Output = Result<RequestToken, TokenError>> + Send;

    /// The access token `token`.
    fn access_token(
        &self, token: &str,
    ) -> impl Future<Output = Result<AccessToken, TokenError>> + Send;

    /// Persist changes made to a request token.
    fn update_token(
        &self, token: &RequestToken,
    ) -> impl Future<Output = Result<(), TokenError>> + Send;
}

/// Mark a request token as authorized by `user` and persist it.
///
/// # Errors
///
/// Returns [`Error::TokenNotFound`] if the token does not exist and
/// [`Error::ServerError`] if the token manager fails.
#[instrument(level = "debug", skip(manager))]
pub async fn authorize_request_token(
    manager: &impl TokenManager, token: &str, user: &str, verification_code: Option<String>,
) -> Result<RequestToken> {
    let mut request_token = manager.request_token(token).await.map_err(token_error)?;

    request_token.authorized_by = Some(user.to_string());
    request_token.verification_code = verification_code;
    manager.update_token(&request_token).await.map_err(token_error)?;

    Ok(request_token)
}

/// The consumer a request token was issued to.
///
/// # Errors
///
/// Returns [`Error::TokenNotFound`] if the token or its consumer does not
/// exist and [`Error::ServerError`] if the token manager fails.
#[instrument(level = "debug", skip(manager))]
pub async fn consumer_for_request_token(
    manager: &impl TokenManager, token: &str,
) -> Result<Consumer> {
    let request_token = manager.request_token(token).await.map_err(token_error)?;
    manager.consumer(&request_token.consumer_key).await.map_err(token_error)
}

/// The access token `token`, provided it was issued to `consumer_key`.
///
/// # Errors
///
/// Returns [`Error::TokenNotFound`] if the token does not exist or belongs to
/// another consumer, and [`Error::ServerError`] if the token manager fails.
#[instrument(level = "debug", skip(manager))]
pub async fn access_token_for(
    manager: &impl TokenManager, token: &str, consumer_key: &str,
) -> Result<AccessToken> {
    let access_token = manager.access_token(token).await.map_err(token_error)?;
    if access_token.consumer_key != consumer_key {
        tracing::warn!("access token presented by another consumer");
        return Err(Error::TokenNotFound(token.to_string()));
    }
    Ok(access_token)
}

fn token_error(e: TokenError) -> Error {
    match e {
        TokenError::NotFound(what) => Error::TokenNotFound(what),
        TokenError::Store(e) => Error::ServerError(format!("issue accessing token store: {e}")),
    }
}
