//! Tests for request and access token handling.

mod utils;

use assert_let_bind::assert_let;
use rstest::rstest;
use test_relying_party::{ACCESS_TOKEN, CONSUMER_KEY, ProviderImpl, REQUEST_TOKEN, init_tracer};
use utils::provider;
use vercre_rp::Error;
use vercre_rp::oauth::{access_token_for, authorize_request_token, consumer_for_request_token};

#[rstest]
#[tokio::test]
async fn authorize(provider: ProviderImpl) {
    init_tracer();

    let before = provider.stored_request_token(REQUEST_TOKEN).expect("should exist");
    assert!(!before.is_authorized());

    let token =
        authorize_request_token(&provider, REQUEST_TOKEN, "alice", Some("verifier-1".to_string()))
            .await
            .expect("should authorize");
    assert!(token.is_authorized());

    let stored = provider.stored_request_token(REQUEST_TOKEN).expect("should exist");
    assert_eq!(stored.authorized_by.as_deref(), Some("alice"));
    assert_eq!(stored.verification_code.as_deref(), Some("verifier-1"));

    let err = authorize_request_token(&provider, "unknown", "alice", None)
        .await
        .expect_err("should fail");
    assert_eq!(err, Error::TokenNotFound("unknown".to_string()));
}

#[rstest]
#[tokio::test]
async fn consumer_lookup(provider: ProviderImpl) {
    init_tracer();

    let consumer =
        consumer_for_request_token(&provider, REQUEST_TOKEN).await.expect("should find consumer");
    assert_eq!(consumer.key, CONSUMER_KEY);

    let err = consumer_for_request_token(&provider, "unknown").await.expect_err("should fail");
    assert_let!(Error::TokenNotFound(_), err);
}

#[rstest]
#[tokio::test]
async fn access_token_belongs_to_consumer(provider: ProviderImpl) {
    init_tracer();

    let token =
        access_token_for(&provider, ACCESS_TOKEN, CONSUMER_KEY).await.expect("should find token");
    assert_eq!(token.username, "alice");

    let err = access_token_for(&provider, ACCESS_TOKEN, "another-consumer")
        .await
        .expect_err("should fail");
    assert_eq!(err, Error::TokenNotFound(ACCESS_TOKEN.to_string()));
}
