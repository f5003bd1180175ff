//! Tests for the discovery result document.

mod utils;

use rstest::rstest;
use test_relying_party::{ALICE, ASSOC_HANDLE, BROKEN, NOBODY, ProviderImpl, init_tracer};
use url::Url;
use utils::{context, log_on, provider};
use vercre_rp::config::Settings;
use vercre_rp::endpoint::well_known;
use vercre_rp::discovery_result;

#[rstest]
#[tokio::test]
async fn candidates_as_url_pairs(provider: ProviderImpl) {
    init_tracer();

    let ctx = context(Settings::new());
    let result = discovery_result(provider, &ctx, &log_on(ALICE)).await;

    assert_eq!(result.error, None);
    assert_eq!(result.claimed_identifier.as_deref(), Some("http://alice.example/"));
    assert_eq!(result.requests.len(), 2);

    let first = &result.requests[0];
    assert_eq!(first.endpoint, "https://op1.example/server");

    let immediate = Url::parse(&first.immediate).expect("should parse");
    assert!(immediate.query_pairs().any(|(k, v)| k == "openid.mode" && v == "checkid_immediate"));
    assert!(immediate.query_pairs().any(|(k, v)| k == "openid.assoc_handle" && v == ASSOC_HANDLE));

    let setup = Url::parse(&first.setup).expect("should parse");
    assert!(setup.query_pairs().any(|(k, v)| k == "openid.mode" && v == "checkid_setup"));

    let json = serde_json::to_value(&result).expect("should serialize");
    assert!(json.get("claimedIdentifier").is_some());
}

#[rstest]
#[tokio::test]
async fn op_identifier(provider: ProviderImpl) {
    init_tracer();

    let ctx = context(Settings::new());
    let result = discovery_result(provider, &ctx, &log_on(well_known::GOOGLE)).await;

    assert_eq!(result.error, None);
    assert_eq!(result.claimed_identifier, None);
    assert_eq!(result.requests.len(), 1);
    assert_eq!(result.requests[0].endpoint, "https://www.google.com/accounts/o8/ud");
}

#[rstest]
#[case::not_found(NOBODY, "no OpenID endpoint found")]
#[case::transport(BROKEN, "discovery")]
#[tokio::test]
async fn errors_reported(provider: ProviderImpl, #[case] identifier: &str, #[case] error: &str) {
    init_tracer();

    let ctx = context(Settings::new());
    let result = discovery_result(provider, &ctx, &log_on(identifier)).await;

    assert!(result.requests.is_empty());
    let message = result.error.expect("should report error");
    assert!(message.contains(error), "unexpected error: {message}");
}
