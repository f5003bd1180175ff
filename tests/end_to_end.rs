//! Log on from identifier entry through to a processed assertion.

mod utils;

use assert_let_bind::assert_let;
use insta::assert_yaml_snapshot as assert_snapshot;
use rstest::rstest;
use test_relying_party::{ALICE, ProviderImpl, init_tracer, positive_assertion};
use utils::{RECEIVER, context, log_on, provider};
use vercre_rp::config::Settings;
use vercre_rp::request::OutgoingMessage;
use vercre_rp::{AuthRequest, Dispatch, IncomingResponse, Status, build_requests, dispatch};

#[rstest]
#[tokio::test]
async fn log_on_with_first_provider(provider: ProviderImpl) {
    init_tracer();

    let ctx = context(Settings::new());
    let candidates: Vec<AuthRequest> = build_requests(provider.clone(), &ctx, &log_on(ALICE))
        .await
        .expect("should build requests")
        .collect();
    let indices: Vec<_> = candidates.iter().map(AuthRequest::index).collect();
    assert_eq!(indices, vec![Some(0), Some(1)]);

    let request = candidates[0].clone();
    let outgoing = request.clone().transmit(&provider, 2048).await.expect("should transmit");
    assert_let!(OutgoingMessage::Redirect(_), outgoing);

    // op1 authenticates alice and redirects back
    let response = IncomingResponse::get(positive_assertion(&request, "2026-10-19T00:00:00Zabc"));

    let result = dispatch(provider.clone(), &ctx, &response).await.expect("should dispatch");
    assert_let!(Dispatch::Processed(outcome), result);
    assert_snapshot!(outcome, @r###"
    status: Authenticated
    claimedIdentifier: "http://alice.example/"
    userSuppliedIdentifier: alice.example
    providerEndpoint: "https://op1.example/server"
    index: 0
    persistence: Session
    "###);

    let notifications = provider.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].id, RECEIVER);
    assert_eq!(notifications[0].index, Some(0));
    assert_eq!(provider.verifications(), 1);

    // the browser replays the redirect
    let result = dispatch(provider.clone(), &ctx, &response).await.expect("should dispatch");
    assert_let!(Dispatch::Duplicate(cached), result);
    assert_eq!(cached.status, Status::Authenticated);
    assert_eq!(cached.claimed_identifier.as_deref(), Some("http://alice.example/"));

    assert_eq!(provider.notifications().len(), 1);
    assert_eq!(provider.verifications(), 1);
}
