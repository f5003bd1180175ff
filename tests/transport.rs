//! Tests for handing responses back from popup and iframe windows.

mod utils;

use assert_let_bind::assert_let;
use rstest::rstest;
use test_relying_party::{ALICE, ProviderImpl, init_tracer, negative_response, positive_assertion};
use utils::{context, current_url, log_on, provider};
use vercre_rp::config::{OutOfBand, Settings, TransportPolicy};
use vercre_rp::correlation::key;
use vercre_rp::extension::JsonArgs;
use vercre_rp::request::TransportHint;
use vercre_rp::transport::{Target, Window, hand_back, is_popup_response};
use vercre_rp::{AuthRequest, Context, Dispatch, IncomingResponse, Status, build_requests, dispatch};

const SREG: &str = "http://openid.net/extensions/sreg/1.1";

fn popup_context() -> Context {
    context(Settings::new().with_transport_policy(TransportPolicy::Always))
}

async fn first_candidate(provider: &ProviderImpl, ctx: &Context) -> AuthRequest {
    build_requests(provider.clone(), ctx, &log_on(ALICE))
        .await
        .expect("should build requests")
        .next()
        .expect("should have a candidate")
}

// The popup hands the assertion to its opener, which processes it. A later
// direct delivery of the same assertion is a duplicate.
#[rstest]
#[tokio::test]
async fn popup_to_opener(provider: ProviderImpl) {
    init_tracer();

    let ctx = popup_context();
    let request = first_candidate(&provider, &ctx).await;
    assert_eq!(request.transport(), TransportHint::Popup);

    let landed = IncomingResponse::get(positive_assertion(&request, "nonce-popup"));
    assert!(is_popup_response(&landed));

    let window = Window {
        has_opener: true,
        in_frame: false,
    };
    let instructions = hand_back(&window, &landed, ctx.extensions());
    assert_eq!(instructions.target, Target::Opener);
    assert!(instructions.close_window);
    assert!(instructions.payload.starts_with("/login?"));

    let replayed = IncomingResponse::from_hand_back(&current_url(), &instructions.payload)
        .expect("should rebuild response");
    assert!(replayed.is_hand_back());
    assert!(!is_popup_response(&replayed));

    let result = dispatch(provider.clone(), &ctx, &replayed).await.expect("should dispatch");
    assert_let!(Dispatch::Processed(outcome), result);
    assert_eq!(outcome.status, Status::Authenticated);
    assert_eq!(outcome.claimed_identifier.as_deref(), Some("http://alice.example/"));

    let result = dispatch(provider.clone(), &ctx, &landed).await.expect("should dispatch");
    assert_let!(Dispatch::Duplicate(_), result);
    assert_eq!(provider.notifications().len(), 1);
}

#[rstest]
#[tokio::test]
async fn popup_without_opener(provider: ProviderImpl) {
    init_tracer();

    let ctx = popup_context();
    let request = first_candidate(&provider, &ctx).await;
    let landed = IncomingResponse::get(negative_response(&request, "cancel"));

    let instructions = hand_back(&Window::default(), &landed, ctx.extensions());
    assert_eq!(instructions.target, Target::SelfNavigate);
    assert!(!instructions.close_window);
    assert!(instructions.assignments.is_empty());
}

#[rstest]
#[tokio::test]
async fn iframe_to_parent(provider: ProviderImpl) {
    init_tracer();

    let settings = Settings::new()
        .with_transport_policy(TransportPolicy::Always)
        .with_out_of_band(OutOfBand::Iframe);
    let ctx = context(settings);
    let request = first_candidate(&provider, &ctx).await;
    assert_eq!(request.transport(), TransportHint::Iframe);

    assert_eq!(request.correlation().get(key::UI_POPUP), Some("1"));
    assert_eq!(request.correlation().get(key::POPUP_UI_SUPPORTED), None);
    assert!(request.extensions().is_empty());

    let landed = IncomingResponse::get(positive_assertion(&request, "nonce-iframe"));
    assert!(is_popup_response(&landed));

    let window = Window {
        has_opener: false,
        in_frame: true,
    };
    let instructions = hand_back(&window, &landed, ctx.extensions());
    assert_eq!(instructions.target, Target::Parent);
    assert!(!instructions.close_window);

    let replayed = IncomingResponse::from_hand_back(&current_url(), &instructions.payload)
        .expect("should rebuild response");
    let result = dispatch(provider.clone(), &ctx, &replayed).await.expect("should dispatch");
    assert_let!(Dispatch::Processed(outcome), result);
    assert_eq!(outcome.status, Status::Authenticated);
}

// Posted responses are promoted into the payload query.
#[rstest]
#[tokio::test]
async fn posted_response_promoted(provider: ProviderImpl) {
    init_tracer();

    let ctx = popup_context();
    let request = first_candidate(&provider, &ctx).await;

    let assertion = positive_assertion(&request, "nonce-posted");
    let mut base = assertion.clone();
    base.set_query(None);
    let landed = IncomingResponse::post(base, assertion.query_pairs().into_owned());
    assert!(is_popup_response(&landed));

    let window = Window {
        has_opener: true,
        in_frame: false,
    };
    let instructions = hand_back(&window, &landed, ctx.extensions());
    let replayed = IncomingResponse::from_hand_back(&current_url(), &instructions.payload)
        .expect("should rebuild response");
    assert!(replayed.form().is_empty());
    assert_eq!(replayed.params(), landed.params());
}

#[rstest]
#[tokio::test]
async fn extension_assignments(provider: ProviderImpl) {
    init_tracer();

    let ctx = popup_context().with_extension(SREG, "sreg", JsonArgs).expect("should register");
    let request = first_candidate(&provider, &ctx).await;

    let mut url = positive_assertion(&request, "nonce-sreg");
    url.query_pairs_mut()
        .append_pair("openid.ns.sreg", SREG)
        .append_pair("openid.sreg.nickname", "alice");
    let landed = IncomingResponse::get(url);

    let window = Window {
        has_opener: true,
        in_frame: false,
    };
    let instructions = hand_back(&window, &landed, ctx.extensions());
    assert_eq!(instructions.assignments.len(), 1);
    assert_eq!(instructions.assignments[0].property, "sreg");
    assert_eq!(instructions.assignments[0].value, r#"{"nickname":"alice"}"#);
}

#[rstest]
#[tokio::test]
async fn redirect_is_not_popup(provider: ProviderImpl) {
    init_tracer();

    let ctx = context(Settings::new());
    let request = first_candidate(&provider, &ctx).await;
    let landed = IncomingResponse::get(positive_assertion(&request, "nonce-redirect"));
    assert!(!is_popup_response(&landed));
}
