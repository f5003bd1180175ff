#![allow(missing_docs, dead_code)]

use rstest::fixture;
use test_relying_party::{ProviderImpl, REALM, RP_URL};
use url::Url;
use vercre_rp::config::Settings;
use vercre_rp::{BuildRequest, Context};

pub const RECEIVER: &str = "login";

#[fixture]
pub fn provider() -> ProviderImpl {
    ProviderImpl::new()
}

pub fn current_url() -> Url {
    Url::parse(RP_URL).expect("should parse")
}

pub fn context(settings: Settings) -> Context {
    Context::new(settings).with_receiver(RECEIVER)
}

pub fn log_on(identifier: &str) -> BuildRequest {
    BuildRequest::new(identifier, REALM, current_url())
}
