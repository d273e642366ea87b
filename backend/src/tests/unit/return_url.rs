use idp_initiated_shared::{IdentityProviderConfig, MetadataSource, RedirectTargetResolver, ResolvedTarget};

use crate::auth::return_url::{select_return_location, AcsRequestContext, ReturnLocationSource};

fn idp(relay_state_used_as_return_url: bool) -> IdentityProviderConfig {
    IdentityProviderConfig {
        entity_id: "https://idp.example/Metadata".to_string(),
        display_name: None,
        metadata: MetadataSource::default(),
        allow_unsolicited_authn_response: true,
        relay_state_used_as_return_url,
    }
}

fn target(resolver: &RedirectTargetResolver, value: &str) -> ResolvedTarget {
    resolver.resolve(Some(value)).unwrap()
}

#[test]
fn test_default_when_nothing_supplied() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");

    let selected = select_return_location(&resolver, &default, &idp(true), &AcsRequestContext::default());
    assert_eq!(selected.location.as_str(), "/");
    assert_eq!(selected.source, ReturnLocationSource::Default);
}

#[test]
fn test_pending_request_return_url() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");
    let pending = target(&resolver, "/Home/Secure");

    let ctx = AcsRequestContext {
        pending_return_url: Some(&pending),
        relay_state: Some("0f8fad5bd9cb469fa16570867728950e"),
        ..Default::default()
    };
    let selected = select_return_location(&resolver, &default, &idp(true), &ctx);
    assert_eq!(selected.location.as_str(), "/Home/Secure");
    assert_eq!(selected.source, ReturnLocationSource::PendingRequest);
}

#[test]
fn test_relay_state_honoured_only_when_configured() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");
    let ctx = AcsRequestContext {
        relay_state: Some("/Home/Secure?tab=1"),
        ..Default::default()
    };

    let selected = select_return_location(&resolver, &default, &idp(true), &ctx);
    assert_eq!(selected.location.as_str(), "/Home/Secure?tab=1");
    assert_eq!(selected.source, ReturnLocationSource::RelayState);

    let selected = select_return_location(&resolver, &default, &idp(false), &ctx);
    assert_eq!(selected.source, ReturnLocationSource::Default);
}

#[test]
fn test_unsafe_relay_state_falls_back_to_default() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");

    for relay_state in ["https://evil.example/", "//evil.example", "/\\evil.example", "javascript:alert(1)"] {
        let ctx = AcsRequestContext {
            relay_state: Some(relay_state),
            ..Default::default()
        };
        let selected = select_return_location(&resolver, &default, &idp(true), &ctx);
        assert_eq!(selected.source, ReturnLocationSource::Default, "{}", relay_state);
        assert_eq!(selected.location.as_str(), "/");
    }
}

#[test]
fn test_target_takes_precedence() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");
    let pending = target(&resolver, "/Home/Secure");

    let ctx = AcsRequestContext {
        target: Some("/reports?year=2024"),
        relay_state: Some("/Home"),
        pending_return_url: Some(&pending),
    };
    let selected = select_return_location(&resolver, &default, &idp(true), &ctx);
    assert_eq!(selected.location.as_str(), "/reports?year=2024");
    assert_eq!(selected.source, ReturnLocationSource::Target);
}

#[test]
fn test_unsafe_target_is_ignored_not_fatal() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");
    let pending = target(&resolver, "/Home/Secure");

    let ctx = AcsRequestContext {
        target: Some("//evil.example/phish"),
        pending_return_url: Some(&pending),
        ..Default::default()
    };
    let selected = select_return_location(&resolver, &default, &idp(false), &ctx);
    assert_eq!(selected.location.as_str(), "/Home/Secure");
    assert_eq!(selected.source, ReturnLocationSource::PendingRequest);
}

#[test]
fn test_empty_target_is_absent() {
    let resolver = RedirectTargetResolver::new();
    let default = target(&resolver, "/");

    let ctx = AcsRequestContext {
        target: Some(""),
        relay_state: Some("/Home"),
        ..Default::default()
    };
    let selected = select_return_location(&resolver, &default, &idp(true), &ctx);
    assert_eq!(selected.source, ReturnLocationSource::RelayState);
}

#[test]
fn test_base_path_scopes_candidates() {
    let resolver = RedirectTargetResolver::new().with_base_path("/app");
    let default = target(&resolver, "/app");

    let ctx = AcsRequestContext {
        target: Some("/other/page"),
        relay_state: Some("/app/reports"),
        ..Default::default()
    };
    let selected = select_return_location(&resolver, &default, &idp(true), &ctx);
    assert_eq!(selected.location.as_str(), "/app/reports");
    assert_eq!(selected.source, ReturnLocationSource::RelayState);
}
