use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use idp_initiated_shared::{IdentityProviderConfig, MetadataSource};

use crate::auth::providers::{parse_idp_metadata, IdentityProviderRegistry, ProviderError};
use crate::tests::fixtures::*;
use crate::tests::{init_test_logging, test_config};

fn load_record(entity_id: &str, location: &str) -> IdentityProviderConfig {
    IdentityProviderConfig {
        entity_id: entity_id.to_string(),
        display_name: Some("Remote IdP".to_string()),
        metadata: MetadataSource::Load {
            location: Some(location.to_string()),
        },
        allow_unsolicited_authn_response: true,
        relay_state_used_as_return_url: false,
    }
}

#[tokio::test]
async fn test_load_from_configuration_file() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let records = write_identity_providers(dir.path());
    let json = serde_json::to_string(&records).unwrap();
    let config_path = dir.path().join("identity_providers.json");
    std::fs::write(&config_path, json).unwrap();

    let config = test_config(dir.path(), &[]);
    let registry = IdentityProviderRegistry::load(&config_path, &config.sp, &reqwest::Client::new())
        .await
        .unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.default_provider().unwrap().entity_id(), IDP_ONE);
    assert_eq!(registry.get(IDP_TWO).unwrap().entity_id(), IDP_TWO);
}

#[tokio::test]
async fn test_lookup_is_exact() {
    let dir = TempDir::new().unwrap();
    let records = write_identity_providers(dir.path());
    let config = test_config(dir.path(), &[]);
    let registry = IdentityProviderRegistry::from_records(records, &config.sp, &reqwest::Client::new())
        .await
        .unwrap();

    let two = registry.get(IDP_TWO).unwrap();
    assert!(!two.config.allow_unsolicited_authn_response);
    assert_eq!(two.sso_location().as_deref(), Some(IDP_TWO_SSO));

    assert!(registry.get(&IDP_ONE.to_uppercase()).is_none());
    assert!(registry.get(&format!("{}/", IDP_ONE)).is_none());
    assert!(registry.get("").is_none());
}

#[tokio::test]
async fn test_metadata_fetched_over_http() {
    let server = MockServer::start().await;
    let entity_id = "https://remote-idp.example/Metadata";
    Mock::given(method("GET"))
        .and(path("/metadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(idp_metadata_xml(entity_id, "https://remote-idp.example/sso")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let record = load_record(entity_id, &format!("{}/metadata", server.uri()));

    let registry = IdentityProviderRegistry::from_records(vec![record], &config.sp, &reqwest::Client::new())
        .await
        .unwrap();

    let provider = registry.get(entity_id).unwrap();
    assert_eq!(provider.sso_location().as_deref(), Some("https://remote-idp.example/sso"));
}

#[tokio::test]
async fn test_metadata_fetch_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let record = load_record("https://remote-idp.example/Metadata", &format!("{}/metadata", server.uri()));

    let result =
        IdentityProviderRegistry::from_records(vec![record], &config.sp, &reqwest::Client::new()).await;
    assert!(matches!(result, Err(ProviderError::Fetch { .. })));
}

#[tokio::test]
async fn test_metadata_for_another_entity_rejected() {
    let dir = TempDir::new().unwrap();
    let metadata = dir.path().join("idp.xml");
    std::fs::write(&metadata, idp_metadata_xml(IDP_TWO, IDP_TWO_SSO)).unwrap();

    let config = test_config(dir.path(), &[]);
    let result = IdentityProviderRegistry::from_records(
        vec![file_record(IDP_ONE, &metadata, true, false)],
        &config.sp,
        &reqwest::Client::new(),
    )
    .await;

    assert!(matches!(result, Err(ProviderError::EntityMismatch { .. })));
}

#[tokio::test]
async fn test_invalid_configurations_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let http = reqwest::Client::new();
    let records = write_identity_providers(dir.path());

    let result = IdentityProviderRegistry::from_records(vec![], &config.sp, &http).await;
    assert!(matches!(result, Err(ProviderError::Empty)));

    let duplicate = vec![records[0].clone(), records[0].clone()];
    let result = IdentityProviderRegistry::from_records(duplicate, &config.sp, &http).await;
    assert!(matches!(result, Err(ProviderError::Duplicate(id)) if id == IDP_ONE));

    let mut blank = records[0].clone();
    blank.entity_id = "  ".to_string();
    let result = IdentityProviderRegistry::from_records(vec![blank], &config.sp, &http).await;
    assert!(matches!(result, Err(ProviderError::EmptyEntityId)));

    let missing = file_record(IDP_ONE, &dir.path().join("missing.xml"), true, false);
    let result = IdentityProviderRegistry::from_records(vec![missing], &config.sp, &http).await;
    assert!(matches!(result, Err(ProviderError::Read { .. })));
}

#[tokio::test]
async fn test_unreadable_configuration_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let http = reqwest::Client::new();

    let result =
        IdentityProviderRegistry::load(&dir.path().join("nope.json"), &config.sp, &http).await;
    assert!(matches!(result, Err(ProviderError::Read { .. })));

    let bad_json = dir.path().join("bad.json");
    std::fs::write(&bad_json, "{ not json").unwrap();
    let result = IdentityProviderRegistry::load(&bad_json, &config.sp, &http).await;
    assert!(matches!(result, Err(ProviderError::Config(_))));
}

#[test]
fn test_parse_idp_metadata() {
    let descriptor = parse_idp_metadata(IDP_ONE, &idp_metadata_xml(IDP_ONE, IDP_ONE_SSO)).unwrap();
    assert_eq!(descriptor.entity_id.as_deref(), Some(IDP_ONE));

    assert!(matches!(
        parse_idp_metadata(IDP_ONE, "<html>not metadata</html>"),
        Err(ProviderError::Metadata { .. }) | Err(ProviderError::EntityMismatch { .. })
    ));
}
