
// Common test utilities and shared test setup
use axum::{body::Body, http::Request, response::Response};
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::providers::IdentityProviderRegistry;
use crate::config::Config;
use crate::AppState;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// A fully wired application backed by two file-metadata IdPs in a temp dir.
pub struct TestContext {
    pub state: Arc<AppState>,
    pub dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    /// Build with extra configuration variables on top of the test defaults.
    pub async fn with_env(vars: &[(&str, &str)]) -> Self {
        init_test_logging();

        let dir = TempDir::new().expect("Failed to create temp dir");
        let records = fixtures::write_identity_providers(dir.path());
        fixtures::write_static_files(dir.path());

        let config = test_config(dir.path(), vars);
        let http = reqwest::Client::new();
        let providers = IdentityProviderRegistry::from_records(records, &config.sp, &http)
            .await
            .expect("Failed to load test identity providers");

        Self {
            state: Arc::new(AppState::new(config, providers)),
            dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        crate::app(self.state.clone())
            .oneshot(request)
            .await
            .expect("Request failed")
    }
}

pub fn test_config(dir: &std::path::Path, overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("SESSION_SECRET".to_string(), fixtures::SESSION_SECRET.to_string());
    vars.insert("SP_ENTITY_ID".to_string(), fixtures::SP_ENTITY_ID.to_string());
    vars.insert("PUBLIC_BASE_URL".to_string(), "https://sp.example.com".to_string());
    vars.insert(
        "STATIC_DIR".to_string(),
        dir.join("static").to_string_lossy().into_owned(),
    );
    for (name, value) in overrides {
        vars.insert(name.to_string(), value.to_string());
    }

    Config::from_lookup(|name| vars.get(name).cloned()).expect("Invalid test configuration")
}
