use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use idp_initiated_shared::RedirectTargetResolver;

mod auth;
mod config;
mod error;
mod handlers;
mod middleware;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

use auth::jwt::SessionTokens;
use auth::pending::PendingRequests;
use auth::providers::IdentityProviderRegistry;

pub struct AppState {
    pub config: config::Config,
    pub providers: IdentityProviderRegistry,
    pub pending: PendingRequests,
    pub resolver: RedirectTargetResolver,
    pub sessions: SessionTokens,
}

impl AppState {
    pub fn new(config: config::Config, providers: IdentityProviderRegistry) -> Self {
        Self {
            resolver: config.redirect_resolver(),
            sessions: SessionTokens::new(&config.session),
            pending: PendingRequests::new(),
            providers,
            config,
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::home_routes())
        .route("/health", get(handlers::health_check))
        .merge(auth::auth_routes())
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(middleware::request_observability))
                .layer(from_fn_with_state(state.clone(), middleware::https_redirect))
                .layer(from_fn_with_state(state.clone(), middleware::hsts)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    if config.environment.is_production() && config.session.uses_default_secret() {
        anyhow::bail!("SESSION_SECRET must be set in production");
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.metadata_timeout_secs))
        .build()?;
    let providers =
        IdentityProviderRegistry::load(&config.identity_providers_path, &config.sp, &http).await?;
    tracing::info!(
        "Loaded {} identity provider(s) from {}",
        providers.len(),
        config.identity_providers_path.display()
    );

    let app_state = Arc::new(AppState::new(config, providers));
    spawn_pending_request_purge(app_state.clone());

    let server_addr = app_state.config.server_addr.clone();
    let app = app(app_state);

    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Server running on {}", server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_pending_request_purge(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = state.pending.purge_expired().await;
            if purged > 0 {
                tracing::debug!("Purged {} expired pending AuthnRequest(s)", purged);
            }
        }
    });
}
