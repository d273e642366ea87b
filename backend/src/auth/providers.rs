//! Registry of trusted identity providers
//!
//! Loaded once at startup from the identity provider configuration file.
//! Each entry gets its own samael `ServiceProvider`, built from the IdP's
//! metadata, which validates responses issued by that IdP.

use samael::metadata::{EntityDescriptor, HTTP_REDIRECT_BINDING};
use samael::service_provider::{ServiceProvider, ServiceProviderBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use idp_initiated_shared::{parse_identity_providers, IdentityProviderConfig, MetadataSource};

use crate::config::ServiceProviderConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid identity provider configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("no identity providers configured")]
    Empty,
    #[error("identity provider with an empty entity id")]
    EmptyEntityId,
    #[error("identity provider {0} is configured more than once")]
    Duplicate(String),
    #[error("failed to fetch metadata for {entity_id} from {location}: {source}")]
    Fetch {
        entity_id: String,
        location: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid metadata for {entity_id}: {message}")]
    Metadata { entity_id: String, message: String },
    #[error("metadata for {expected} describes entity {found}")]
    EntityMismatch { expected: String, found: String },
    #[error("failed to configure service provider for {entity_id}: {message}")]
    ServiceProvider { entity_id: String, message: String },
}

/// One trusted IdP together with the SP instance that validates its responses
pub struct IdentityProvider {
    pub config: IdentityProviderConfig,
    pub service_provider: ServiceProvider,
}

impl IdentityProvider {
    pub fn entity_id(&self) -> &str {
        &self.config.entity_id
    }

    /// HTTP-Redirect single sign-on endpoint from the IdP metadata
    pub fn sso_location(&self) -> Option<String> {
        self.service_provider.sso_binding_location(HTTP_REDIRECT_BINDING)
    }
}

pub struct IdentityProviderRegistry {
    providers: Vec<IdentityProvider>,
}

impl IdentityProviderRegistry {
    /// Load the configuration file and every IdP's metadata.
    pub async fn load(
        path: &Path,
        sp: &ServiceProviderConfig,
        http: &reqwest::Client,
    ) -> Result<Self, ProviderError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProviderError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let records = parse_identity_providers(&json)?;
        Self::from_records(records, sp, http).await
    }

    pub async fn from_records(
        records: Vec<IdentityProviderConfig>,
        sp: &ServiceProviderConfig,
        http: &reqwest::Client,
    ) -> Result<Self, ProviderError> {
        if records.is_empty() {
            return Err(ProviderError::Empty);
        }

        let mut seen = HashSet::new();
        for record in &records {
            if record.entity_id.trim().is_empty() {
                return Err(ProviderError::EmptyEntityId);
            }
            if !seen.insert(record.entity_id.clone()) {
                return Err(ProviderError::Duplicate(record.entity_id.clone()));
            }
        }

        let mut providers = Vec::with_capacity(records.len());
        for record in records {
            let xml = read_metadata(&record, http).await?;
            let descriptor = parse_idp_metadata(&record.entity_id, &xml)?;
            let service_provider = build_service_provider(sp, &record, descriptor)?;

            tracing::info!(
                entity_id = %record.entity_id,
                allow_unsolicited = record.allow_unsolicited_authn_response,
                relay_state_return_url = record.relay_state_used_as_return_url,
                "Loaded identity provider {}",
                record.label()
            );

            providers.push(IdentityProvider {
                config: record,
                service_provider,
            });
        }

        Ok(Self { providers })
    }

    /// Exact, case-sensitive lookup by entity id
    pub fn get(&self, entity_id: &str) -> Option<&IdentityProvider> {
        self.providers.iter().find(|p| p.entity_id() == entity_id)
    }

    /// First configured provider; used for SP-initiated sign-in without `idp`
    pub fn default_provider(&self) -> Option<&IdentityProvider> {
        self.providers.first()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

async fn read_metadata(
    record: &IdentityProviderConfig,
    http: &reqwest::Client,
) -> Result<String, ProviderError> {
    match &record.metadata {
        MetadataSource::File { path } => {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ProviderError::Read {
                    path: PathBuf::from(path),
                    source,
                })
        }
        MetadataSource::Load { .. } => {
            let location = record.metadata_location().unwrap_or(&record.entity_id);
            tracing::debug!("Fetching metadata for {} from {}", record.entity_id, location);

            let fetch_error = |source| ProviderError::Fetch {
                entity_id: record.entity_id.clone(),
                location: location.to_string(),
                source,
            };

            http.get(location)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(fetch_error)?
                .text()
                .await
                .map_err(fetch_error)
        }
    }
}

/// Parse an IdP `EntityDescriptor` and check it describes `entity_id`.
pub fn parse_idp_metadata(entity_id: &str, xml: &str) -> Result<EntityDescriptor, ProviderError> {
    let descriptor: EntityDescriptor =
        samael::metadata::de::from_str(xml).map_err(|e| ProviderError::Metadata {
            entity_id: entity_id.to_string(),
            message: e.to_string(),
        })?;

    match descriptor.entity_id.as_deref() {
        Some(found) if found == entity_id => Ok(descriptor),
        Some(found) => Err(ProviderError::EntityMismatch {
            expected: entity_id.to_string(),
            found: found.to_string(),
        }),
        None => Err(ProviderError::Metadata {
            entity_id: entity_id.to_string(),
            message: "EntityDescriptor has no entityID".to_string(),
        }),
    }
}

fn build_service_provider(
    sp: &ServiceProviderConfig,
    record: &IdentityProviderConfig,
    idp_metadata: EntityDescriptor,
) -> Result<ServiceProvider, ProviderError> {
    ServiceProviderBuilder::default()
        .entity_id(sp.entity_id.clone())
        .acs_url(sp.acs_url.clone())
        .idp_metadata(idp_metadata)
        .allow_idp_initiated(record.allow_unsolicited_authn_response)
        .build()
        .map_err(|e| ProviderError::ServiceProvider {
            entity_id: record.entity_id.clone(),
            message: e.to_string(),
        })
}
