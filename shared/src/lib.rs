pub mod redirect;

pub use redirect::{RedirectTargetResolver, RejectionReason, ResolvedTarget};

use serde::{Deserialize, Serialize};

/// One trusted identity provider, as listed in the identity provider
/// configuration file. Order in the file is significant: the first entry is
/// the default for SP-initiated sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityProviderConfig {
    pub entity_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: MetadataSource,
    /// Accept responses that do not answer one of our AuthnRequests.
    #[serde(default)]
    pub allow_unsolicited_authn_response: bool,
    /// The IdP sends the post-login return URL as RelayState.
    #[serde(default)]
    pub relay_state_used_as_return_url: bool,
}

/// Where the signing keys and endpoints of an IdP come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MetadataSource {
    /// Fetch over HTTP(S). Without a location the entity id is the metadata URL.
    Load {
        #[serde(default)]
        location: Option<String>,
    },
    /// Read a metadata document from disk.
    File { path: String },
}

impl Default for MetadataSource {
    fn default() -> Self {
        Self::Load { location: None }
    }
}

impl IdentityProviderConfig {
    /// URL metadata is fetched from, if the provider loads it remotely.
    pub fn metadata_location(&self) -> Option<&str> {
        match &self.metadata {
            MetadataSource::Load { location } => {
                Some(location.as_deref().unwrap_or(&self.entity_id))
            }
            MetadataSource::File { .. } => None,
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.entity_id)
    }
}

/// Parse the identity provider configuration document (a JSON array).
pub fn parse_identity_providers(
    json: &str,
) -> Result<Vec<IdentityProviderConfig>, serde_json::Error> {
    serde_json::from_str(json)
}
