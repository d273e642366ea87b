use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData as JwtTokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SessionConfig;
use super::saml::SamlIdentity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,  // SAML NameID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<String>,
    pub idp: String,  // Issuing identity provider entity id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    /// Assertion attributes, by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Signs and verifies the session cookie with the configured secret (HS256).
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl SessionTokens {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            lifetime: Duration::minutes(config.lifetime_minutes),
        }
    }

    pub fn issue(
        &self,
        identity: &SamlIdentity,
        idp_entity_id: &str,
    ) -> Result<TokenResponse, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;

        let claims = Claims {
            sub: identity.name_id.clone(),
            name_id_format: identity.name_id_format.clone(),
            idp: idp_entity_id.to_string(),
            session_index: identity.session_index.clone(),
            attributes: identity.attributes.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;

        Ok(TokenResponse { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<JwtTokenData<Claims>, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }
}
