//! SAML 2.0 service provider glue
//!
//! Decoding of HTTP-POST responses, the identity we keep from a validated
//! assertion, and the metadata document published at `/Saml2`.

use base64::{engine::general_purpose, Engine as _};
use samael::schema::{Assertion, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ServiceProviderConfig;
use crate::error::{ApiResult, AppError};

pub const NAME_ID_FORMAT_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// The authenticated principal carried out of an assertion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamlIdentity {
    pub name_id: String,
    pub name_id_format: Option<String>,
    pub session_index: Option<String>,
    /// Attribute name -> values, in name order
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl SamlIdentity {
    pub fn from_assertion(assertion: &Assertion) -> ApiResult<Self> {
        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|subject| subject.name_id.as_ref())
            .ok_or_else(|| AppError::SamlError("Assertion has no NameID".to_string()))?;

        if name_id.value.trim().is_empty() {
            return Err(AppError::SamlError("Assertion has an empty NameID".to_string()));
        }

        let session_index = assertion
            .authn_statements
            .as_ref()
            .and_then(|statements| statements.first())
            .and_then(|statement| statement.session_index.clone());

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for statement in assertion.attribute_statements.iter().flatten() {
            for attribute in &statement.attributes {
                let Some(name) = attribute.name.clone() else {
                    continue;
                };
                let values = attributes.entry(name).or_default();
                values.extend(attribute.values.iter().filter_map(|v| v.value.clone()));
            }
        }

        Ok(Self {
            name_id: name_id.value.clone(),
            name_id_format: name_id.format.clone(),
            session_index,
            attributes,
        })
    }
}

/// Decode the base64 `SAMLResponse` form field into XML text.
pub fn decode_saml_response(encoded: &str) -> ApiResult<String> {
    // Some IdPs wrap the value at 76 columns
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("SAMLResponse is not valid base64: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|_| AppError::BadRequest("SAMLResponse is not valid UTF-8".to_string()))
}

/// Read the issuer of a response before any signature checks, to pick the
/// identity provider whose keys validate it.
pub fn peek_issuer(xml: &str) -> ApiResult<String> {
    let response: Response = xml
        .parse()
        .map_err(|e| AppError::SamlError(format!("Malformed SAML response: {}", e)))?;

    let issuer = response
        .issuer
        .as_ref()
        .and_then(|issuer| issuer.value.clone())
        .or_else(|| {
            response
                .assertion
                .as_ref()
                .and_then(|assertion| assertion.issuer.value.clone())
        })
        .map(|issuer| issuer.trim().to_string())
        .filter(|issuer| !issuer.is_empty())
        .ok_or_else(|| AppError::SamlError("SAML response has no Issuer".to_string()))?;

    Ok(issuer)
}

/// Generate SP metadata XML for identity providers to consume
pub fn generate_sp_metadata(sp_config: &ServiceProviderConfig) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor
    xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"
    entityID="{entity_id}">
    <md:SPSSODescriptor
        AuthnRequestsSigned="false"
        WantAssertionsSigned="true"
        protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:NameIDFormat>{name_id_format}</md:NameIDFormat>
        <md:AssertionConsumerService
            Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
            Location="{acs_url}"
            index="0"
            isDefault="true"/>
    </md:SPSSODescriptor>
</md:EntityDescriptor>
"#,
        entity_id = xml_escape(&sp_config.entity_id),
        name_id_format = NAME_ID_FORMAT_UNSPECIFIED,
        acs_url = xml_escape(&sp_config.acs_url),
    )
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
