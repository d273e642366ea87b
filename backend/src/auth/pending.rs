//! AuthnRequests we sent and have not yet seen answered
//!
//! Keyed by the RelayState value sent along with the request. Entries are
//! single-use: looked up while a response is checked, removed once it has
//! been accepted. They expire after ten minutes.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use idp_initiated_shared::ResolvedTarget;

pub const PENDING_REQUEST_LIFETIME_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// ID of the AuthnRequest; the response must answer it
    pub request_id: String,
    pub idp_entity_id: String,
    /// Return target validated when sign-in started
    pub return_url: Option<ResolvedTarget>,
    pub expires_at: DateTime<Utc>,
}

impl PendingRequest {
    pub fn new(
        request_id: impl Into<String>,
        idp_entity_id: impl Into<String>,
        return_url: Option<ResolvedTarget>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            idp_entity_id: idp_entity_id.into(),
            return_url,
            expires_at: Utc::now() + Duration::minutes(PENDING_REQUEST_LIFETIME_MINUTES),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: RwLock<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a request and return the RelayState key that finds it again.
    pub async fn insert(&self, request: PendingRequest) -> String {
        let key = Uuid::new_v4().simple().to_string();
        let mut entries = self.entries.write().await;
        entries.retain(|_, pending| !pending.is_expired());
        entries.insert(key.clone(), request);
        key
    }

    /// The request for `key` if it has not expired; the entry stays in place.
    pub async fn get(&self, key: &str) -> Option<PendingRequest> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|pending| !pending.is_expired())
            .cloned()
    }

    /// Remove and return the request for `key` if it has not expired.
    pub async fn take(&self, key: &str) -> Option<PendingRequest> {
        let pending = self.entries.write().await.remove(key)?;
        if pending.is_expired() {
            tracing::debug!("Pending request for {} expired", pending.idp_entity_id);
            return None;
        }
        Some(pending)
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_expired());
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
