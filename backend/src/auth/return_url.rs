//! Where to send the user once the assertion consumer service has signed
//! them in.
//!
//! Candidates, lowest precedence first: the configured default, the return
//! URL stored with our own AuthnRequest (or, for IdPs configured for it, the
//! RelayState), and finally the `target` query parameter. Every client
//! supplied candidate goes through the redirect resolver; a rejected one is
//! logged and skipped, never fatal.

use serde::Serialize;

use idp_initiated_shared::{
    IdentityProviderConfig, RedirectTargetResolver, RejectionReason, ResolvedTarget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnLocationSource {
    Default,
    PendingRequest,
    RelayState,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnLocation {
    pub location: ResolvedTarget,
    pub source: ReturnLocationSource,
}

/// Inputs of one ACS request that may carry a return location
#[derive(Debug, Clone, Copy, Default)]
pub struct AcsRequestContext<'a> {
    pub target: Option<&'a str>,
    pub relay_state: Option<&'a str>,
    /// Set when the response answers one of our AuthnRequests
    pub pending_return_url: Option<&'a ResolvedTarget>,
}

pub fn select_return_location(
    resolver: &RedirectTargetResolver,
    default_location: &ResolvedTarget,
    idp: &IdentityProviderConfig,
    ctx: &AcsRequestContext<'_>,
) -> ReturnLocation {
    let mut selected = ReturnLocation {
        location: default_location.clone(),
        source: ReturnLocationSource::Default,
    };

    if let Some(pending) = ctx.pending_return_url {
        selected = ReturnLocation {
            location: pending.clone(),
            source: ReturnLocationSource::PendingRequest,
        };
    } else if idp.relay_state_used_as_return_url {
        if let Some(location) = accept(resolver, "RelayState", &idp.entity_id, ctx.relay_state) {
            selected = ReturnLocation {
                location,
                source: ReturnLocationSource::RelayState,
            };
        }
    }

    if let Some(location) = accept(resolver, "target", &idp.entity_id, ctx.target) {
        selected = ReturnLocation {
            location,
            source: ReturnLocationSource::Target,
        };
    }

    selected
}

fn accept(
    resolver: &RedirectTargetResolver,
    field: &'static str,
    idp: &str,
    candidate: Option<&str>,
) -> Option<ResolvedTarget> {
    match resolver.resolve(candidate) {
        Ok(location) => Some(location),
        Err(RejectionReason::Absent) => None,
        Err(reason) => {
            tracing::warn!(
                field,
                idp,
                reason = reason.as_str(),
                candidate = ?candidate,
                "Ignoring unsafe return location"
            );
            None
        }
    }
}
