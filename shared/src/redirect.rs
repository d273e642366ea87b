//! Open-redirect-safe resolution of post-authentication return targets.
//!
//! A return target arrives through request data the client controls: a
//! `target` query parameter on the assertion consumer URL, a SAML
//! `RelayState`, or a `ReturnUrl` on the sign-in endpoint.
//! [`RedirectTargetResolver`] only lets through relative references that a
//! browser resolves against the origin serving the redirect.
//!
//! Same origin is not the same application. When several applications share
//! a host under path prefixes, scope the resolver with
//! [`RedirectTargetResolver::with_base_path`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::{ParseError, Url};

/// Origin used to cross-check candidates with the WHATWG parser. The
/// `.invalid` TLD never resolves.
const SENTINEL_ORIGIN: &str = "https://redirect-resolver.invalid";

/// Why a candidate return target was refused.
///
/// Every variant is an expected outcome for untrusted input. Callers fall back
/// to their default location; none of these is a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("no return target was supplied")]
    Absent,
    #[error("protocol-relative target can address a foreign host")]
    ProtocolRelative,
    #[error("target carries an explicit scheme or authority")]
    AbsoluteOrForeignAuthority,
    #[error("target is not a well-formed relative URI reference")]
    Malformed,
    #[error("target is relative to the current path instead of rooted")]
    PathRelative,
    #[error("target lies outside the application base path")]
    OutsideBasePath,
}

impl RejectionReason {
    /// Stable identifier for structured logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::ProtocolRelative => "protocol_relative",
            Self::AbsoluteOrForeignAuthority => "absolute_or_foreign_authority",
            Self::Malformed => "malformed",
            Self::PathRelative => "path_relative",
            Self::OutsideBasePath => "outside_base_path",
        }
    }
}

/// A return target that passed [`RedirectTargetResolver::resolve`].
///
/// Holds the candidate text unchanged. It only contains visible ASCII, so it
/// is always a valid `Location` header value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResolvedTarget(String);

impl ResolvedTarget {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ResolvedTarget {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ResolvedTarget> for String {
    fn from(target: ResolvedTarget) -> Self {
        target.0
    }
}

/// Decides whether an untrusted string is a safe same-origin redirect target.
///
/// Rules, first match wins:
///
/// 1. absent or blank: [`RejectionReason::Absent`]
/// 2. starts with `//`, also after browser preprocessing (leading controls and
///    spaces stripped, tab/CR/LF removed, `\` read as `/`):
///    [`RejectionReason::ProtocolRelative`]
/// 3. explicit scheme, or resolves to another origin:
///    [`RejectionReason::AbsoluteOrForeignAuthority`]
/// 4. not a strict RFC 3986 relative reference: [`RejectionReason::Malformed`]
/// 5. not rooted at `/` while path-relative targets are disallowed:
///    [`RejectionReason::PathRelative`]
/// 6. normalized path outside the configured base path:
///    [`RejectionReason::OutsideBasePath`]
///
/// Otherwise the candidate is returned unchanged.
///
/// Path-relative targets (`target/path`, `?tab=2`) are refused by default:
/// they land somewhere different depending on the depth of the URL that
/// issues the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectTargetResolver {
    base_path: Option<String>,
    allow_path_relative: bool,
}

impl RedirectTargetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict targets to `base_path` and the paths beneath it. A blank or
    /// `/` base path removes the restriction.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let trimmed = base_path.trim().trim_end_matches('/');
        self.base_path = if trimmed.is_empty() {
            None
        } else if trimmed.starts_with('/') {
            Some(trimmed.to_string())
        } else {
            Some(format!("/{trimmed}"))
        };
        self
    }

    /// Like [`Self::with_base_path`], but refuses a base path that no target
    /// could ever match: one outside the URI character set, or one that
    /// normalizes to a different path.
    pub fn try_with_base_path(self, base_path: &str) -> Result<Self, RejectionReason> {
        let scoped = self.with_base_path(base_path);
        if let Some(path) = scoped.base_path.as_deref() {
            check_lexical(path)?;
            if path.contains(['?', '#']) {
                return Err(RejectionReason::Malformed);
            }
            let normalized = Url::parse(&format!("{SENTINEL_ORIGIN}{path}"))
                .map_err(|_| RejectionReason::Malformed)?;
            if normalized.path() != path {
                return Err(RejectionReason::Malformed);
            }
        }
        Ok(scoped)
    }

    pub fn allow_path_relative(mut self, allow: bool) -> Self {
        self.allow_path_relative = allow;
        self
    }

    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    pub fn allows_path_relative(&self) -> bool {
        self.allow_path_relative
    }

    pub fn resolve(&self, candidate: Option<&str>) -> Result<ResolvedTarget, RejectionReason> {
        let candidate = match candidate {
            Some(c) if !c.trim().is_empty() => c,
            _ => return Err(RejectionReason::Absent),
        };

        if candidate.starts_with("//") {
            return Err(RejectionReason::ProtocolRelative);
        }

        let browser_view = browser_preprocess(candidate);
        if browser_view.starts_with("//") {
            return Err(RejectionReason::ProtocolRelative);
        }
        if classify_scheme(&browser_view) == SchemeSyntax::Present {
            return Err(RejectionReason::AbsoluteOrForeignAuthority);
        }

        match classify_scheme(candidate) {
            SchemeSyntax::Present => return Err(RejectionReason::AbsoluteOrForeignAuthority),
            SchemeSyntax::InvalidColon => return Err(RejectionReason::Malformed),
            SchemeSyntax::Absent => {}
        }

        check_lexical(candidate)?;

        match Url::parse(candidate) {
            Ok(_) => return Err(RejectionReason::AbsoluteOrForeignAuthority),
            Err(ParseError::RelativeUrlWithoutBase) => {}
            Err(_) => return Err(RejectionReason::Malformed),
        }

        // Path-relative candidates resolve against the shallowest location
        // the application can serve from.
        let base = Url::parse(&format!(
            "{SENTINEL_ORIGIN}{}/",
            self.base_path.as_deref().unwrap_or("")
        ))
        .map_err(|_| RejectionReason::Malformed)?;
        let resolved = base
            .join(candidate)
            .map_err(|_| RejectionReason::Malformed)?;
        if resolved.origin() != base.origin() {
            return Err(RejectionReason::AbsoluteOrForeignAuthority);
        }

        if !candidate.starts_with('/') && !self.allow_path_relative {
            return Err(RejectionReason::PathRelative);
        }

        if let Some(base_path) = &self.base_path {
            let path = resolved.path();
            let inside = path == base_path
                || path
                    .strip_prefix(base_path.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
            if !inside {
                return Err(RejectionReason::OutsideBasePath);
            }
        }

        Ok(ResolvedTarget(candidate.to_string()))
    }

    /// Resolve `candidate`, or fall back to `default` when it is refused.
    pub fn resolve_or(&self, candidate: Option<&str>, default: &ResolvedTarget) -> ResolvedTarget {
        self.resolve(candidate).unwrap_or_else(|_| default.clone())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SchemeSyntax {
    Present,
    /// A colon in the first segment that does not form a scheme.
    InvalidColon,
    Absent,
}

/// What a browser URL parser sees before it starts tokenizing.
fn browser_preprocess(candidate: &str) -> String {
    candidate
        .trim_start_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .map(|c| if c == '\\' { '/' } else { c })
        .collect()
}

fn classify_scheme(candidate: &str) -> SchemeSyntax {
    match candidate.find([':', '/', '?', '#']) {
        Some(end) if candidate[end..].starts_with(':') => {
            let mut chars = candidate[..end].chars();
            let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if valid {
                SchemeSyntax::Present
            } else {
                SchemeSyntax::InvalidColon
            }
        }
        _ => SchemeSyntax::Absent,
    }
}

fn check_lexical(candidate: &str) -> Result<(), RejectionReason> {
    let bytes = candidate.as_bytes();
    let mut fragment_seen = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escaped = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                    && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
                if !escaped {
                    return Err(RejectionReason::Malformed);
                }
                i += 3;
                continue;
            }
            b'#' if fragment_seen => return Err(RejectionReason::Malformed),
            b'#' => fragment_seen = true,
            b if is_uri_char(b) => {}
            _ => return Err(RejectionReason::Malformed),
        }
        i += 1;
    }

    Ok(())
}

/// RFC 3986 unreserved and reserved characters, minus the IP-literal brackets
/// and `#` (handled by the caller).
fn is_uri_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b':'
                | b'/'
                | b'?'
                | b'@'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
        )
}
