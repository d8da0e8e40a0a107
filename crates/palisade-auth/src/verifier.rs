//! Access token verification producing a tagged outcome.

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use jsonwebtoken::{decode, decode_header, Validation};
use palisade_core::Identity;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::keyset::{certs_url, KeySetError, KeySetRegistry, RemoteKeySet};

/// Header carrying the signed access assertion.
pub const ACCESS_JWT_HEADER: &str = "cf-access-jwt-assertion";

pub const MISSING_AUDIENCE_MESSAGE: &str = "missing required audience";
pub const MISSING_TEAM_DOMAIN_MESSAGE: &str = "missing required team domain";
pub const MISSING_TOKEN_MESSAGE: &str = "missing required cf authorization token";

/// Reasons a presented token failed verification.
#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("assertion header is not visible ASCII")]
    UnreadableHeader,

    #[error(transparent)]
    KeySet(#[from] KeySetError),

    #[error("{0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("token algorithm {0:?} is not allowed for its key")]
    AlgorithmNotAllowed(jsonwebtoken::Algorithm),
}

/// A refused request: the status and plain-text message to answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub message: String,
}

impl Rejection {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

/// Result of checking one request's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Authenticated(Identity),
    Rejected(Rejection),
}

impl VerificationOutcome {
    fn forbidden(message: impl Into<String>) -> Self {
        Self::Rejected(Rejection::forbidden(message))
    }

    fn invalid(err: TokenError) -> Self {
        warn!("Rejecting access assertion: {}", err);
        Self::forbidden(format!("invalid token: {err}"))
    }
}

/// Expected issuer and audience. Either one missing rejects every request.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Deserialize)]
struct AccessClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// Verifies access assertions against the issuer's published key set.
pub struct AccessVerifier {
    policy: AccessPolicy,
    key_set: Option<Arc<RemoteKeySet>>,
}

impl AccessVerifier {
    /// Creates a verifier whose key set comes from `registry`, keyed by the
    /// issuer's certs URL. Nothing is fetched until the first verification.
    pub fn new(policy: AccessPolicy, registry: &KeySetRegistry, ttl: Duration) -> Self {
        let key_set = policy
            .issuer
            .as_deref()
            .map(|issuer| registry.shared(&certs_url(issuer), ttl));
        Self { policy, key_set }
    }

    /// Creates a verifier using an explicit key set.
    pub fn with_key_set(policy: AccessPolicy, key_set: Arc<RemoteKeySet>) -> Self {
        Self {
            policy,
            key_set: Some(key_set),
        }
    }

    /// Checks the request headers and returns who the caller is, or why not.
    ///
    /// An absent or blank header counts as missing; a header that cannot be
    /// read as text is an invalid token.
    pub async fn verify(&self, headers: &HeaderMap) -> VerificationOutcome {
        let audience = self.policy.audience.as_deref().filter(|a| !a.is_empty());
        let Some(audience) = audience else {
            warn!("Rejecting request: no audience configured");
            return VerificationOutcome::forbidden(MISSING_AUDIENCE_MESSAGE);
        };
        let (Some(issuer), Some(key_set)) =
            (self.policy.issuer.as_deref(), self.key_set.as_deref())
        else {
            warn!("Rejecting request: no team domain configured");
            return VerificationOutcome::forbidden(MISSING_TEAM_DOMAIN_MESSAGE);
        };

        let token = match headers.get(ACCESS_JWT_HEADER).map(|v| v.to_str()) {
            Some(Ok(value)) => value.trim(),
            Some(Err(_)) => return VerificationOutcome::invalid(TokenError::UnreadableHeader),
            None => "",
        };
        if token.is_empty() {
            debug!("Rejecting request: no access assertion");
            return VerificationOutcome::forbidden(MISSING_TOKEN_MESSAGE);
        }

        match verify_token(token, issuer, audience, key_set).await {
            Ok(identity) => {
                debug!(identity = identity.label(), "Access assertion verified");
                VerificationOutcome::Authenticated(identity)
            }
            Err(e) => VerificationOutcome::invalid(e),
        }
    }
}

async fn verify_token(
    token: &str,
    issuer: &str,
    audience: &str,
    key_set: &RemoteKeySet,
) -> Result<Identity, TokenError> {
    let header = decode_header(token)?;
    let key = key_set.key_for(header.kid.as_deref()).await?;
    if !key.allows(header.alg) {
        return Err(TokenError::AlgorithmNotAllowed(header.alg));
    }

    let mut validation = Validation::new(header.alg);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.validate_nbf = true;
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);

    let data = decode::<AccessClaims>(token, &key.key, &validation)?;
    Ok(Identity {
        email: data.claims.email,
        subject: data.claims.sub,
    })
}
