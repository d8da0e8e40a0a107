//! Caller authentication for palisade.
//!
//! Requests carry a signed assertion in the `cf-access-jwt-assertion` header.
//! [`AccessVerifier`] checks it against the issuer's published key set and
//! yields a [`VerificationOutcome`]:
//!
//! - [`VerificationOutcome::Authenticated`] with the caller's [`Identity`]
//! - [`VerificationOutcome::Rejected`] with a 403 [`Rejection`] explaining why
//!
//! Key sets are cached per URL in a process-wide [`KeySetRegistry`] and
//! refetched when their lifetime expires or a token names an unknown key.
//!
//! ```rust,ignore
//! use palisade_auth::{AccessPolicy, AccessVerifier, KeySetRegistry, VerificationOutcome};
//!
//! let policy = AccessPolicy {
//!     issuer: Some("https://team.cloudflareaccess.com".into()),
//!     audience: Some("aud-tag".into()),
//! };
//! let verifier = AccessVerifier::new(policy, KeySetRegistry::global(), ttl);
//!
//! match verifier.verify(request.headers()).await {
//!     VerificationOutcome::Authenticated(identity) => println!("hello {}", identity.label()),
//!     VerificationOutcome::Rejected(rejection) => println!("{}", rejection.message),
//! }
//! ```
//!
//! [`Identity`]: palisade_core::Identity

mod keyset;
mod verifier;

pub use keyset::{certs_url, JwkConfig, KeySetError, KeySetRegistry, RemoteKeySet, VerificationKey};
pub use verifier::{
    AccessPolicy, AccessVerifier, Rejection, TokenError, VerificationOutcome, ACCESS_JWT_HEADER,
    MISSING_AUDIENCE_MESSAGE, MISSING_TEAM_DOMAIN_MESSAGE, MISSING_TOKEN_MESSAGE,
};
