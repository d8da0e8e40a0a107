//! Remote key set fetching and caching.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Minimum spacing between refetches triggered by an unknown `kid`.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];
const EC_ALGORITHMS: &[Algorithm] = &[Algorithm::ES256, Algorithm::ES384];
const HMAC_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Errors raised while obtaining a verification key.
#[derive(thiserror::Error, Debug)]
pub enum KeySetError {
    #[error("key set fetch failed: {0}")]
    Fetch(String),

    #[error("key set endpoint returned status {0}")]
    Status(u16),

    #[error("key set could not be decoded: {0}")]
    Decode(String),

    #[error("token header has no kid and the key set holds {0} keys")]
    MissingKid(usize),

    #[error("no key with kid '{0}' in key set")]
    UnknownKid(String),
}

/// A JWK as published by the identity provider.
#[derive(Clone, Debug, Deserialize)]
pub struct JwkConfig {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub k: Option<String>,
}

#[derive(Deserialize)]
struct JwkSetDocument {
    keys: Vec<JwkConfig>,
}

/// A decoded key together with the signing algorithms it may verify.
#[derive(Clone)]
pub struct VerificationKey {
    pub key: DecodingKey,
    pub algorithms: Vec<Algorithm>,
}

impl VerificationKey {
    pub fn allows(&self, alg: Algorithm) -> bool {
        self.algorithms.contains(&alg)
    }

    /// Builds a verification key from a published JWK.
    pub fn from_jwk(jwk: &JwkConfig) -> Result<Self, String> {
        let family = match jwk.kty.as_str() {
            "RSA" => RSA_ALGORITHMS,
            "EC" => EC_ALGORITHMS,
            "oct" => HMAC_ALGORITHMS,
            other => return Err(format!("unsupported key type '{other}'")),
        };

        let algorithms = match jwk.alg.as_deref() {
            Some(alg) => {
                let parsed = Algorithm::from_str(alg)
                    .map_err(|_| format!("unsupported algorithm '{alg}'"))?;
                if !family.contains(&parsed) {
                    return Err(format!(
                        "algorithm '{alg}' does not fit key type '{}'",
                        jwk.kty
                    ));
                }
                vec![parsed]
            }
            None => family.to_vec(),
        };

        let key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("rsa modulus missing")?;
                let e = jwk.e.as_deref().ok_or("rsa exponent missing")?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| e.to_string())?
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or("ec x coordinate missing")?;
                let y = jwk.y.as_deref().ok_or("ec y coordinate missing")?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| e.to_string())?
            }
            _ => {
                let secret = jwk.k.as_deref().ok_or("secret missing")?;
                let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .decode(secret.trim_end_matches('='))
                    .map_err(|e| format!("secret decode error: {e}"))?;
                DecodingKey::from_secret(&bytes)
            }
        };

        Ok(Self { key, algorithms })
    }
}

struct CachedKeys {
    keys: HashMap<String, VerificationKey>,
    fetched_at: Instant,
}

/// Key set fetched from a URL and cached for a fixed lifetime.
///
/// Readers share the cached map; a stale or missing cache is refreshed by
/// whichever caller notices first. Concurrent refreshes are harmless.
pub struct RemoteKeySet {
    url: String,
    client: reqwest::Client,
    ttl: Duration,
    min_refresh_interval: Duration,
    cache: RwLock<Option<CachedKeys>>,
}

impl RemoteKeySet {
    pub fn new(url: impl Into<String>, ttl: Duration, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            cache: RwLock::new(None),
        }
    }

    /// Overrides how soon an unknown `kid` may trigger another fetch.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Returns the key for `kid`, fetching the key set when needed.
    ///
    /// A token without a `kid` is accepted only when the set holds one key.
    pub async fn key_for(&self, kid: Option<&str>) -> Result<VerificationKey, KeySetError> {
        if self.is_stale() {
            self.refresh().await?;
        }

        match self.lookup(kid) {
            Err(KeySetError::UnknownKid(missing)) if self.may_refresh_early() => {
                debug!(kid = %missing, url = %self.url, "Unknown kid, refetching key set");
                self.refresh().await?;
                self.lookup(kid)
            }
            other => other,
        }
    }

    /// Fetches the key set and replaces the cached keys.
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeySetError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::Status(response.status().as_u16()));
        }

        let document: JwkSetDocument = response
            .json()
            .await
            .map_err(|e| KeySetError::Decode(e.to_string()))?;

        let mut keys = HashMap::new();
        for jwk in &document.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }
            let Some(kid) = jwk.kid.as_deref() else {
                warn!(url = %self.url, "Skipping key without kid");
                continue;
            };
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid.to_string(), key);
                }
                Err(e) => warn!(kid, url = %self.url, "Skipping key: {}", e),
            }
        }

        info!(url = %self.url, keys = keys.len(), "Fetched key set");
        *self.cache.write() = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    fn is_stale(&self) -> bool {
        match self.cache.read().as_ref() {
            Some(cached) => cached.fetched_at.elapsed() >= self.ttl,
            None => true,
        }
    }

    fn may_refresh_early(&self) -> bool {
        match self.cache.read().as_ref() {
            Some(cached) => cached.fetched_at.elapsed() >= self.min_refresh_interval,
            None => true,
        }
    }

    fn lookup(&self, kid: Option<&str>) -> Result<VerificationKey, KeySetError> {
        let guard = self.cache.read();
        let keys = guard.as_ref().map(|c| &c.keys);
        let Some(keys) = keys else {
            return Err(KeySetError::Fetch("key set not loaded".into()));
        };

        match kid {
            Some(kid) => keys
                .get(kid)
                .cloned()
                .ok_or_else(|| KeySetError::UnknownKid(kid.to_string())),
            None if keys.len() == 1 => keys
                .values()
                .next()
                .cloned()
                .ok_or(KeySetError::MissingKid(1)),
            None => Err(KeySetError::MissingKid(keys.len())),
        }
    }
}

static GLOBAL_REGISTRY: Lazy<KeySetRegistry> = Lazy::new(KeySetRegistry::new);

/// Process-wide map from key-set URL to its cached [`RemoteKeySet`].
pub struct KeySetRegistry {
    sets: DashMap<String, Arc<RemoteKeySet>>,
    client: reqwest::Client,
}

impl Default for KeySetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySetRegistry {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    /// The registry shared by the whole process, created on first use.
    pub fn global() -> &'static KeySetRegistry {
        &GLOBAL_REGISTRY
    }

    /// Returns the key set for `url`, creating it on first request.
    pub fn shared(&self, url: &str, ttl: Duration) -> Arc<RemoteKeySet> {
        self.sets
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(RemoteKeySet::new(url, ttl, self.client.clone())))
            .clone()
    }
}

/// Key-set location published under an access team domain.
pub fn certs_url(issuer: &str) -> String {
    format!("{}/cdn-cgi/access/certs", issuer.trim_end_matches('/'))
}
