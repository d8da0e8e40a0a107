//! Process-wide settings for palisade.
//!
//! Settings are read once at startup from environment variables and never
//! mutated afterwards:
//!
//! - [`Settings`] — Everything the router, verifier and inference client need
//! - [`IdentityPropagation`] — Whether verified identities reach the model
//! - [`ConfigError`] — Missing or malformed variables
//!
//! # Loading from a custom source
//!
//! ```rust
//! use std::collections::HashMap;
//! use palisade_config::Settings;
//!
//! let vars = HashMap::from([
//!     ("CF_ACCOUNT_ID", "acct"),
//!     ("CF_API_TOKEN", "token"),
//!     ("TEAM_DOMAIN", "example.cloudflareaccess.com"),
//! ]);
//! let settings = Settings::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
//!
//! assert_eq!(settings.team_domain.as_deref(), Some("https://example.cloudflareaccess.com"));
//! assert_eq!(settings.max_tokens, 1024);
//! ```

use std::str::FromStr;
use std::time::Duration;

use palisade_core::GatewayRoute;
use palisade_llm::{DEFAULT_API_BASE, DEFAULT_GATEWAY_BASE};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_ID: &str = "@cf/meta/llama-3.3-70b-instruct-fp8-fast";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful, friendly assistant. Provide concise and accurate responses.";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8787";

/// Errors that can occur when loading settings.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("Missing required environment variable '{0}'")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for '{var}': {message}")]
    Invalid { var: &'static str, message: String },
}

impl ConfigError {
    fn invalid(var: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            message: message.into(),
        }
    }
}

/// Whether a verified identity is announced to the model as a system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPropagation {
    /// The identity is verified but never shown to the model.
    #[default]
    Disabled,
    /// A system message naming the caller is placed first in the conversation.
    Enabled,
}

impl FromStr for IdentityPropagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" | "on" | "true" | "1" => Ok(Self::Enabled),
            "disabled" | "off" | "false" | "0" => Ok(Self::Disabled),
            other => Err(format!("expected 'enabled' or 'disabled', got '{other}'")),
        }
    }
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Token issuer, normalized to `https://<host>` without a trailing slash.
    /// Also the base of the key-set URL.
    pub team_domain: Option<String>,
    /// Expected token audience.
    pub policy_aud: Option<String>,
    pub account_id: String,
    pub api_token: String,
    pub model_id: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub gateway: Option<GatewayRoute>,
    pub identity_propagation: IdentityPropagation,
    pub jwks_cache_ttl: Duration,
    pub inference_api_base: String,
    pub gateway_base: String,
    pub bind_addr: String,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let max_tokens = match get("MAX_TOKENS") {
            Some(raw) => parse_number::<u32>("MAX_TOKENS", &raw)?,
            None => DEFAULT_MAX_TOKENS,
        };

        let jwks_cache_ttl = match get("JWKS_CACHE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("JWKS_CACHE_TTL_SECS", &raw)?),
            None => DEFAULT_JWKS_CACHE_TTL,
        };

        let identity_propagation = match get("IDENTITY_PROPAGATION") {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ConfigError::invalid("IDENTITY_PROPAGATION", e))?,
            None => IdentityPropagation::default(),
        };

        let gateway = match get("AI_GATEWAY_ID") {
            Some(id) => Some(GatewayRoute {
                id,
                skip_cache: match get("AI_GATEWAY_SKIP_CACHE") {
                    Some(raw) => parse_flag("AI_GATEWAY_SKIP_CACHE", &raw)?,
                    None => false,
                },
                cache_ttl: get("AI_GATEWAY_CACHE_TTL")
                    .map(|raw| parse_number::<u64>("AI_GATEWAY_CACHE_TTL", &raw))
                    .transpose()?,
            }),
            None => None,
        };

        Ok(Self {
            team_domain: get("TEAM_DOMAIN").map(|d| normalize_team_domain(&d)),
            policy_aud: get("POLICY_AUD"),
            account_id: require("CF_ACCOUNT_ID")?,
            api_token: require("CF_API_TOKEN")?,
            model_id: get("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.into()),
            system_prompt: get("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into()),
            max_tokens,
            gateway,
            identity_propagation,
            jwks_cache_ttl,
            inference_api_base: get("INFERENCE_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.into()),
            gateway_base: get("AI_GATEWAY_BASE")
                .unwrap_or_else(|| DEFAULT_GATEWAY_BASE.into()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
        })
    }

    /// Logs the effective settings, leaving secrets out.
    pub fn log_summary(&self) {
        tracing::info!(
            model = %self.model_id,
            max_tokens = self.max_tokens,
            gateway = ?self.gateway.as_ref().map(|g| g.id.as_str()),
            identity_propagation = ?self.identity_propagation,
            team_domain = ?self.team_domain,
            audience_configured = self.policy_aud.is_some(),
            "Loaded settings"
        );
        if self.policy_aud.is_none() || self.team_domain.is_none() {
            tracing::warn!(
                "TEAM_DOMAIN or POLICY_AUD unset; every chat request will be rejected"
            );
        }
    }
}

/// Ensures the team domain carries a scheme and no trailing slash.
pub fn normalize_team_domain(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    match trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        true => trimmed.to_string(),
        false => format!("https://{trimmed}"),
    }
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::invalid(var, e.to_string()))
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(var, format!("expected a boolean, got '{other}'"))),
    }
}
