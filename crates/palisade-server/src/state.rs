//! Shared server state.

use std::sync::Arc;

use palisade_auth::{AccessPolicy, AccessVerifier, KeySetRegistry};
use palisade_config::Settings;
use palisade_llm::{InferenceBackend, WorkersAiClient};

/// Shared server state accessible from all handlers.
pub struct AppState {
    pub settings: Settings,
    pub verifier: AccessVerifier,
    pub backend: Arc<dyn InferenceBackend>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        verifier: AccessVerifier,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            settings,
            verifier,
            backend,
        }
    }

    /// Wires the production verifier and inference client from settings.
    ///
    /// The key set is shared through the process-wide registry and fetched
    /// lazily on the first chat request.
    pub fn from_settings(settings: Settings) -> Self {
        let policy = AccessPolicy {
            issuer: settings.team_domain.clone(),
            audience: settings.policy_aud.clone(),
        };
        let verifier =
            AccessVerifier::new(policy, KeySetRegistry::global(), settings.jwks_cache_ttl);

        let backend = WorkersAiClient::new(&settings.account_id, &settings.api_token)
            .with_api_base(&settings.inference_api_base)
            .with_gateway_base(&settings.gateway_base);

        Self::new(settings, verifier, Arc::new(backend))
    }
}
