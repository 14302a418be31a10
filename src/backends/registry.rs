use super::{AnthropicBackend, AskSageBackend, Backend, BackendId, OpenAiBackend};
use crate::config::Config;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The integrated providers, built once at startup and shared by `Arc`
#[derive(Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendId, Arc<dyn Backend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Build every provider client, reading API keys through `lookup`
    pub fn from_config<F>(config: &Config, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::with_capacity(BackendId::ALL.len());
        for id in BackendId::ALL {
            let settings = config.backend(id);
            let api_key = lookup(settings.api_key_env());
            let backend: Arc<dyn Backend> = match id {
                BackendId::AskSage => Arc::new(AskSageBackend::new(settings, api_key)),
                BackendId::Anthropic => Arc::new(AnthropicBackend::new(settings, api_key)),
                BackendId::OpenAi => Arc::new(OpenAiBackend::new(settings, api_key)),
            };
            tracing::info!(
                backend = %id,
                configured = backend.is_configured(),
                compliance_authorized = backend.is_compliance_authorized(),
                "Registered backend"
            );
            backends.push(backend);
        }
        Self::from_backends(backends)
    }

    /// Registry over arbitrary implementations; later duplicates replace earlier ones
    pub fn from_backends(backends: impl IntoIterator<Item = Arc<dyn Backend>>) -> Self {
        Self {
            backends: backends.into_iter().map(|b| (b.id(), b)).collect(),
        }
    }

    pub fn get(&self, id: BackendId) -> Option<&Arc<dyn Backend>> {
        self.backends.get(&id)
    }

    /// All backends in registry order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.values()
    }

    pub fn is_configured(&self, id: BackendId) -> bool {
        self.get(id).is_some_and(|b| b.is_configured())
    }

    pub fn configured(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.iter().filter(|b| b.is_configured())
    }

    /// Configured backends cleared for sensitive content
    pub fn compliance_authorized(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.configured().filter(|b| b.is_compliance_authorized())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
