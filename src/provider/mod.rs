pub mod anthropic;
#[cfg(feature = "google")]
pub mod google;
pub mod ollama;
pub mod openai;
pub mod remote;
pub mod sse;
pub mod stub;
pub mod types;

pub use types::*;

use crate::catalog::{ProviderDescriptor, ProviderSetting, WireFormat};
use crate::credentials;
use anyhow::{anyhow, Context};
use std::collections::BTreeMap;

/// Picks the backend for each request from the provider it names.
#[derive(Debug, Clone)]
pub struct Router {
    http: reqwest::Client,
    providers: Vec<ProviderDescriptor>,
    settings: BTreeMap<String, ProviderSetting>,
    endpoint: Option<String>,
    dry_run: bool,
}

impl Router {
    pub fn new(
        http: reqwest::Client,
        providers: Vec<ProviderDescriptor>,
        settings: BTreeMap<String, ProviderSetting>,
    ) -> Self {
        Self {
            http,
            providers,
            settings,
            endpoint: None,
            dry_run: false,
        }
    }

    /// Send every request to a hosted generation endpoint instead.
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint.filter(|e| !e.trim().is_empty());
        self
    }

    /// Answer every request offline with a canned app.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn backend(&self, req: &GenerationRequest) -> anyhow::Result<Box<dyn Provider + Send + Sync>> {
        if self.dry_run {
            return Ok(Box::new(stub::ScriptedProvider::dry_run()));
        }
        if let Some(endpoint) = &self.endpoint {
            return Ok(Box::new(remote::RemoteProvider::new(self.http.clone(), endpoint.clone())));
        }

        let provider = self
            .providers
            .iter()
            .find(|p| p.id == req.provider_id)
            .with_context(|| format!("unknown provider: {}", req.provider_id))?;
        let setting = self.settings.get(&provider.id);
        if setting.and_then(|s| s.enabled) == Some(false) {
            anyhow::bail!("provider {} is disabled in config", provider.id);
        }

        let base_url = credentials::resolve_base_url(provider, setting)
            .ok_or_else(|| anyhow!("no base URL configured for {}", provider.id))?;
        let api_key = credentials::resolve_api_key(provider, &req.api_keys);
        if api_key.is_empty() && !provider.local {
            tracing::warn!(
                provider = %provider.id,
                "no API key found (set one of {:?} or pass --api-key){}",
                provider.key_env,
                provider
                    .api_key_url
                    .as_deref()
                    .map(|u| format!("; get one at {u}"))
                    .unwrap_or_default()
            );
        }
        tracing::debug!(provider = %provider.id, wire = ?provider.wire, %base_url, "selected backend");

        let http = self.http.clone();
        Ok(match provider.wire {
            WireFormat::OpenAi => Box::new(openai::OpenAiProvider::new(http, base_url, api_key)),
            WireFormat::Anthropic => Box::new(anthropic::AnthropicProvider::new(http, base_url, api_key)),
            WireFormat::Ollama => Box::new(ollama::OllamaProvider::new(http, base_url)),
            #[cfg(feature = "google")]
            WireFormat::Google => Box::new(google::GoogleProvider::new(http, &base_url, api_key)?),
            #[cfg(not(feature = "google"))]
            WireFormat::Google => anyhow::bail!("google provider is not enabled in this build"),
        })
    }
}

impl Provider for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        match self.backend(&req) {
            Ok(backend) => backend.stream_chat(req),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}
