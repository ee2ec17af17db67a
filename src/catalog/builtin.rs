//! Built-in providers, embedded from `providers.toml` at build time.

use super::{DynamicSource, ModelDescriptor, ProviderDescriptor, WireFormat};
use anyhow::Context;
use serde::Deserialize;

const PROVIDERS_TOML: &str = include_str!("providers.toml");

#[derive(Debug, Deserialize)]
struct ProvidersFile {
    providers: Vec<ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    id: String,
    display_name: Option<String>,
    wire: WireFormat,
    base_url: Option<String>,
    base_url_env: Option<String>,
    #[serde(default)]
    key_env: Vec<String>,
    #[serde(default)]
    local: bool,
    api_key_url: Option<String>,
    dynamic: Option<DynamicSource>,
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    label: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    image: bool,
}

fn default_max_tokens() -> u32 {
    super::DEFAULT_MAX_TOKENS
}

impl From<ProviderEntry> for ProviderDescriptor {
    fn from(p: ProviderEntry) -> Self {
        let static_models = p
            .models
            .into_iter()
            .map(|m| ModelDescriptor {
                id: m.id,
                label: m.label,
                provider_id: p.id.clone(),
                max_tokens: m.max_tokens,
                supports_image_input: m.image,
            })
            .collect();

        Self {
            display_name: p.display_name.unwrap_or_else(|| p.id.clone()),
            id: p.id,
            wire: p.wire,
            base_url: p.base_url,
            base_url_env: p.base_url_env,
            key_env: p.key_env,
            local: p.local,
            api_key_url: p.api_key_url,
            static_models,
            dynamic: p.dynamic,
        }
    }
}

pub fn load_builtin_providers() -> anyhow::Result<Vec<ProviderDescriptor>> {
    parse_providers(PROVIDERS_TOML).context("embedded providers.toml is invalid")
}

fn parse_providers(s: &str) -> anyhow::Result<Vec<ProviderDescriptor>> {
    let file: ProvidersFile = toml::from_str(s)?;
    Ok(file.providers.into_iter().map(ProviderDescriptor::from).collect())
}
