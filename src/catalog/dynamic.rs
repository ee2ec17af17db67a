//! Live model discovery, one variant per provider kind.

use super::{ModelDescriptor, ProviderDescriptor, ProviderSetting, DEFAULT_MAX_TOKENS};
use crate::credentials;
use crate::error::ProviderFetchError;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DynamicSource {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai-like")]
    OpenAiLike,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "lmstudio")]
    LmStudio,
    #[serde(rename = "together")]
    Together,
}

impl DynamicSource {
    pub async fn fetch(
        self,
        http: &reqwest::Client,
        provider: &ProviderDescriptor,
        user_keys: &BTreeMap<String, String>,
        setting: &ProviderSetting,
    ) -> Result<Vec<ModelDescriptor>, ProviderFetchError> {
        self.fetch_inner(http, provider, user_keys, setting)
            .await
            .map_err(|e| ProviderFetchError {
                provider: provider.id.clone(),
                message: format!("{e:#}"),
            })
    }

    async fn fetch_inner(
        self,
        http: &reqwest::Client,
        provider: &ProviderDescriptor,
        user_keys: &BTreeMap<String, String>,
        setting: &ProviderSetting,
    ) -> anyhow::Result<Vec<ModelDescriptor>> {
        let Some(base) = credentials::resolve_base_url(provider, Some(setting)) else {
            tracing::debug!(provider = %provider.id, "no base URL configured; skipping discovery");
            return Ok(Vec::new());
        };
        let id = provider.id.as_str();

        match self {
            DynamicSource::Ollama => {
                let tags: OllamaTags = get_json(http.get(format!("{base}/api/tags"))).await?;
                Ok(tags
                    .models
                    .into_iter()
                    .map(|m| descriptor(id, format!("{} ({})", m.name, m.details.parameter_size), m.name))
                    .collect())
            }
            DynamicSource::OpenAiLike | DynamicSource::LmStudio => {
                let key = credentials::resolve_api_key(provider, user_keys);
                let mut req = http.get(format!("{base}/models"));
                if !key.is_empty() {
                    req = req.bearer_auth(key);
                }
                let list: ModelList = get_json(req).await?;
                Ok(list
                    .data
                    .into_iter()
                    .map(|m| descriptor(id, m.id.clone(), m.id))
                    .collect())
            }
            DynamicSource::OpenRouter => {
                let list: OpenRouterModels = get_json(http.get(format!("{base}/models"))).await?;
                let mut models = list.data;
                models.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(models
                    .into_iter()
                    .map(|m| {
                        let label = format!(
                            "{} - in:${:.2} out:${:.2} - context {}k",
                            m.name,
                            price(&m.pricing.prompt) * 1_000_000.0,
                            price(&m.pricing.completion) * 1_000_000.0,
                            m.context_length / 1000
                        );
                        descriptor(id, label, m.id)
                    })
                    .collect())
            }
            DynamicSource::Together => {
                let key = credentials::resolve_api_key(provider, user_keys);
                if key.is_empty() {
                    tracing::debug!(provider = %id, "no API key; skipping discovery");
                    return Ok(Vec::new());
                }
                let models: Vec<TogetherModel> =
                    get_json(http.get(format!("{base}/models")).bearer_auth(key)).await?;
                Ok(models
                    .into_iter()
                    .filter(|m| m.kind.as_deref() == Some("chat"))
                    .map(|m| {
                        let label = format!(
                            "{} - in:${:.2} out:${:.2} - context {}k",
                            m.display_name.as_deref().unwrap_or(&m.id),
                            price(&m.pricing.input),
                            price(&m.pricing.output),
                            m.context_length / 1000
                        );
                        descriptor(id, label, m.id)
                    })
                    .collect())
            }
        }
    }
}

fn descriptor(provider: &str, label: String, id: String) -> ModelDescriptor {
    ModelDescriptor {
        id,
        label,
        provider_id: provider.to_string(),
        max_tokens: DEFAULT_MAX_TOKENS,
        supports_image_input: false,
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(req: reqwest::RequestBuilder) -> anyhow::Result<T> {
    let resp = req.send().await.context("request failed")?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("HTTP {status}"));
    }
    let body = resp.bytes().await.context("failed to read response")?;
    serde_json::from_slice(&body).context("unexpected response shape")
}

/// Prices arrive as numbers or as decimal strings depending on the API.
fn price(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    details: OllamaDetails,
}

#[derive(Debug, Deserialize)]
struct OllamaDetails {
    #[serde(default)]
    parameter_size: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelId>,
}

#[derive(Debug, Deserialize)]
struct ModelId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterModels {
    data: Vec<OpenRouterModel>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterModel {
    id: String,
    name: String,
    #[serde(default)]
    context_length: u64,
    pricing: OpenRouterPricing,
}

#[derive(Debug, Deserialize)]
struct OpenRouterPricing {
    #[serde(default)]
    prompt: serde_json::Value,
    #[serde(default)]
    completion: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TogetherModel {
    id: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    context_length: u64,
    #[serde(default)]
    pricing: TogetherPricing,
}

#[derive(Debug, Default, Deserialize)]
struct TogetherPricing {
    #[serde(default)]
    input: serde_json::Value,
    #[serde(default)]
    output: serde_json::Value,
}
