//! Provider and model catalog.
//!
//! Static models come from the embedded provider table; providers with a
//! discovery endpoint add live models on every build. A build produces a new
//! immutable [`CatalogSnapshot`] that replaces the previous one wholesale.

mod builtin;
mod dynamic;

pub use builtin::load_builtin_providers;
pub use dynamic::DynamicSource;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Max tokens assumed for discovered models that do not report one.
pub const DEFAULT_MAX_TOKENS: u32 = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub label: String,
    pub provider_id: String,
    pub max_tokens: u32,
    pub supports_image_input: bool,
}

/// How generation requests are encoded for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub wire: WireFormat,
    /// API root used when neither settings nor the environment override it.
    pub base_url: Option<String>,
    pub base_url_env: Option<String>,
    /// Environment variables consulted, in order, for an API key.
    pub key_env: Vec<String>,
    /// Runs on the user's machine; `localhost` is rewritten inside Docker.
    pub local: bool,
    pub api_key_url: Option<String>,
    pub static_models: Vec<ModelDescriptor>,
    pub dynamic: Option<DynamicSource>,
}

/// Per-provider settings from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSetting {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
}

/// Immutable view of every known model at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    models: Vec<ModelDescriptor>,
    providers: Vec<String>,
}

impl CatalogSnapshot {
    /// Deduplicate by (provider, model id), keeping the first occurrence.
    pub fn new(models: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let models: Vec<ModelDescriptor> = models
            .into_iter()
            .filter(|m| seen.insert((m.provider_id.clone(), m.id.clone())))
            .collect();

        let providers = {
            let mut seen = HashSet::new();
            models
                .iter()
                .filter(|m| seen.insert(m.provider_id.as_str()))
                .map(|m| m.provider_id.clone())
                .collect()
        };

        Self { models, providers }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Distinct provider ids in first-seen order.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn models_for<'a>(&'a self, provider_id: &'a str) -> impl Iterator<Item = &'a ModelDescriptor> + 'a {
        self.models.iter().filter(move |m| m.provider_id == provider_id)
    }

    pub fn find(&self, provider_id: &str, model_id: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.provider_id == provider_id && m.id == model_id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Dynamic entries first so they win over a static duplicate.
pub fn merge(
    dynamic: impl IntoIterator<Item = ModelDescriptor>,
    statics: impl IntoIterator<Item = ModelDescriptor>,
) -> CatalogSnapshot {
    CatalogSnapshot::new(dynamic.into_iter().chain(statics))
}

/// Fetch every discovery endpoint concurrently and merge with static models.
///
/// A failing source contributes nothing; the build itself never fails.
pub async fn build_snapshot(
    http: &reqwest::Client,
    providers: &[ProviderDescriptor],
    user_keys: &BTreeMap<String, String>,
    settings: &BTreeMap<String, ProviderSetting>,
) -> CatalogSnapshot {
    let fetches = providers.iter().filter_map(|p| {
        let source = p.dynamic?;
        let setting = settings.get(&p.id).cloned().unwrap_or_default();
        if setting.enabled == Some(false) {
            tracing::debug!(provider = %p.id, "provider disabled; skipping model discovery");
            return None;
        }
        Some(async move {
            match source.fetch(http, p, user_keys, &setting).await {
                Ok(models) => {
                    tracing::debug!(provider = %p.id, count = models.len(), "discovered models");
                    models
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    Vec::new()
                }
            }
        })
    });

    let dynamic: Vec<ModelDescriptor> = join_all(fetches).await.into_iter().flatten().collect();
    let statics = providers.iter().flat_map(|p| p.static_models.iter().cloned());
    merge(dynamic, statics)
}

/// Declared providers plus the current snapshot.
///
/// Readers take an `Arc` of the snapshot and keep it as long as they like;
/// a refresh swaps in a new one without touching theirs.
#[derive(Debug)]
pub struct ProviderCatalog {
    providers: Vec<ProviderDescriptor>,
    current: watch::Sender<Arc<CatalogSnapshot>>,
}

impl ProviderCatalog {
    /// Start with the static models only.
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        let initial = merge(
            Vec::new(),
            providers.iter().flat_map(|p| p.static_models.iter().cloned()),
        );
        let (current, _) = watch::channel(Arc::new(initial));
        Self { providers, current }
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Ok(Self::new(load_builtin_providers()?))
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.borrow().clone()
    }

    /// Get notified when a refresh publishes a new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
        self.current.subscribe()
    }

    pub fn replace(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.send_replace(snapshot.clone());
        snapshot
    }

    /// Rebuild from static and discovered models, then swap it in.
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        user_keys: &BTreeMap<String, String>,
        settings: &BTreeMap<String, ProviderSetting>,
    ) -> Arc<CatalogSnapshot> {
        let snapshot = build_snapshot(http, &self.providers, user_keys, settings).await;
        tracing::info!(
            models = snapshot.len(),
            providers = snapshot.providers().len(),
            "model catalog ready"
        );
        self.replace(snapshot)
    }
}

#[cfg(test)]
pub(crate) fn model(provider: &str, id: &str, label: &str) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        label: label.to_string(),
        provider_id: provider.to_string(),
        max_tokens: DEFAULT_MAX_TOKENS,
        supports_image_input: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_port_url, serve_json};

    fn provider(id: &str, statics: &[&str], dynamic: Option<DynamicSource>) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            wire: WireFormat::OpenAi,
            base_url: None,
            base_url_env: None,
            key_env: Vec::new(),
            local: false,
            api_key_url: None,
            static_models: statics.iter().map(|m| model(id, m, m)).collect(),
            dynamic,
        }
    }

    #[test]
    fn dynamic_entry_wins_over_static_duplicate() {
        let statics = vec![model("A", "a-1", "static a-1"), model("A", "a-2", "static a-2")];
        let dynamic = vec![model("A", "a-1", "live a-1")];

        let snap = merge(dynamic, statics);

        assert_eq!(snap.len(), 2);
        assert_eq!(snap.find("A", "a-1").unwrap().label, "live a-1");
        assert_eq!(snap.models()[0].label, "live a-1");
    }

    #[test]
    fn same_model_id_under_different_providers_is_kept() {
        let snap = merge(Vec::new(), vec![model("A", "shared", "a"), model("B", "shared", "b")]);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn providers_are_listed_in_first_seen_order() {
        let snap = merge(
            vec![model("Ollama", "llama3", "llama3")],
            vec![
                model("Anthropic", "c1", "c1"),
                model("Ollama", "qwen", "qwen"),
                model("Cohere", "command", "command"),
                model("Anthropic", "c2", "c2"),
            ],
        );
        assert_eq!(snap.providers(), ["Ollama", "Anthropic", "Cohere"]);
        assert_eq!(snap.models_for("Anthropic").count(), 2);
    }

    #[tokio::test]
    async fn failing_source_degrades_to_static_models() {
        let base = serve_json(200, r#"{"models":[{"name":"llama3:8b","details":{"parameter_size":"8B"}}]}"#).await;
        let providers = vec![
            provider("Anthropic", &["claude"], None),
            provider("Ollama", &[], Some(DynamicSource::Ollama)),
            provider("LMStudio", &["pinned"], Some(DynamicSource::LmStudio)),
        ];
        let settings = BTreeMap::from([
            (
                "Ollama".to_string(),
                ProviderSetting { enabled: None, base_url: Some(base) },
            ),
            (
                "LMStudio".to_string(),
                ProviderSetting { enabled: None, base_url: Some(closed_port_url()) },
            ),
        ]);

        let snap = build_snapshot(&reqwest::Client::new(), &providers, &BTreeMap::new(), &settings).await;

        let ids: Vec<(&str, &str)> = snap
            .models()
            .iter()
            .map(|m| (m.provider_id.as_str(), m.id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![("Ollama", "llama3:8b"), ("Anthropic", "claude"), ("LMStudio", "pinned")]
        );
        assert_eq!(snap.find("Ollama", "llama3:8b").unwrap().label, "llama3:8b (8B)");
    }

    #[tokio::test]
    async fn malformed_response_is_contained() {
        let base = serve_json(200, r#"{"unexpected": true}"#).await;
        let providers = vec![
            provider("Ollama", &[], Some(DynamicSource::Ollama)),
            provider("Groq", &["llama"], None),
        ];
        let settings = BTreeMap::from([(
            "Ollama".to_string(),
            ProviderSetting { enabled: None, base_url: Some(base) },
        )]);

        let snap = build_snapshot(&reqwest::Client::new(), &providers, &BTreeMap::new(), &settings).await;
        assert_eq!(snap.providers(), ["Groq"]);
    }

    #[tokio::test]
    async fn disabled_provider_is_not_fetched() {
        let providers = vec![provider("Ollama", &["static"], Some(DynamicSource::Ollama))];
        let settings = BTreeMap::from([(
            "Ollama".to_string(),
            ProviderSetting {
                enabled: Some(false),
                // Would fail loudly if contacted.
                base_url: Some(closed_port_url()),
            },
        )]);

        let snap = build_snapshot(&reqwest::Client::new(), &providers, &BTreeMap::new(), &settings).await;
        assert_eq!(snap.len(), 1);
    }

    #[tokio::test]
    async fn refresh_swaps_without_touching_held_snapshots() {
        let base = serve_json(200, r#"{"models":[{"name":"phi3","details":{"parameter_size":"3B"}}]}"#).await;
        let catalog = ProviderCatalog::new(vec![
            provider("Anthropic", &["claude"], None),
            provider("Ollama", &[], Some(DynamicSource::Ollama)),
        ]);
        let before = catalog.snapshot();
        let mut updates = catalog.subscribe();

        let settings = BTreeMap::from([(
            "Ollama".to_string(),
            ProviderSetting { enabled: None, base_url: Some(base) },
        )]);
        let after = catalog
            .refresh(&reqwest::Client::new(), &BTreeMap::new(), &settings)
            .await;

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert!(updates.has_changed().unwrap());
        assert_eq!(catalog.snapshot().len(), 2);
    }
}
