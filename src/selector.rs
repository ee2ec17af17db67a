//! Active provider/model choice, with fallback and persistence.

use crate::catalog::{CatalogSnapshot, ModelDescriptor};
use crate::error::SessionError;
use crate::prefs::{PreferenceStore, SELECTED_MODEL, SELECTED_PROVIDER};
use crate::provider::Attachment;

pub const DEFAULT_PROVIDER: &str = "Anthropic";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Descriptor used when the catalog knows nothing better.
pub fn default_model() -> ModelDescriptor {
    ModelDescriptor {
        id: DEFAULT_MODEL.to_string(),
        label: "Claude 3.5 Sonnet (new)".to_string(),
        provider_id: DEFAULT_PROVIDER.to_string(),
        max_tokens: 8000,
        supports_image_input: true,
    }
}

/// The requested pair if the catalog has it, else the provider's first
/// model, else the hard default.
pub fn resolve(catalog: &CatalogSnapshot, provider_id: &str, model_id: &str) -> (String, String) {
    if catalog.find(provider_id, model_id).is_some() {
        return (provider_id.to_string(), model_id.to_string());
    }
    match catalog.models_for(provider_id).next() {
        Some(first) => (first.provider_id.clone(), first.id.clone()),
        None => (DEFAULT_PROVIDER.to_string(), DEFAULT_MODEL.to_string()),
    }
}

pub struct ModelSelector {
    provider_id: String,
    model_id: String,
    attachment: Option<Attachment>,
    store: Box<dyn PreferenceStore>,
}

impl std::fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelector")
            .field("provider_id", &self.provider_id)
            .field("model_id", &self.model_id)
            .field("attachment", &self.attachment.as_ref().map(|a| &a.name))
            .finish_non_exhaustive()
    }
}

impl ModelSelector {
    /// Persisted choice first, then the configured one, then the defaults.
    pub fn bootstrap(
        catalog: &CatalogSnapshot,
        store: Box<dyn PreferenceStore>,
        configured_provider: Option<&str>,
        configured_model: Option<&str>,
    ) -> Self {
        let read = |key: &str| match store.get(key) {
            Ok(v) => v.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!("{e}; using defaults");
                None
            }
        };
        let provider = read(SELECTED_PROVIDER)
            .or_else(|| configured_provider.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let model = read(SELECTED_MODEL)
            .or_else(|| configured_model.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let (provider_id, model_id) = resolve(catalog, &provider, &model);
        tracing::debug!(%provider_id, %model_id, "model selection bootstrapped");

        Self {
            provider_id,
            model_id,
            attachment: None,
            store,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn active_model(&self, catalog: &CatalogSnapshot) -> ModelDescriptor {
        catalog
            .find(&self.provider_id, &self.model_id)
            .cloned()
            .unwrap_or_else(default_model)
    }

    /// Switch provider; the model is re-resolved against its models.
    pub fn select_provider(&mut self, catalog: &CatalogSnapshot, provider_id: &str) {
        let (provider, model) = resolve(catalog, provider_id, &self.model_id);
        self.provider_id = provider;
        self.model_id = model;
        self.persist_selection();
        self.enforce_attachment(catalog);
    }

    /// Switch model within the active provider. Empty ids are ignored.
    pub fn select_model(&mut self, catalog: &CatalogSnapshot, model_id: &str) {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return;
        }
        let (provider, model) = resolve(catalog, &self.provider_id, model_id);
        self.provider_id = provider;
        self.model_id = model;
        self.persist_selection();
        self.enforce_attachment(catalog);
    }

    /// Re-resolve after the catalog changed underneath the selection.
    pub fn reconcile(&mut self, catalog: &CatalogSnapshot) {
        let (provider, model) = resolve(catalog, &self.provider_id, &self.model_id);
        self.provider_id = provider;
        self.model_id = model;
        self.enforce_attachment(catalog);
    }

    pub fn attach(&mut self, catalog: &CatalogSnapshot, attachment: Attachment) -> Result<(), SessionError> {
        let model = self.active_model(catalog);
        if !model.supports_image_input {
            return Err(SessionError::AttachmentUnsupported(model.id));
        }
        self.attachment = Some(attachment);
        Ok(())
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    /// Record an explicit choice. Storage failures are logged and ignored.
    pub fn persist(&mut self, provider_id: &str, model_id: &str) {
        self.persist_key(SELECTED_PROVIDER, provider_id);
        self.persist_key(SELECTED_MODEL, model_id);
    }

    /// Save the pair actually in use, not the one asked for.
    fn persist_selection(&mut self) {
        let (provider, model) = (self.provider_id.clone(), self.model_id.clone());
        self.persist(&provider, &model);
    }

    fn persist_key(&mut self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!("{e}; choice not saved");
        }
    }

    /// No attachment ever accompanies an image-incapable model.
    fn enforce_attachment(&mut self, catalog: &CatalogSnapshot) {
        if self.attachment.is_some() && !self.active_model(catalog).supports_image_input {
            tracing::info!(model = %self.model_id, "model has no image input; dropping attachment");
            self.attachment = None;
        }
    }
}
