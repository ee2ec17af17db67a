//! One app-generation session: the transcript, the live artifact, and the
//! create/refine state machine around each streamed turn.
//!
//! ```text
//! Initial --start--> Creating --complete--> Created --refine--> Updating
//!                                              ^                   |
//!                                              |                complete
//!                                           Updated <--------------+
//! ```
//!
//! A failed turn puts everything back where it was before the turn began.

use crate::catalog::ProviderCatalog;
use crate::error::{GenerateError, SessionError};
use crate::ingest::{ArtifactObserver, ArtifactUpdate, StreamIngestor};
use crate::provider::{Attachment, GenerationRequest, Message, Provider, Role};
use crate::publish::{Publisher, Share};
use crate::selector::ModelSelector;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Creating,
    Created,
    Updating,
    Updated,
}

impl Phase {
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Creating | Phase::Updating)
    }
}

/// Fixed when the first turn completes. Refine turns reuse its style flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialConfig {
    pub provider_id: String,
    pub model_id: String,
    pub style_flag: bool,
}

#[derive(Debug, Clone)]
struct Checkpoint {
    phase: Phase,
    current: String,
    committed: String,
}

#[derive(Debug)]
pub struct SessionController {
    catalog: Arc<ProviderCatalog>,
    selector: ModelSelector,
    api_keys: BTreeMap<String, String>,
    style_flag: bool,

    phase: Phase,
    transcript: Vec<Message>,
    pending: Vec<Message>,
    current_artifact: String,
    committed_artifact: String,
    initial: Option<InitialConfig>,
    last_model: Option<String>,
    in_flight: Option<GenerationRequest>,
    checkpoint: Option<Checkpoint>,
}

/// Forwards live publishes to the renderer after recording them.
struct LiveArtifact<'a> {
    current: &'a mut String,
    committed: &'a mut String,
    renderer: &'a mut dyn ArtifactObserver,
}

impl ArtifactObserver for LiveArtifact<'_> {
    fn publish(&mut self, update: ArtifactUpdate<'_>) {
        self.current.clear();
        self.current.push_str(update.raw);
        self.committed.clear();
        self.committed.push_str(update.code);
        self.renderer.publish(update);
    }
}

impl SessionController {
    pub fn new(catalog: Arc<ProviderCatalog>, selector: ModelSelector, api_keys: BTreeMap<String, String>) -> Self {
        Self {
            catalog,
            selector,
            api_keys,
            style_flag: false,
            phase: Phase::Initial,
            transcript: Vec::new(),
            pending: Vec::new(),
            current_artifact: String::new(),
            committed_artifact: String::new(),
            initial: None,
            last_model: None,
            in_flight: None,
            checkpoint: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Raw model output of the latest turn.
    pub fn current_artifact(&self) -> &str {
        &self.current_artifact
    }

    /// Parsed code of the latest turn.
    pub fn committed_artifact(&self) -> &str {
        &self.committed_artifact
    }

    pub fn initial_config(&self) -> Option<&InitialConfig> {
        self.initial.as_ref()
    }

    pub fn in_flight(&self) -> Option<&GenerationRequest> {
        self.in_flight.as_ref()
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn style_flag(&self) -> bool {
        self.style_flag
    }

    /// The control only; a running session keeps the flag it started with.
    pub fn set_style_flag(&mut self, on: bool) {
        self.style_flag = on;
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.phase.is_busy() {
            return Err(SessionError::Busy(self.phase));
        }
        Ok(())
    }

    pub fn select_provider(&mut self, provider_id: &str) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.selector.select_provider(&self.catalog.snapshot(), provider_id);
        Ok(())
    }

    pub fn select_model(&mut self, model_id: &str) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.selector.select_model(&self.catalog.snapshot(), model_id);
        Ok(())
    }

    pub fn attach(&mut self, attachment: Attachment) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.selector.attach(&self.catalog.snapshot(), attachment)
    }

    fn save_checkpoint(&mut self) {
        self.checkpoint = Some(Checkpoint {
            phase: self.phase,
            current: self.current_artifact.clone(),
            committed: self.committed_artifact.clone(),
        });
    }

    /// Request for the current selection, re-resolved against the live catalog.
    /// The attachment only survives if the resolved model takes images.
    fn request(&mut self, transcript: Vec<Message>, style_flag: bool) -> GenerationRequest {
        let snapshot = self.catalog.snapshot();
        self.selector.reconcile(&snapshot);
        let model = self.selector.active_model(&snapshot);
        let attachment = self
            .selector
            .attachment()
            .filter(|_| model.supports_image_input)
            .cloned();

        GenerationRequest {
            provider_id: model.provider_id,
            model_id: model.id,
            max_tokens: model.max_tokens,
            transcript,
            style_flag,
            api_keys: self.api_keys.clone(),
            attachment,
        }
    }

    /// Begin the first turn of a new app.
    pub fn start(&mut self, prompt: &str) -> Result<&GenerationRequest, SessionError> {
        self.ensure_idle()?;
        if self.phase != Phase::Initial {
            return Err(SessionError::AlreadyStarted);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyInput("prompt"));
        }

        self.save_checkpoint();
        self.current_artifact.clear();
        self.committed_artifact.clear();
        self.pending = vec![Message::user(prompt)];

        let req = self.request(self.pending.clone(), self.style_flag);
        tracing::info!(provider = %req.provider_id, model = %req.model_id, "creating app");
        self.phase = Phase::Creating;
        Ok(self.in_flight.insert(req))
    }

    /// Begin a turn that changes the current app. The current selection
    /// answers it; the style flag stays the one the app was created with.
    pub fn refine(&mut self, modification: &str) -> Result<&GenerationRequest, SessionError> {
        self.ensure_idle()?;
        let Some(style_flag) = self.initial.as_ref().map(|c| c.style_flag) else {
            return Err(SessionError::NotStarted);
        };
        let modification = modification.trim();
        if modification.is_empty() {
            return Err(SessionError::EmptyInput("modification"));
        }

        self.save_checkpoint();
        self.pending = vec![
            Message::assistant(self.current_artifact.clone()),
            Message::user(modification),
        ];
        let mut transcript = self.transcript.clone();
        transcript.extend(self.pending.iter().cloned());

        let req = self.request(transcript, style_flag);
        tracing::info!(
            turn = req.transcript.len() / 2 + 1,
            provider = %req.provider_id,
            model = %req.model_id,
            "updating app"
        );
        self.phase = Phase::Updating;
        Ok(self.in_flight.insert(req))
    }

    /// Commit the in-flight turn.
    pub fn complete(&mut self) -> Result<Phase, SessionError> {
        let next = match self.phase {
            Phase::Creating => Phase::Created,
            Phase::Updating => Phase::Updated,
            _ => return Err(SessionError::NotStarted),
        };
        let Some(req) = self.in_flight.take() else {
            return Err(SessionError::NotStarted);
        };

        self.transcript.append(&mut self.pending);
        self.last_model = Some(req.model_id.clone());
        if self.initial.is_none() {
            self.initial = Some(InitialConfig {
                provider_id: req.provider_id,
                model_id: req.model_id,
                style_flag: req.style_flag,
            });
        }
        if req.attachment.is_some() {
            self.selector.clear_attachment();
        }
        self.checkpoint = None;
        self.phase = next;
        tracing::info!(phase = ?next, messages = self.transcript.len(), "turn complete");
        Ok(next)
    }

    /// Abandon the in-flight turn and restore the state from before it.
    pub fn fail(&mut self, error: GenerateError) -> SessionError {
        if let Some(cp) = self.checkpoint.take() {
            self.phase = cp.phase;
            self.current_artifact = cp.current;
            self.committed_artifact = cp.committed;
        }
        self.pending.clear();
        self.in_flight = None;
        tracing::warn!(phase = ?self.phase, "turn failed: {error}");
        SessionError::Generate(error)
    }

    /// Drop the app and start over. The model choice is kept.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.phase = Phase::Initial;
        self.transcript.clear();
        self.pending.clear();
        self.current_artifact.clear();
        self.committed_artifact.clear();
        self.initial = None;
        self.last_model = None;
        self.in_flight = None;
        self.checkpoint = None;
        Ok(())
    }

    /// Stream the in-flight request through `provider` and settle the turn.
    pub async fn run_turn(
        &mut self,
        provider: &dyn Provider,
        ingestor: &StreamIngestor,
        renderer: &mut dyn ArtifactObserver,
    ) -> Result<Phase, SessionError> {
        let Some(req) = self.in_flight.clone() else {
            return Err(SessionError::NotStarted);
        };

        let stream = match provider.stream_chat(req).await {
            Ok(s) => s,
            Err(e) => return Err(self.fail(GenerateError::Transport(format!("{e:#}")))),
        };

        let mut live = LiveArtifact {
            current: &mut self.current_artifact,
            committed: &mut self.committed_artifact,
            renderer,
        };
        match ingestor.ingest(stream, &mut live).await {
            Ok(done) => {
                tracing::debug!(publishes = done.publishes, code = done.code.len(), "stream settled");
                self.current_artifact = done.raw;
                self.committed_artifact = done.code;
                self.complete()
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn generate(
        &mut self,
        prompt: &str,
        provider: &dyn Provider,
        ingestor: &StreamIngestor,
        renderer: &mut dyn ArtifactObserver,
    ) -> Result<Phase, SessionError> {
        self.start(prompt)?;
        self.run_turn(provider, ingestor, renderer).await
    }

    pub async fn refine_turn(
        &mut self,
        modification: &str,
        provider: &dyn Provider,
        ingestor: &StreamIngestor,
        renderer: &mut dyn ArtifactObserver,
    ) -> Result<Phase, SessionError> {
        self.refine(modification)?;
        self.run_turn(provider, ingestor, renderer).await
    }

    /// Hand the finished app to `publisher` and return its share id.
    pub fn publish(&self, publisher: &dyn Publisher) -> anyhow::Result<String> {
        match self.phase {
            Phase::Created | Phase::Updated => {}
            Phase::Initial => return Err(SessionError::NotStarted.into()),
            busy => return Err(SessionError::Busy(busy).into()),
        }
        let prompt = self
            .transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let model = self.last_model.clone().unwrap_or_default();

        publisher.publish(&Share {
            code: self.committed_artifact.clone(),
            prompt,
            model,
        })
    }
}
