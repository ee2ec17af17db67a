use super::sse::{ensure_success, json_line_chunks, Step};
use super::{GenerationRequest, OpenStream, Provider, Role};
use crate::prompt;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::{json, Value};

/// Local Ollama server, `/api/chat` with newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

fn body(req: &GenerationRequest) -> Value {
    let mut messages = vec![json!({
        "role": "system",
        "content": prompt::system_prompt(req.style_flag),
    })];
    let last = req.transcript.len().saturating_sub(1);
    for (i, m) in req.transcript.iter().enumerate() {
        let mut msg = json!({ "role": m.role.as_str(), "content": m.content });
        if let Some(image) = req.attachment.as_ref().filter(|_| i == last && m.role == Role::User) {
            msg["images"] = json!([image.base64_data()]);
        }
        messages.push(msg);
    }

    json!({
        "model": req.model_id,
        "messages": messages,
        "stream": true,
        "options": { "num_predict": req.max_tokens },
    })
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

fn decode(line: &str) -> anyhow::Result<Step> {
    let l: ChatLine = serde_json::from_str(line)?;
    if let Some(e) = l.error {
        return Err(anyhow!("Ollama error: {e}"));
    }
    match l.message.map(|m| m.content).filter(|t| !t.is_empty()) {
        Some(text) => Ok(Step::Text(text)),
        None if l.done => Ok(Step::Done),
        None => Ok(Step::Skip),
    }
}

impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        let this = self.clone();

        Box::pin(async move {
            let url = format!("{}/api/chat", this.base_url);
            let resp = this
                .http
                .post(&url)
                .json(&body(&req))
                .send()
                .await
                .with_context(|| format!("failed to reach {url}"))?;
            let resp = ensure_success(resp, "Ollama").await?;
            Ok(json_line_chunks(resp, decode))
        })
    }
}
