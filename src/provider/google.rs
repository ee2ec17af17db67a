use super::sse::{ensure_success, sse_chunks, Step};
use super::{GenerationRequest, OpenStream, Provider, Role};
use crate::prompt;
use anyhow::Context;
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    api_key: String,
    api_base: Url,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            api_key: api_key.into(),
            api_base: Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
                .with_context(|| format!("invalid Gemini base URL: {base_url}"))?,
        })
    }

    fn build_url(&self, model: &str) -> anyhow::Result<Url> {
        // v1beta:streamGenerateContent supports Server-Sent Events with alt=sse.
        // Docs: https://ai.google.dev/api/rest/v1beta/models/streamGenerateContent
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{model}:streamGenerateContent"))?;
        url.query_pairs_mut()
            .append_pair("alt", "sse")
            .append_pair("key", &self.api_key);
        Ok(url)
    }
}

fn build_body(req: &GenerationRequest) -> StreamGenerateContentRequest {
    let last = req.transcript.len().saturating_sub(1);
    let contents = req
        .transcript
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let mut parts = vec![Part {
                text: Some(m.content.clone()),
                inline_data: None,
            }];
            if let Some(image) = req.attachment.as_ref().filter(|_| i == last && m.role == Role::User) {
                parts.push(Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: image.content_type.clone(),
                        data: image.base64_data().to_string(),
                    }),
                });
            }
            Content {
                role: Some(
                    match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts,
            }
        })
        .collect();

    StreamGenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: Some(prompt::system_prompt(req.style_flag)),
                inline_data: None,
            }],
        },
        contents,
        generation_config: GenerationConfig {
            max_output_tokens: req.max_tokens,
        },
    }
}

fn decode(data: &str) -> anyhow::Result<Step> {
    let r: StreamGenerateContentResponse = serde_json::from_str(data)?;
    Ok(extract_text(&r).map_or(Step::Skip, Step::Text))
}

impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url(&req.model_id)?;
            let resp = this
                .http
                .post(url)
                .json(&build_body(&req))
                .send()
                .await
                .context("failed to start Gemini request")?;
            let resp = ensure_success(resp, "Gemini API").await?;
            Ok(sse_chunks(resp, decode))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamGenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

fn extract_text(r: &StreamGenerateContentResponse) -> Option<String> {
    // Concatenate all text parts of the first candidate.
    let cand = r.candidates.first()?;
    let content = cand.content.as_ref()?;
    let out: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if out.is_empty() { None } else { Some(out) }
}
