use super::{ChatChunk, GenerationRequest, OpenStream, Provider};
use anyhow::anyhow;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone)]
enum Failure {
    Open(String),
    /// Fail after this many chunks were sent.
    After(usize, String),
}

/// Plays back fixed chunks. Used for `--dry-run` and in tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    chunks: Vec<String>,
    gaps: Vec<Duration>,
    failure: Option<Failure>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedProvider {
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// A small fenced app that echoes the prompt, dripped line by line.
    pub fn dry_run() -> Self {
        let doc = [
            "Here is your app:\n\n",
            "```tsx\n",
            "export default function App() {\n",
            "  return (\n",
            "    <main className=\"p-8\">\n",
            "      <h1 className=\"text-2xl font-bold\">{PROMPT}</h1>\n",
            "    </main>\n",
            "  );\n",
            "}\n",
            "```\n",
        ];
        Self::new(doc.iter().map(|s| s.to_string()).collect())
            .with_gaps(vec![Duration::from_millis(20); doc.len()])
    }

    /// Sleep `gaps[i]` before sending chunk `i`.
    pub fn with_gaps(mut self, gaps: Vec<Duration>) -> Self {
        self.gaps = gaps;
        self
    }

    /// Refuse to open the stream at all.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(Failure::Open(message.into()));
        self
    }

    /// Break the stream after `sent` chunks.
    pub fn failing_after(mut self, sent: usize, message: impl Into<String>) -> Self {
        self.failure = Some(Failure::After(sent, message.into()));
        self
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// Substitute the latest user message for `{PROMPT}`.
fn render(chunk: &str, req: &GenerationRequest) -> String {
    if !chunk.contains("{PROMPT}") {
        return chunk.to_string();
    }
    let prompt = req
        .transcript
        .last()
        .map(|m| m.content.replace(['<', '>', '{', '}'], ""))
        .unwrap_or_default();
    chunk.replace("{PROMPT}", prompt.trim())
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn stream_chat(&self, req: GenerationRequest) -> OpenStream {
        let this = self.clone();

        Box::pin(async move {
            if let Ok(mut seen) = this.requests.lock() {
                seen.push(req.clone());
            }
            if let Some(Failure::Open(message)) = &this.failure {
                return Err(anyhow!("{message}"));
            }

            let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(32);

            tokio::spawn(async move {
                for (i, chunk) in this.chunks.iter().enumerate() {
                    if let Some(Failure::After(sent, message)) = &this.failure {
                        if i == *sent {
                            let _ = tx.send(Err(anyhow!("{message}"))).await;
                            return;
                        }
                    }
                    if let Some(gap) = this.gaps.get(i).filter(|g| !g.is_zero()) {
                        tokio::time::sleep(*gap).await;
                    }
                    let text = render(chunk, &req);
                    if tx.send(Ok(ChatChunk { text })).await.is_err() {
                        return;
                    }
                }
                if let Some(Failure::After(sent, message)) = &this.failure {
                    if *sent >= this.chunks.len() {
                        let _ = tx.send(Err(anyhow!("{message}"))).await;
                    }
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as super::ChunkStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence;
    use tokio_stream::StreamExt;

    async fn collect(p: &ScriptedProvider, prompt: &str) -> Vec<anyhow::Result<String>> {
        let stream = p.stream_chat(GenerationRequest::for_test(prompt)).await.unwrap();
        stream.map(|r| r.map(|c| c.text)).collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_yields_fenced_app_with_prompt() {
        let p = ScriptedProvider::dry_run();
        let text: String = collect(&p, "A <b>timer</b>")
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let code = fence::parse_code(&text);
        assert!(code.starts_with("export default function App()"));
        assert!(code.contains("A btimer/b"));
        assert_eq!(p.requests().len(), 1);
    }

    #[tokio::test]
    async fn failing_after_breaks_mid_stream() {
        let p = ScriptedProvider::new(vec!["a".into(), "b".into()]).failing_after(1, "reset");
        let items = collect(&p, "x").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "a");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn failing_open_rejects_request() {
        let p = ScriptedProvider::new(Vec::new()).failing_open("503");
        assert!(p.stream_chat(GenerationRequest::for_test("x")).await.is_err());
        assert_eq!(p.requests().len(), 1);
    }
}
