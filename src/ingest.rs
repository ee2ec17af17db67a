//! Debounced ingestion of a streamed generation.

use crate::error::GenerateError;
use crate::fence;
use crate::provider::ChatChunk;
use futures_core::Stream;
use std::time::Duration;
use tokio::time::Instant;
use tokio_stream::StreamExt;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(5);

/// One live update: the raw buffer so far and its parsed code.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactUpdate<'a> {
    pub raw: &'a str,
    pub code: &'a str,
}

/// Receives parsed artifacts while a turn is streaming.
pub trait ArtifactObserver {
    fn publish(&mut self, update: ArtifactUpdate<'_>);
}

impl<F> ArtifactObserver for F
where
    F: FnMut(ArtifactUpdate<'_>),
{
    fn publish(&mut self, update: ArtifactUpdate<'_>) {
        self(update)
    }
}

/// Result of a stream that ended normally.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub raw: String,
    pub code: String,
    pub publishes: usize,
}

#[derive(Debug, Clone)]
pub struct StreamIngestor {
    delay: Duration,
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl StreamIngestor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Consume `stream` until it ends or fails.
    ///
    /// Every chunk re-arms the debounce timer; the observer sees one publish
    /// per quiet window and a final one at end of stream if anything changed
    /// since the last publish.
    pub async fn ingest<S>(
        &self,
        mut stream: S,
        observer: &mut dyn ArtifactObserver,
    ) -> Result<Ingested, GenerateError>
    where
        S: Stream<Item = anyhow::Result<ChatChunk>> + Unpin,
    {
        let mut buffer = String::new();
        let mut code = String::new();
        let mut dirty = false;
        let mut armed = false;
        let mut publishes = 0usize;

        let timer = tokio::time::sleep(self.delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                item = stream.next() => match item {
                    Some(Ok(chunk)) => {
                        if chunk.text.is_empty() {
                            continue;
                        }
                        buffer.push_str(&chunk.text);
                        dirty = true;
                        timer.as_mut().reset(Instant::now() + self.delay);
                        armed = true;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(received = buffer.len(), "generation stream failed: {e:#}");
                        return Err(GenerateError::StreamRead {
                            message: format!("{e:#}"),
                            partial: buffer,
                        });
                    }
                    None => break,
                },

                () = &mut timer, if armed => {
                    armed = false;
                    dirty = false;
                    code = fence::parse_code(&buffer);
                    publishes += 1;
                    tracing::trace!(raw = buffer.len(), code = code.len(), "debounced publish");
                    observer.publish(ArtifactUpdate { raw: &buffer, code: &code });
                }
            }
        }

        if dirty {
            code = fence::parse_code(&buffer);
            publishes += 1;
            observer.publish(ArtifactUpdate { raw: &buffer, code: &code });
        }

        tracing::debug!(raw = buffer.len(), publishes, "stream complete");
        Ok(Ingested {
            raw: buffer,
            code,
            publishes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::ScriptedProvider;
    use crate::provider::{GenerationRequest, Provider};

    fn chunks(parts: &[&str]) -> impl Stream<Item = anyhow::Result<ChatChunk>> + Unpin {
        let items: Vec<anyhow::Result<ChatChunk>> = parts
            .iter()
            .map(|p| Ok(ChatChunk { text: p.to_string() }))
            .collect();
        tokio_stream::iter(items)
    }

    #[tokio::test]
    async fn todo_scenario_strips_split_closing_fence() {
        let mut seen = Vec::new();
        let mut observer = |u: ArtifactUpdate<'_>| seen.push(u.code.to_string());

        let out = StreamIngestor::default()
            .ingest(chunks(&["```typescript\nconst x=1;", "`", "`"]), &mut observer)
            .await
            .unwrap();

        assert_eq!(out.code, "const x=1;");
        assert_eq!(seen.last().map(String::as_str), Some("const x=1;"));
    }

    #[tokio::test]
    async fn split_invariance_over_every_boundary() {
        let full = "Here you go:\n```tsx\nimport { useState } from \"react\";\n\nexport default function App() {\n  return <ul />;\n}\n```\n";
        let expected = fence::parse_code(full);

        for split in 1..full.len() {
            for width in [1usize, 3, 7] {
                let mut parts = vec![&full[..split]];
                let mut rest = &full[split..];
                while !rest.is_empty() {
                    let n = width.min(rest.len());
                    parts.push(&rest[..n]);
                    rest = &rest[n..];
                }
                let mut sink = |_: ArtifactUpdate<'_>| {};
                let out = StreamIngestor::default()
                    .ingest(chunks(&parts), &mut sink)
                    .await
                    .unwrap();
                assert_eq!(out.code, expected, "split at {split}, width {width}");
                assert_eq!(out.raw, full);
            }
        }
    }

    #[tokio::test]
    async fn burst_collapses_into_one_final_publish() {
        let mut count = 0;
        let mut observer = |_: ArtifactUpdate<'_>| count += 1;

        // Every chunk is ready immediately, so the timer never gets a quiet window.
        let out = StreamIngestor::new(Duration::from_millis(50))
            .ingest(chunks(&["```js\n", "let a", " = 1;", "\n```"]), &mut observer)
            .await
            .unwrap();

        assert_eq!(out.publishes, 1);
        assert_eq!(count, 1);
        assert_eq!(out.code, "let a = 1;");
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_windows_publish_once_each() {
        let provider = ScriptedProvider::new(vec![
            "```html\n".into(),
            "<p>".into(),
            "hi</p>".into(),
            "\n```".into(),
        ])
        .with_gaps(vec![
            Duration::ZERO,
            Duration::from_millis(1),
            Duration::from_millis(100),
            Duration::from_millis(100),
        ]);
        let stream = provider
            .stream_chat(GenerationRequest::for_test("html"))
            .await
            .unwrap();

        let mut published = Vec::new();
        let mut observer = |u: ArtifactUpdate<'_>| published.push(u.code.to_string());
        let out = StreamIngestor::new(Duration::from_millis(10))
            .ingest(stream, &mut observer)
            .await
            .unwrap();

        // First two chunks share a window, the third gets its own; the closing
        // fence is followed at once by end of stream and lands in the final publish.
        assert_eq!(published, vec!["<p>", "<p>hi</p>", "<p>hi</p>"]);
        assert_eq!(out.publishes, 3);
    }

    #[tokio::test]
    async fn read_failure_keeps_partial_buffer() {
        let items: Vec<anyhow::Result<ChatChunk>> = vec![
            Ok(ChatChunk { text: "```ts\nconst".to_string() }),
            Err(anyhow::anyhow!("connection reset")),
        ];
        let mut sink = |_: ArtifactUpdate<'_>| {};
        let err = StreamIngestor::default()
            .ingest(tokio_stream::iter(items), &mut sink)
            .await
            .unwrap_err();

        match err {
            GenerateError::StreamRead { partial, message } => {
                assert_eq!(partial, "```ts\nconst");
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_stream_publishes_nothing() {
        let mut count = 0;
        let mut observer = |_: ArtifactUpdate<'_>| count += 1;
        let out = StreamIngestor::default()
            .ingest(chunks(&[]), &mut observer)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(out.raw.is_empty());
    }
}
