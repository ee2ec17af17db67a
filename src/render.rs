//! Where live artifacts go while a turn streams.

use crate::ingest::{ArtifactObserver, ArtifactUpdate};
use std::path::PathBuf;

/// Rewrites a file with the latest code on every publish, so a dev server
/// watching it reloads as the app is generated.
#[derive(Debug)]
pub struct FileRenderer {
    path: PathBuf,
    failed: bool,
}

impl FileRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            failed: false,
        }
    }

    fn write(&self, code: &str) -> std::io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, code)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl ArtifactObserver for FileRenderer {
    fn publish(&mut self, update: ArtifactUpdate<'_>) {
        match self.write(update.code) {
            Ok(()) => self.failed = false,
            // Warn once per run of failures rather than on every publish.
            Err(e) if !self.failed => {
                self.failed = true;
                tracing::warn!(path = %self.path.display(), "failed to write artifact: {e}");
            }
            Err(_) => {}
        }
    }
}

/// Reports progress to the log only.
#[derive(Debug, Default)]
pub struct LogRenderer {
    publishes: usize,
}

impl ArtifactObserver for LogRenderer {
    fn publish(&mut self, update: ArtifactUpdate<'_>) {
        self.publishes += 1;
        tracing::debug!(
            n = self.publishes,
            raw = update.raw.len(),
            lines = update.code.lines().count(),
            "artifact updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_renderer_keeps_latest_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App.tsx");
        let mut r = FileRenderer::new(&path);

        r.publish(ArtifactUpdate { raw: "```tsx\nA", code: "A" });
        r.publish(ArtifactUpdate { raw: "```tsx\nAB", code: "AB" });

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "AB");
    }

    #[test]
    fn file_renderer_survives_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = FileRenderer::new(dir.path().join("missing").join("App.tsx"));
        r.publish(ArtifactUpdate { raw: "x", code: "x" });
        assert!(r.failed);
    }
}
