//! Sharing a finished app.

use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub code: String,
    pub prompt: String,
    pub model: String,
}

pub trait Publisher {
    /// Store the app and return its share id.
    fn publish(&self, share: &Share) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ShareRecord {
    id: String,
    #[serde(flatten)]
    share: Share,
    created_at: u64,
}

/// Stores shares as `<id>.json` in a directory.
#[derive(Debug, Clone)]
pub struct FilePublisher {
    dir: PathBuf,
}

impl FilePublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Publisher for FilePublisher {
    fn publish(&self, share: &Share) -> anyhow::Result<String> {
        let id = share_id(share);
        let record = ShareRecord {
            id: id.clone(),
            share: share.clone(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs(),
        };
        paths::write_json_atomic(&self.dir.join(format!("{id}.json")), &record)?;
        tracing::info!(%id, "app published");
        Ok(id)
    }
}

/// Same app, same id.
pub fn share_id(share: &Share) -> String {
    let mut hasher = crc32fast::Hasher::new();
    for part in [&share.prompt, &share.model, &share.code] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    format!("{:08x}", hasher.finalize())
}
