use crate::catalog::ProviderSetting;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Provider used when no choice has been saved yet.
    pub provider: Option<String>,

    /// Model used when no choice has been saved yet.
    pub model: Option<String>,

    /// Let generated apps use the component library.
    pub style_flag: bool,

    /// Quiet period before a live artifact is re-parsed, in milliseconds.
    pub debounce_ms: Option<u64>,

    /// Hosted generation endpoint; when set, every turn goes there.
    pub endpoint: Option<String>,

    /// API keys by provider id.
    pub api_keys: BTreeMap<String, String>,

    pub providers: BTreeMap<String, ProviderSetting>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.debounce_ms.map(Duration::from_millis)
    }
}
