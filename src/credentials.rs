//! Effective API keys and base URLs per provider.

use crate::catalog::{ProviderDescriptor, ProviderSetting};
use std::collections::BTreeMap;

/// User-supplied key, else the first provider env var that is set, else "".
pub fn resolve_api_key(provider: &ProviderDescriptor, user_keys: &BTreeMap<String, String>) -> String {
    resolve_api_key_with(provider, user_keys, |name| std::env::var(name).ok())
}

pub fn resolve_api_key_with(
    provider: &ProviderDescriptor,
    user_keys: &BTreeMap<String, String>,
    env: impl Fn(&str) -> Option<String>,
) -> String {
    if let Some(key) = user_keys.get(&provider.id).filter(|k| !k.is_empty()) {
        return key.clone();
    }

    provider
        .key_env
        .iter()
        .filter_map(|name| env(name))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Setting, else the provider's env override, else the built-in root.
pub fn resolve_base_url(provider: &ProviderDescriptor, setting: Option<&ProviderSetting>) -> Option<String> {
    resolve_base_url_with(provider, setting, |name| std::env::var(name).ok())
}

pub fn resolve_base_url_with(
    provider: &ProviderDescriptor,
    setting: Option<&ProviderSetting>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let url = setting
        .and_then(|s| s.base_url.clone())
        .or_else(|| provider.base_url_env.as_deref().and_then(&env))
        .filter(|u| !u.is_empty())
        .or_else(|| provider.base_url.clone())?;

    let url = url.trim_end_matches('/').to_string();
    if provider.local && env("RUNNING_IN_DOCKER").as_deref() == Some("true") {
        return Some(url.replace("localhost", "host.docker.internal"));
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WireFormat;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            id: "Ollama".to_string(),
            display_name: "Ollama".to_string(),
            wire: WireFormat::Ollama,
            base_url: Some("http://localhost:11434/".to_string()),
            base_url_env: Some("OLLAMA_API_BASE_URL".to_string()),
            key_env: vec!["FIRST_KEY".to_string(), "SECOND_KEY".to_string()],
            local: true,
            api_key_url: None,
            static_models: Vec::new(),
            dynamic: None,
        }
    }

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn user_key_wins() {
        let keys = BTreeMap::from([("Ollama".to_string(), "user".to_string())]);
        let key = resolve_api_key_with(&descriptor(), &keys, env(&[("FIRST_KEY", "env")]));
        assert_eq!(key, "user");
    }

    #[test]
    fn env_sources_are_tried_in_order() {
        let key = resolve_api_key_with(
            &descriptor(),
            &BTreeMap::new(),
            env(&[("FIRST_KEY", ""), ("SECOND_KEY", "second")]),
        );
        assert_eq!(key, "second");
    }

    #[test]
    fn missing_key_is_empty() {
        assert_eq!(resolve_api_key_with(&descriptor(), &BTreeMap::new(), env(&[])), "");
    }

    #[test]
    fn base_url_precedence() {
        let p = descriptor();
        assert_eq!(
            resolve_base_url_with(&p, None, env(&[])).as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(
            resolve_base_url_with(&p, None, env(&[("OLLAMA_API_BASE_URL", "http://gpu:11434")])).as_deref(),
            Some("http://gpu:11434")
        );
        let setting = ProviderSetting {
            enabled: None,
            base_url: Some("http://box:1".to_string()),
        };
        assert_eq!(
            resolve_base_url_with(&p, Some(&setting), env(&[("OLLAMA_API_BASE_URL", "http://gpu:11434")]))
                .as_deref(),
            Some("http://box:1")
        );
    }

    #[test]
    fn local_providers_reach_the_host_from_docker() {
        let url = resolve_base_url_with(&descriptor(), None, env(&[("RUNNING_IN_DOCKER", "true")]));
        assert_eq!(url.as_deref(), Some("http://host.docker.internal:11434"));
    }
}
