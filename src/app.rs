use crate::catalog::ProviderCatalog;
use crate::cli::Args;
use crate::config::Config;
use crate::ingest::{ArtifactObserver, StreamIngestor, DEFAULT_DEBOUNCE};
use crate::prefs::FileStore;
use crate::provider::{Attachment, Router};
use crate::publish::FilePublisher;
use crate::render::{FileRenderer, LogRenderer};
use crate::selector::ModelSelector;
use crate::session::SessionController;
use crate::{paths, repl};
use anyhow::Context;
use base64::Engine;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Config keys overlaid with `--api-key` flags.
pub fn user_keys(cfg: &Config, overrides: &[(String, String)]) -> BTreeMap<String, String> {
    let mut keys = cfg.api_keys.clone();
    keys.extend(overrides.iter().cloned());
    keys
}

/// Built-in providers plus whatever the discovery endpoints report.
pub async fn load_catalog(
    http: &reqwest::Client,
    cfg: &Config,
    keys: &BTreeMap<String, String>,
) -> anyhow::Result<Arc<ProviderCatalog>> {
    let catalog = ProviderCatalog::builtin().context("failed to load built-in providers")?;
    catalog.refresh(http, keys, &cfg.providers).await;
    Ok(Arc::new(catalog))
}

fn open_selector(catalog: &ProviderCatalog, cfg: &Config) -> anyhow::Result<ModelSelector> {
    let store = FileStore::new(paths::preferences_path()?);
    Ok(ModelSelector::bootstrap(
        &catalog.snapshot(),
        Box::new(store),
        cfg.provider.as_deref(),
        cfg.model.as_deref(),
    ))
}

pub async fn cmd_models(http: &reqwest::Client, cfg: &Config, provider: Option<&str>) -> anyhow::Result<()> {
    let keys = user_keys(cfg, &[]);
    let catalog = load_catalog(http, cfg, &keys).await?;
    let snapshot = catalog.snapshot();
    let mut out = std::io::stdout().lock();

    match provider {
        None => {
            for id in snapshot.providers() {
                let count = snapshot.models_for(id).count();
                let name = catalog.provider(id).map_or(id.as_str(), |p| p.display_name.as_str());
                writeln!(out, "{id}\t{name}\t{count} models").ok();
            }
        }
        Some(wanted) => {
            let id = catalog
                .provider(wanted)
                .map(|p| p.id.clone())
                .with_context(|| format!("unknown provider: {wanted}"))?;
            for m in snapshot.models_for(&id) {
                let image = if m.supports_image_input { "\timage" } else { "" };
                writeln!(out, "{}\t{}{image}", m.id, m.label).ok();
            }
        }
    }
    Ok(())
}

pub async fn cmd_use(
    http: &reqwest::Client,
    cfg: &Config,
    provider: &str,
    model: Option<&str>,
) -> anyhow::Result<()> {
    let keys = user_keys(cfg, &[]);
    let catalog = load_catalog(http, cfg, &keys).await?;
    let id = catalog
        .provider(provider)
        .map(|p| p.id.clone())
        .with_context(|| format!("unknown provider: {provider}"))?;

    let snapshot = catalog.snapshot();
    let mut selector = open_selector(&catalog, cfg)?;
    selector.select_provider(&snapshot, &id);
    if let Some(model) = model {
        selector.select_model(&snapshot, model);
        if selector.model_id() != model {
            tracing::warn!(requested = %model, using = %selector.model_id(), "model not in catalog");
        }
    }
    let model_id = selector.model_id().to_string();
    selector.persist(&id, &model_id);

    println!("{} {}", selector.provider_id(), selector.model_id());
    Ok(())
}

/// Read an image file into a base64 data URL attachment.
pub fn read_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let content_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => anyhow::bail!("unsupported image type: {}", path.display()),
    };

    let bytes = std::fs::read(path).with_context(|| format!("failed to read image: {}", path.display()))?;
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(Attachment {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string()),
        content_type: content_type.to_string(),
        url: format!("data:{content_type};base64,{data}"),
    })
}

pub async fn cmd_generate(http: &reqwest::Client, cfg: &Config, args: Args) -> anyhow::Result<()> {
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() && !args.interactive {
        anyhow::bail!("No prompt provided. Try: appgen \"a pomodoro timer\" or `appgen --interactive`");
    }

    let keys = user_keys(cfg, &args.api_keys);
    let catalog = load_catalog(http, cfg, &keys).await?;
    let selector = open_selector(&catalog, cfg)?;

    let router = Router::new(http.clone(), catalog.providers().to_vec(), cfg.providers.clone())
        .with_endpoint(cfg.endpoint.clone())
        .with_dry_run(args.dry_run);
    let ingestor = StreamIngestor::new(cfg.debounce().unwrap_or(DEFAULT_DEBOUNCE));
    let publisher = FilePublisher::new(paths::shares_dir()?);

    let mut session = SessionController::new(catalog, selector, keys);
    session.set_style_flag(args.style_flag || cfg.style_flag);
    if let Some(p) = &args.provider {
        let id = session
            .catalog()
            .provider(p)
            .map(|d| d.id.clone())
            .with_context(|| format!("unknown provider: {p}"))?;
        session.select_provider(&id)?;
    }
    if let Some(m) = &args.model {
        session.select_model(m)?;
    }
    if let Some(path) = &args.image {
        session.attach(read_attachment(path)?)?;
    }

    let mut renderer: Box<dyn ArtifactObserver> = match &args.output {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing live artifact");
            Box::new(FileRenderer::new(path))
        }
        None => Box::new(LogRenderer::default()),
    };

    if !prompt.trim().is_empty() {
        session
            .generate(&prompt, &router, &ingestor, renderer.as_mut())
            .await?;
        for change in &args.refine {
            session
                .refine_turn(change, &router, &ingestor, renderer.as_mut())
                .await?;
        }
    }

    if args.interactive {
        let show = args.output.is_none();
        repl::run(&mut session, &router, &ingestor, renderer.as_mut(), &publisher, show).await?;
    } else if args.output.is_none() {
        println!("{}", session.committed_artifact());
    }

    if args.publish {
        let id = session.publish(&publisher)?;
        eprintln!("share id: {id}");
    }
    Ok(())
}
