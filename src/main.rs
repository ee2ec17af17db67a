mod app;
mod catalog;
mod cli;
mod config;
mod credentials;
mod error;
mod fence;
mod ingest;
mod paths;
mod prefs;
mod prompt;
mod provider;
mod publish;
mod render;
mod repl;
mod selector;
mod session;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the generated code; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = cli::Args::parse();

    // Resolve and create dirs early.
    let config_dir = paths::config_dir()?;
    let _state_dir = paths::state_dir()?;

    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?.unwrap_or_default();
    tracing::debug!(?config_dir, ?cfg.provider, ?cfg.model, "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    match args.cmd.take() {
        Some(cli::Command::Models { provider }) => app::cmd_models(&http, &cfg, provider.as_deref()).await,
        Some(cli::Command::Use { provider, model }) => app::cmd_use(&http, &cfg, &provider, model.as_deref()).await,
        None => app::cmd_generate(&http, &cfg, args).await,
    }
}
