use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate small web apps from a prompt, streaming the code as it arrives.
#[derive(Debug, Parser)]
#[command(name = "appgen")]
#[command(version)]
#[command(about = "Generate web apps from a prompt", long_about = None)]
pub struct Args {
    /// Provider id (default: saved choice, then config, then Anthropic)
    #[arg(short = 'p', long = "provider")]
    pub provider: Option<String>,

    /// Model id within the provider
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Allow the component library in generated apps
    #[arg(long = "style-flag")]
    pub style_flag: bool,

    /// Image to send with the first turn
    #[arg(long = "image", value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Follow-up change, applied after the first turn (repeatable)
    #[arg(short = 'r', long = "refine", value_name = "TEXT")]
    pub refine: Vec<String>,

    /// Write the live artifact to this file instead of printing it at the end
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// API key for a provider (repeatable)
    #[arg(long = "api-key", value_name = "PROVIDER=KEY", value_parser = parse_key)]
    pub api_keys: Vec<(String, String)>,

    /// Publish the finished app and print its share id
    #[arg(long = "publish")]
    pub publish: bool,

    /// Do not call any backend; stream a canned app
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Keep refining from stdin after the first turn
    #[arg(short = 'i', long = "interactive")]
    pub interactive: bool,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List providers, or the models of one provider
    Models {
        #[arg(long = "provider")]
        provider: Option<String>,
    },

    /// Save a provider (and optionally model) as the default choice
    Use {
        provider: String,
        model: Option<String>,
    },
}

fn parse_key(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((p, k)) if !p.trim().is_empty() && !k.trim().is_empty() => {
            Ok((p.trim().to_string(), k.trim().to_string()))
        }
        _ => Err(format!("expected PROVIDER=KEY, got {s:?}")),
    }
}
