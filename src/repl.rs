//! Line-oriented refine loop on stdin.

use crate::ingest::{ArtifactObserver, StreamIngestor};
use crate::provider::Provider;
use crate::publish::Publisher;
use crate::session::{Phase, SessionController};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Start an app, or change the current one.
    Text(String),
    Provider(String),
    Model(String),
    Style(bool),
    Publish,
    New,
    Quit,
    Unknown(String),
}

pub fn parse(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::Text(line.to_string()));
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));
    Some(match (name, arg) {
        ("provider", id) if !id.is_empty() => Input::Provider(id.to_string()),
        ("model", id) if !id.is_empty() => Input::Model(id.to_string()),
        ("style", "on") => Input::Style(true),
        ("style", "off") => Input::Style(false),
        ("publish", "") => Input::Publish,
        ("new", "") => Input::New,
        ("quit" | "exit", "") => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    })
}

const HELP: &str = "commands: /provider ID, /model ID, /style on|off, /publish, /new, /quit";

/// Read stdin until EOF or `/quit`. Failed turns are reported and the loop continues.
pub async fn run(
    session: &mut SessionController,
    provider: &dyn Provider,
    ingestor: &StreamIngestor,
    renderer: &mut dyn ArtifactObserver,
    publisher: &dyn Publisher,
    show_artifact: bool,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{HELP}");

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let Some(input) = parse(&line) else {
            continue;
        };

        let outcome = match input {
            Input::Quit => break,
            Input::Text(text) => {
                let turn = if session.phase() == Phase::Initial {
                    session.generate(&text, provider, ingestor, renderer).await
                } else {
                    session.refine_turn(&text, provider, ingestor, renderer).await
                };
                turn.map(|phase| {
                    if show_artifact {
                        println!("{}", session.committed_artifact());
                    }
                    eprintln!("[{phase:?}]");
                })
                .map_err(anyhow::Error::from)
            }
            Input::Provider(id) => {
                let id = session
                    .catalog()
                    .provider(&id)
                    .map(|p| p.id.clone())
                    .unwrap_or(id);
                session.select_provider(&id).map_err(anyhow::Error::from).map(|()| {
                    let s = session.selector();
                    eprintln!("using {} {}", s.provider_id(), s.model_id());
                })
            }
            Input::Model(id) => session.select_model(&id).map_err(anyhow::Error::from).map(|()| {
                let s = session.selector();
                eprintln!("using {} {}", s.provider_id(), s.model_id());
            }),
            Input::Style(on) => {
                session.set_style_flag(on);
                let state = if session.style_flag() { "on" } else { "off" };
                match session.initial_config() {
                    Some(c) if c.style_flag != on => {
                        eprintln!("style {state}; applies to the next new app")
                    }
                    _ => eprintln!("style {state}"),
                }
                Ok(())
            }
            Input::Publish => session.publish(publisher).map(|id| eprintln!("share id: {id}")),
            Input::New => session.reset().map_err(anyhow::Error::from),
            Input::Unknown(line) => {
                eprintln!("unknown command: {line}\n{HELP}");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            tracing::error!("{e:#}");
        }
    }
    Ok(())
}
