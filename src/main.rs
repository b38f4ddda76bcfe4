use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use regulation_engine::config::EngineConfig;
use regulation_engine::kernel::pipeline::SessionEngine;
use regulation_engine::kernel::reactor::{Reactor, ShellEvent};
use regulation_engine::memory::store::{JsonFileUserStore, UserStore};
use regulation_engine::services::{ConsoleActuator, LlamaRenderer, Renderer, Services, TemplateRenderer};

struct Args {
    config: String,
    user: String,
    concept: String,
    offline: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: "regulation.toml".to_string(),
        user: "default".to_string(),
        concept: "counting".to_string(),
        offline: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().unwrap_or(args.config),
            "--user" => args.user = it.next().unwrap_or(args.user),
            "--concept" => args.concept = it.next().unwrap_or(args.concept),
            "--offline" => args.offline = true,
            other => tracing::warn!("Ignoring unknown argument {}", other),
        }
    }
    args
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();
    let config = EngineConfig::load_or_default(&args.config);
    config.validate()?;

    let store: Arc<dyn UserStore> = Arc::new(JsonFileUserStore::new(config.store.path.clone()));
    let engine = SessionEngine::start(&args.user, &args.concept, store, config.clone());

    let renderer: Arc<dyn Renderer> = if args.offline {
        Arc::new(TemplateRenderer)
    } else {
        Arc::new(LlamaRenderer::new(&config.renderer))
    };
    let services = Services {
        renderer,
        actuator: Arc::new(ConsoleActuator::default()),
    };

    let (tx, rx) = mpsc::channel(100);
    let reactor = Reactor::new(rx, tx.clone(), engine, services, &config);
    let shell = tokio::spawn(reactor.run());

    tracing::info!(
        "Say '{}' to begin, '{}' to rest. ':speech' simulates talking over playback. Ctrl+D ends the session.",
        config.interaction.wake_word,
        config.interaction.sleep_word
    );

    // Driver: stdin lines stand in for the speech recognizer.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == ":speech" {
                    for _ in 0..config.interaction.barge_in_frames {
                        tx.send(ShellEvent::AudioFrame(vec![0.1; 160])).await?;
                    }
                    continue;
                }
                tx.send(ShellEvent::Transcript { text: line, audio: None }).await?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tx.send(ShellEvent::Shutdown).await?;
    let report = shell.await??;
    tracing::info!(
        "Session {} ended after {} turn(s); write-back {:?}",
        report.session_id,
        report.turns,
        report.write_back
    );
    Ok(())
}
