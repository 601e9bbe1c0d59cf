use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_agent::agent::{ListenModel, SpeechModel, ThinkModel};
use voice_agent::audio::{capture, output};
use voice_agent::auth::token_source_from_config;
use voice_agent::config::DEFAULT_CONFIG_PATH;
use voice_agent::{
    CaptureConfig, Config, CpalPlaybackSink, MicrophoneCapture, SessionCommand, SessionConfig,
    SessionCoordinator, SessionUpdate, WebSocketConnector,
};

#[derive(Parser)]
#[command(name = "voice-agent")]
#[command(about = "Talk to a conversational voice agent from the terminal")]
struct Args {
    /// Configuration file (without extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Speech recognition model
    #[arg(long, value_enum)]
    listen: Option<ListenModel>,

    /// Language model
    #[arg(long, value_enum)]
    think: Option<ThinkModel>,

    /// Agent voice
    #[arg(long, value_enum)]
    speak: Option<SpeechModel>,

    /// System prompt for the language model
    #[arg(long)]
    prompt: Option<String>,

    /// Token endpoint returning {"token": "..."}
    #[arg(long)]
    token_url: Option<String>,

    /// Agent WebSocket URL
    #[arg(long)]
    agent_url: Option<String>,

    /// Record agent speech to WAV files in this directory
    #[arg(long)]
    record_dir: Option<PathBuf>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.agent.listen = listen;
        }
        if let Some(think) = self.think {
            config.agent.think = think;
        }
        if let Some(speak) = self.speak {
            config.agent.speak = speak;
        }
        if let Some(prompt) = &self.prompt {
            config.agent.prompt = Some(prompt.clone());
        }
        if let Some(url) = &self.token_url {
            config.auth.token_url = Some(url.clone());
        }
        if let Some(url) = &self.agent_url {
            config.agent.url = url.clone();
        }
        if let Some(dir) = &self.record_dir {
            config.recording.directory = Some(dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let mut cfg = Config::load(&args.config)?;
    args.apply(&mut cfg);

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Agent: {}", cfg.agent.url);

    let selection = cfg.agent.selection();
    info!(
        "Models: listen={}, think={}, speak={}",
        selection.listen.model_id(),
        selection.think.model_id(),
        selection.speak.model_id()
    );

    let capture = MicrophoneCapture::new(CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        window_size: cfg.audio.capture_window,
        device_name: cfg.audio.input_device.clone(),
    });
    let speaker = CpalPlaybackSink::open(cfg.audio.output_device.as_deref(), cfg.audio.sample_rate)
        .context("Failed to open audio output")?;

    let mut coordinator = SessionCoordinator::new(
        SessionConfig::from_config(&cfg),
        token_source_from_config(&cfg.auth),
        Box::new(WebSocketConnector::new(cfg.agent.url.clone())),
        Box::new(capture),
        Box::new(speaker),
    );

    let updates = coordinator.subscribe();
    let renderer = tokio::spawn(render_updates(updates));

    let (commands_tx, commands_rx) = mpsc::channel(16);
    commands_tx.send(SessionCommand::Authenticate).await?;
    commands_tx
        .send(SessionCommand::Connect(selection.clone()))
        .await?;

    let stdin_commands = commands_tx.clone();
    tokio::spawn(read_commands(stdin_commands, selection));

    let ctrl_c_commands = commands_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            let _ = ctrl_c_commands.send(SessionCommand::Quit).await;
        }
    });

    println!("Commands: connect, disconnect, reset, status, quit");

    coordinator.run(commands_rx).await;

    drop(coordinator);
    renderer.abort();

    Ok(())
}

/// Translate console lines into session commands
async fn read_commands(commands: mpsc::Sender<SessionCommand>, selection: voice_agent::ModelSelection) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let command = match line.trim() {
            "" => continue,
            "auth" | "authenticate" => SessionCommand::Authenticate,
            "connect" => SessionCommand::Connect(selection.clone()),
            "disconnect" => SessionCommand::Disconnect,
            "reset" => SessionCommand::Reset,
            "status" => SessionCommand::Status,
            "quit" | "exit" => SessionCommand::Quit,
            other => {
                warn!("Unknown command: {}", other);
                continue;
            }
        };

        if commands.send(command).await.is_err() {
            break;
        }
    }
}

async fn render_updates(mut updates: broadcast::Receiver<SessionUpdate>) {
    loop {
        match updates.recv().await {
            Ok(SessionUpdate::State(state)) => println!("[state] {}", state),
            Ok(SessionUpdate::Transcript(entry)) => {
                println!("{} {}: {}", entry.received_at.format("%H:%M:%S"), entry.role, entry.content)
            }
            Ok(SessionUpdate::Speaking(true)) => println!("[agent speaking]"),
            Ok(SessionUpdate::Speaking(false)) => println!("[agent silent]"),
            Ok(SessionUpdate::Notice(text)) => println!("[info] {}", text),
            Ok(SessionUpdate::Error(text)) => eprintln!("[error] {}", text),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Console fell behind, {} updates skipped", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn list_devices() -> Result<()> {
    println!("Input devices:");
    for name in capture::input_device_names()? {
        println!("  {}", name);
    }

    println!("Output devices:");
    for name in output::output_device_names()? {
        println!("  {}", name);
    }

    Ok(())
}
