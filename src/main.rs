use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voicelink::{
    ClientConfig, CpalDeviceFactory, SessionController, SessionNotification, WsChannel,
    list_input_devices, list_output_devices,
};

/// Voicelink - realtime duplex voice client
#[derive(Parser, Debug)]
#[command(name = "voicelink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available audio input and output devices
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    if let Some(Commands::Devices) = cli.command {
        println!("Input devices:");
        for name in list_input_devices() {
            println!("  {name}");
        }
        println!("Output devices:");
        for name in list_output_devices() {
            println!("  {name}");
        }
        return Ok(());
    }

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(&config_path)?
    } else {
        ClientConfig::from_env()?
    };

    let channel = WsChannel::connect(&config.endpoint(), &config.api_key).await?;

    let (note_tx, mut notes) = mpsc::channel(64);
    let devices =
        CpalDeviceFactory::new(config.input_device.clone(), config.output_device.clone());
    let (controller, handle) = SessionController::new(
        channel,
        config.session_settings(),
        Box::new(devices),
        note_tx,
    );

    let mut session = tokio::spawn(controller.run());
    println!("Session starting. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            note = notes.recv() => match note {
                Some(SessionNotification::StateChanged(state)) => {
                    println!("<< {state} >>");
                }
                Some(SessionNotification::TurnStarted) => {
                    println!("-- listening --");
                }
                Some(SessionNotification::TurnFinalized(turn)) => {
                    if !turn.question.is_empty() {
                        println!("You: {}", turn.question);
                    }
                    println!("Assistant: {}", turn.answer);
                }
                Some(SessionNotification::ConnectionError(message)) => {
                    eprintln!("[Connection error]: {message}");
                }
                Some(SessionNotification::DeviceError(message)) => {
                    eprintln!("[Device error]: {message}");
                }
                None => {}
            },

            _ = tokio::signal::ctrl_c() => {
                println!("Stopping session...");
                handle.stop();
            }

            result = &mut session => {
                match result? {
                    Ok(turns) => {
                        tracing::info!(turns = turns.len(), "session ended");
                    }
                    Err(e) => eprintln!("Session failed: {e}"),
                }
                break;
            }
        }
    }

    Ok(())
}
