//! BSP Speech Connector CLI
//!
//! Runs the speech adapter outside a test harness: print the plugin
//! descriptor, probe the configured endpoints, or process a single turn.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bsp_connector::{descriptor, Media, SpeechAdapter, UserTurn};
use bsp_connector_common::tracing::init_tracing;
use bsp_connector_common::SpeechConfig;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Parser, Debug)]
#[command(name = "bsp-connector")]
#[command(about = "Speech synthesis & recognition connector for conversation tests")]
struct Args {
    /// JSON file with a flat capability map (BSP_STT_URL, ...).
    /// Environment variables and .env are used when omitted.
    #[arg(long, global = true)]
    caps: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the plugin descriptor as JSON
    Describe,
    /// Check the status endpoints of the configured services
    Validate,
    /// Run one user turn and print the bot reply as JSON
    Say {
        /// Text to synthesize via TTS
        #[arg(long, conflicts_with = "audio", required_unless_present = "audio")]
        text: Option<String>,
        /// Audio fixture to send instead of synthesized speech
        #[arg(long)]
        audio: Option<PathBuf>,
        /// MIME type of the audio fixture
        #[arg(long, default_value = "audio/wav")]
        mime_type: String,
        /// Write the turn's audio to this file
        #[arg(long)]
        save_audio: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    match args.command {
        Command::Describe => print_json(&descriptor()),
        Command::Validate => {
            let config = load_config(args.caps.as_deref())?;
            let (mut adapter, _replies) = SpeechAdapter::channel(config);
            adapter.validate().await?;
            println!("OK");
            Ok(())
        }
        Command::Say {
            text,
            audio,
            mime_type,
            save_audio,
        } => {
            let config = load_config(args.caps.as_deref())?;
            let (mut adapter, mut replies) = SpeechAdapter::channel(config);
            adapter.validate().await?;

            let mut turn = match audio {
                Some(path) => {
                    let buffer = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?;
                    UserTurn::audio(Media::audio(path.display().to_string(), mime_type, buffer))
                }
                None => UserTurn::text(text.unwrap_or_default()),
            };

            adapter.user_says(&mut turn).await?;
            let reply = replies
                .recv()
                .await
                .context("adapter finished without a reply")?;

            if let (Some(path), Some(attachment)) = (save_audio, turn.attachments.first()) {
                tokio::fs::write(&path, attachment.bytes()?)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!(path = %path.display(), "Saved turn audio");
            }

            print_json(&reply)
        }
    }
}

fn load_config(caps: Option<&Path>) -> Result<SpeechConfig> {
    let Some(path) = caps else {
        return Ok(SpeechConfig::from_env()?);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading capabilities from {}", path.display()))?;
    let map: Map<String, Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON object", path.display()))?;
    Ok(SpeechConfig::from_caps(&map)?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
