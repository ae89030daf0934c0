//! arlink Replay - play a recorded tracker session into a native window
//!
//! Useful for checking content placement without a camera or a browser.

mod replay;

use anyhow::{anyhow, Context, Result};
use arlink_core::{load_config, MarkerName, SessionId};
use arlink_scene::{ArScene, ImageOptions, ModelOptions};
use bevy::prelude::*;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::replay::{load_log, PendingAttachments, ReplayLog, ReplayPlugin};

#[derive(Parser, Debug)]
#[command(name = "arlink-replay")]
#[command(about = "Replay a recorded marker tracking session against arlink content")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "arlink.toml")]
    config: PathBuf,

    /// Session log, one JSON event per line
    #[arg(long)]
    log: PathBuf,

    /// Attach a model: <marker>=<url>
    #[arg(long = "model", value_name = "MARKER=URL")]
    models: Vec<String>,

    /// Attach an image: <marker>=<url>
    #[arg(long = "image", value_name = "MARKER=URL")]
    images: Vec<String>,

    /// Session identifier used in topic names
    #[arg(long, default_value = "replay")]
    session: String,

    /// Keep content visible while its marker is lost
    #[arg(long)]
    keep_visible: bool,

    /// Restart the log when it ends
    #[arg(long = "loop")]
    looping: bool,

    /// Open the debug inspector
    #[arg(long)]
    inspect: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Split `marker=url`
fn parse_target(target: &str) -> Result<(MarkerName, String)> {
    let (marker, url) = target
        .split_once('=')
        .ok_or_else(|| anyhow!("expected <marker>=<url>, got {:?}", target))?;
    let (marker, url) = (marker.trim(), url.trim());
    if marker.is_empty() || url.is_empty() {
        return Err(anyhow!("expected <marker>=<url>, got {:?}", target));
    }
    Ok((MarkerName::from(marker), url.to_string()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("arlink-replay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    // No camera feed behind a native window
    config.render.clear_color = [0.1, 0.1, 0.15, 1.0];

    let events = load_log(&args.log).with_context(|| format!("loading {}", args.log.display()))?;

    let window = Window {
        title: "arlink replay".to_string(),
        ..default()
    };
    let mut scene = ArScene::new(config, SessionId::new(args.session.clone()), window);

    let mut pending = PendingAttachments::default();
    for target in &args.models {
        let (marker, url) = parse_target(target)?;
        info!(%marker, %url, "Attaching model");
        let options = ModelOptions::new(url, marker.clone()).visible_when_lost(args.keep_visible);
        pending.model(format!("model {}", marker), scene.add_model(options));
    }
    for target in &args.images {
        let (marker, url) = parse_target(target)?;
        info!(%marker, %url, "Attaching image");
        let options = ImageOptions::new(url, marker.clone()).visible_when_lost(args.keep_visible);
        pending.image(format!("image {}", marker), scene.add_image(options));
    }
    if pending.is_empty() {
        tracing::warn!("Nothing attached; replayed events will be dropped");
    }

    scene
        .app_mut()
        .context("scene already started")?
        .add_plugins(ReplayPlugin::new(ReplayLog::new(events, args.looping), pending));

    if args.inspect {
        scene.inspect();
    }

    scene.start();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let (marker, url) = parse_target("pinball=models/duck.glb").unwrap();
        assert_eq!(marker.as_str(), "pinball");
        assert_eq!(url, "models/duck.glb");

        let (_, url) = parse_target("kanji=https://example.com/a.png?x=1").unwrap();
        assert_eq!(url, "https://example.com/a.png?x=1");

        assert!(parse_target("pinball").is_err());
        assert!(parse_target("=models/duck.glb").is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "arlink-replay",
            "--log",
            "session.jsonl",
            "--model",
            "pinball=duck.glb",
            "--image",
            "kanji=logo.png",
            "--loop",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("arlink.toml"));
        assert_eq!(args.models, vec!["pinball=duck.glb"]);
        assert_eq!(args.images, vec!["kanji=logo.png"]);
        assert!(args.looping);
        assert_eq!(args.session, "replay");
    }
}
