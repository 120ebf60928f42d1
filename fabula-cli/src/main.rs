//! fabula — narrate a story on stdin, get an illustrated storyboard out.
//!
//! Each line typed is treated as one finalized utterance. Loudness comes
//! from the default microphone, or from `--loudness` for machines without
//! one. End input (Ctrl-D) to stop the session and print the storyboard.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fabula_core::audio::{create_capture_ring, Producer};
use fabula_core::illustrate::{HttpIllustrator, HttpIllustratorConfig};
use fabula_core::scene::export::{share_text, story_document};
use fabula_core::segment::channel_recognizer;
use fabula_core::{Illustrator, PlaceholderIllustrator, SessionConfig, StorySession};

/// How long to wait for in-flight illustrations after input ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "fabula", about = "Turn live narration into an illustrated storyboard")]
struct Args {
    /// Fixed loudness in [0, 1] instead of the microphone.
    #[arg(long)]
    loudness: Option<f32>,

    /// Illustration service endpoint (POST). Without it, a placeholder
    /// illustrator is used.
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token for the illustration service.
    #[arg(long, env = "FABULA_API_KEY")]
    api_key: Option<String>,

    /// Write the story document to this file on exit.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Simulated latency of the placeholder illustrator, in milliseconds.
    #[arg(long, default_value_t = 500)]
    placeholder_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let illustrator: Arc<dyn Illustrator> = match &args.endpoint {
        Some(endpoint) => {
            info!(endpoint, "using HTTP illustration service");
            let mut config = HttpIllustratorConfig::new(endpoint.clone());
            config.api_key = args.api_key.clone();
            Arc::new(HttpIllustrator::new(config).context("building illustration client")?)
        }
        None => {
            info!("using placeholder illustrator");
            Arc::new(PlaceholderIllustrator::new(Duration::from_millis(
                args.placeholder_delay_ms,
            )))
        }
    };

    let (recognizer, feed) = channel_recognizer();
    let session = StorySession::new(SessionConfig::default(), Box::new(recognizer), illustrator);

    match args.loudness {
        Some(level) => {
            // Synthetic audio: a constant-amplitude signal at the requested
            // level, pushed at roughly real-time rate.
            let amplitude = level.clamp(0.0, 1.0);
            let (mut producer, consumer) = create_capture_ring();
            session
                .start_with_audio(consumer)
                .context("starting session")?;
            tokio::spawn(async move {
                let frame = vec![amplitude; 1024];
                let mut ticker = tokio::time::interval(Duration::from_millis(16));
                loop {
                    ticker.tick().await;
                    producer.push_slice(&frame);
                }
            });
            info!(loudness = amplitude, "session started with synthetic audio");
        }
        None => {
            session.start().await.context("starting session")?;
            info!("session started; narrate into the microphone");
        }
    }

    eprintln!("Type your narration, one utterance per line. Ctrl-D to finish.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if !feed.finalize(line) {
            warn!("recognizer stopped accepting input");
            break;
        }
        // Let the forwarder and volume sampler catch up before the prompt.
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    session.stop();

    let board = session.board();
    if board.is_processing() {
        eprintln!("Waiting for illustrations to finish...");
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while board.is_processing() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if board.is_processing() {
            warn!(
                pending = board.pending_illustrations(),
                "giving up on outstanding illustrations"
            );
        }
    }

    let scenes = board.scenes();
    if scenes.is_empty() {
        eprintln!("No scenes captured.");
        return Ok(());
    }

    println!();
    for (i, scene) in scenes.iter().enumerate() {
        println!(
            "Scene {} [{} | loudness {:.2}]",
            i + 1,
            scene.tone,
            scene.loudness
        );
        println!("  {}", scene.text);
        match &scene.image_ref {
            Some(image) => println!("  illustration: {image}"),
            None => println!("  illustration: (none)"),
        }
    }

    if let Some(path) = &args.output {
        tokio::fs::write(path, story_document(&scenes))
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        eprintln!("Story written to {}", path.display());
    }

    println!("\nShare text: {}", share_text(&scenes));

    Ok(())
}
