use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use faceverify::cache::{KeyValueStore, MemoryStore, RedisStore};
use faceverify::config;
use faceverify::{FaceVerifier, ImageRef, VerifyOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "faceverify=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let store: Arc<dyn KeyValueStore> = match &cfg.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis...");
            Arc::new(RedisStore::connect(url).await.context("failed to connect to Redis")?)
        }
        None => {
            tracing::debug!("REDIS_URL not set, using in-memory cache");
            Arc::new(MemoryStore::new())
        }
    };

    let verifier = FaceVerifier::new(cfg.face, store)?;

    let result = run(args.command, &verifier).await;
    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run(cmd: cli::Commands, verifier: &FaceVerifier) -> anyhow::Result<()> {
    match cmd {
        cli::Commands::Verify {
            captured,
            reference,
            cache_key,
            skip_quality_check,
            require_high_confidence,
        } => {
            let captured: ImageRef = captured.parse()?;
            let reference: ImageRef = reference.parse()?;
            let options = VerifyOptions {
                cache_key,
                skip_quality_check,
                require_high_confidence,
                max_cache_age: None,
            };

            match verifier.verify_faces(&captured, &reference, &options).await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    if !result.verified {
                        anyhow::bail!("faces did not match ({:.1}, {})", result.confidence, result.match_level);
                    }
                }
                Err(failure) => {
                    println!("{}", failure.user_message);
                    anyhow::bail!(
                        "verification failed after {} ms: {}",
                        failure.processing_time_ms,
                        failure.error
                    );
                }
            }
        }
        cli::Commands::Detect { image } => {
            let image: ImageRef = image.parse()?;
            let face = verifier.detect_face(&image).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "token": face.token,
                    "rectangle": face.rectangle,
                    "quality": face.quality,
                }))?
            );
        }
        cli::Commands::ClearCache => {
            let removed = verifier.clear_cache().await?;
            println!("Removed {} cached entries.", removed);
        }
    }
    Ok(())
}
