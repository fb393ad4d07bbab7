use clap::{Parser, Subcommand};
use faceverify::models::DEFAULT_CACHE_KEY;

/// faceverify — verify a selfie against a reference photo
#[derive(Parser)]
#[command(name = "faceverify", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify a captured image against a reference image
    Verify {
        /// Captured image: local path, http(s) URL or asset:<name>
        #[arg(long)]
        captured: String,
        /// Reference image: local path, http(s) URL or asset:<name>
        #[arg(long)]
        reference: String,
        /// Key the reference face token is cached under
        #[arg(long, default_value = DEFAULT_CACHE_KEY)]
        cache_key: String,
        /// Continue even if the captured face is rated poor
        #[arg(long)]
        skip_quality_check: bool,
        /// Also require the high-confidence floor
        #[arg(long)]
        require_high_confidence: bool,
    },

    /// Detect a face and print its token and quality
    Detect {
        /// Image: local path, http(s) URL or asset:<name>
        image: String,
    },

    /// Remove cached face tokens and image paths
    ClearCache,
}
