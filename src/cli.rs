//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::Parser;

/// Normalize an extracted Twitter archive into a validated JSON model.
#[derive(Parser, Debug, Clone)]
#[command(name = "tweetpack")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    tweetpack ./my-archive
    tweetpack ./my-archive -o model.json --skip-lookup
    TWEETPACK_BEARER_TOKEN=... tweetpack ./my-archive")]
pub struct Args {
    /// Path to the extracted archive directory (must contain data/account.js)
    pub archive: PathBuf,

    /// Path to the output JSON file
    #[arg(short, long, default_value = "model.json")]
    pub output: PathBuf,

    /// Skip the online identity lookup and run fully offline
    #[arg(long)]
    pub skip_lookup: bool,

    /// Bearer token for the identity lookup service
    #[arg(long, env = "TWEETPACK_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Emit compact JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}
