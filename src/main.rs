//! # tweetpack CLI
//!
//! Command-line interface for the tweetpack library.

use std::fs::File;
use std::io::BufWriter;
use std::process;

use clap::Parser;
use tracing::warn;

use tweetpack::cli::Args;
use tweetpack::error::Result;
use tweetpack::lookup::UserLookup;
use tweetpack::pipeline;

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let lookup = build_lookup(&args)?;
    let model = pipeline::run(&args.archive, lookup.as_deref())?;

    let file = BufWriter::new(File::create(&args.output)?);
    if args.compact {
        serde_json::to_writer(file, &model)?;
    } else {
        serde_json::to_writer_pretty(file, &model)?;
    }

    println!("Normalized archive of @{}", model.owner_handle);
    println!("  posts:               {}", model.posts.len());
    println!("  following/followers: {}/{}", model.following_count(), model.follower_count());
    println!("  direct messages:     {}", model.direct_messages.len());
    println!("  group conversations: {}", model.group_conversations.len());
    println!("  media sources:       {}", model.media_sources.len());
    println!("Model written to {}", args.output.display());

    Ok(())
}

#[cfg(feature = "lookup")]
fn build_lookup(args: &Args) -> Result<Option<Box<dyn UserLookup>>> {
    if args.skip_lookup {
        return Ok(None);
    }
    match &args.bearer_token {
        Some(token) => {
            let client = tweetpack::lookup::TwitterLookup::new(token.clone())?;
            Ok(Some(Box::new(client)))
        }
        None => {
            warn!("no bearer token configured, skipping identity lookup");
            Ok(None)
        }
    }
}

#[cfg(not(feature = "lookup"))]
fn build_lookup(_args: &Args) -> Result<Option<Box<dyn UserLookup>>> {
    Ok(None)
}
