//! Archive access layer.
//!
//! An extracted Twitter archive is a directory with a `data/` subdirectory
//! holding `.js` source files and media directories. [`ArchiveLayout`]
//! validates the directory and locates every input the pipeline needs;
//! [`read_js_records`] strips the non-JSON assignment wrapper each source
//! file carries and deserializes the array inside.
//!
//! Layout discovery is strict: a missing marker file, a missing media
//! directory, or an ambiguous media directory aborts the run. Individual
//! optional source files (follows, DMs) that are absent are treated as
//! empty collections instead.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Result, TweetpackError};

/// Marker file checked before anything else.
pub const ACCOUNT_FILE: &str = "account.js";
/// Following edges source.
pub const FOLLOWING_FILE: &str = "following.js";
/// Follower edges source.
pub const FOLLOWER_FILE: &str = "follower.js";
/// Pairwise DM conversations source.
pub const DIRECT_MESSAGES_FILE: &str = "direct-messages.js";
/// Group DM conversations source.
pub const DIRECT_MESSAGES_GROUP_FILE: &str = "direct-messages-group.js";

/// Candidate names for the tweet media directory; archives use one or the
/// other depending on export vintage.
const MEDIA_DIR_PATTERNS: &[&str] = &["tweet_media", "tweets_media"];
/// Candidate names for the tweet shards; large archives are split into
/// `tweets-part*.js` files.
const TWEET_FILE_PATTERNS: &[&str] = &["tweet.js", "tweets.js", "tweets-part*.js"];

const DM_MEDIA_DIR: &str = "direct_messages_media";
const GROUP_MEDIA_DIR: &str = "direct_messages_group_media";
const OUTPUT_DIR: &str = "tweetpack-output";
const OUTPUT_MEDIA_DIR: &str = "media";

/// Resolved locations of everything the pipeline reads and writes.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    /// Archive root directory.
    pub dir_archive: PathBuf,
    /// `data/` subdirectory holding all source files.
    pub dir_data: PathBuf,
    /// Tweet media input directory (`tweet_media` or `tweets_media`).
    pub dir_media: PathBuf,
    /// Pairwise DM media input directory.
    pub dir_dm_media: PathBuf,
    /// Group DM media input directory.
    pub dir_group_media: PathBuf,
    /// Directory resolved media files are copied into.
    pub dir_output_media: PathBuf,
    /// Tweet source shards, sorted by name.
    pub tweet_shards: Vec<PathBuf>,
}

impl ArchiveLayout {
    /// Validates `dir_archive` as an extracted archive and locates all
    /// inputs. Creates the output media directory.
    ///
    /// # Errors
    ///
    /// Fails when the marker file is missing, when no tweet shard exists,
    /// or when zero or several media directories match.
    pub fn discover(dir_archive: impl Into<PathBuf>) -> Result<Self> {
        let dir_archive = dir_archive.into();
        let dir_data = dir_archive.join("data");

        let marker = dir_data.join(ACCOUNT_FILE);
        if !marker.is_file() {
            return Err(TweetpackError::MissingMarker(marker));
        }

        let dir_media = find_media_dir(&dir_data)?;
        let tweet_shards = find_tweet_shards(&dir_data)?;

        let dir_output_media = dir_archive.join(OUTPUT_DIR).join(OUTPUT_MEDIA_DIR);
        fs::create_dir_all(&dir_output_media)?;

        Ok(Self {
            dir_dm_media: dir_data.join(DM_MEDIA_DIR),
            dir_group_media: dir_data.join(GROUP_MEDIA_DIR),
            dir_archive,
            dir_data,
            dir_media,
            dir_output_media,
            tweet_shards,
        })
    }

    /// Path of a named source file under `data/`.
    pub fn source_file(&self, name: &str) -> PathBuf {
        self.dir_data.join(name)
    }
}

fn find_media_dir(dir_data: &Path) -> Result<PathBuf> {
    let matches: Vec<PathBuf> = MEDIA_DIR_PATTERNS
        .iter()
        .map(|name| dir_data.join(name))
        .filter(|p| p.is_dir())
        .collect();
    match matches.len() {
        0 => Err(TweetpackError::NoMatch {
            what: "media directory",
            patterns: MEDIA_DIR_PATTERNS,
            dir: dir_data.to_path_buf(),
        }),
        1 => Ok(matches.into_iter().next().expect("one match")),
        _ => Err(TweetpackError::AmbiguousMatch {
            what: "media directory",
            patterns: MEDIA_DIR_PATTERNS,
            dir: dir_data.to_path_buf(),
        }),
    }
}

fn find_tweet_shards(dir_data: &Path) -> Result<Vec<PathBuf>> {
    let mut shards = Vec::new();
    for name in ["tweet.js", "tweets.js"] {
        let path = dir_data.join(name);
        if path.is_file() {
            shards.push(path);
        }
    }
    if let Ok(entries) = fs::read_dir(dir_data) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("tweets-part") && name.ends_with(".js") {
                shards.push(entry.path());
            }
        }
    }
    if shards.is_empty() {
        return Err(TweetpackError::NoMatch {
            what: "tweet files",
            patterns: TWEET_FILE_PATTERNS,
            dir: dir_data.to_path_buf(),
        });
    }
    shards.sort();
    Ok(shards)
}

/// Reads a Twitter-produced `.js` source file into typed records.
///
/// The files wrap a JSON array in a javascript assignment, e.g.
/// `window.YTD.tweets.part0 = [ { ... } ]`. The first line is replaced with
/// `[` (plus ` {` when the opening brace sits on that line) and the rest is
/// parsed as JSON. A file with at most one line has no real content and
/// yields an empty collection, as does a file that does not exist.
pub fn read_js_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        warn!("source file {} not present, treating as empty", path.display());
        return Ok(Vec::new());
    }
    debug!("parsing {}", path.display());
    let content = fs::read_to_string(path)?;

    let Some((first_line, rest)) = content.split_once('\n') else {
        return Ok(Vec::new());
    };
    if rest.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut json = String::with_capacity(rest.len() + 2);
    json.push('[');
    if first_line.contains('{') {
        json.push_str(" {");
    }
    json.push_str(rest);

    serde_json::from_str(&json).map_err(|e| TweetpackError::parse(path, e))
}
