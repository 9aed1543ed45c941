//! Media reference resolution.
//!
//! Given an owning record id and a remote media descriptor, the resolver
//! searches the local archive for the corresponding file with a two-level
//! fallback (exact name, then id-prefix glob), copies matches into the
//! output media directory, and records a [`MediaSource`] provenance entry
//! pointing at the best-quality remote copy.
//!
//! Copies are check-before-write, so re-running resolution never produces a
//! second physical copy and yields identical markup both times. A copy
//! failure degrades that single item to the "no local match" behavior and
//! never aborts the run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::MediaSource;

/// Best-quality remote copy of an archived image.
pub fn best_quality_image_url(original_filename: &str) -> String {
    format!("https://pbs.twimg.com/media/{original_filename}:orig")
}

/// A post's remote media descriptor, as found in its entity metadata.
#[derive(Debug, Clone, Default)]
pub struct RemoteMedia {
    /// Shortened URL as it appears inline in the body.
    pub short_url: String,
    /// Direct remote URL; its basename keys the local file search.
    pub remote_url: String,
    /// Bitrate variants for animated media. Empty for still images.
    pub variants: Vec<MediaVariant>,
}

/// One bitrate variant of an animated media item.
///
/// A bitrate of 0 is valid; variants without a bitrate never qualify as
/// best.
#[derive(Debug, Clone)]
pub struct MediaVariant {
    pub bitrate: Option<i64>,
    pub url: String,
}

/// Markup and provenance produced for one media item.
#[derive(Debug, Default)]
pub struct ResolvedMedia {
    pub markup: String,
    pub sources: Vec<MediaSource>,
}

/// Locates archived media files and copies them into the output directory.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    output_dir: PathBuf,
}

impl MediaResolver {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Resolves one post media item against `media_root`.
    ///
    /// Resolution order, first match wins:
    /// 1. exact local filename `{owner_id}-{basename(remote_url)}`;
    /// 2. any file whose name starts with `owner_id` (video fallback, with
    ///    max-bitrate variant selection for the provenance record);
    /// 3. no local match: the shortened URL stays inline as plain text.
    pub fn resolve(&self, owner_id: &str, media: &RemoteMedia, media_root: &Path) -> ResolvedMedia {
        let mut resolved = ResolvedMedia::default();
        let original_filename = basename(&media.remote_url);
        let archive_name = format!("{owner_id}-{original_filename}");
        let archive_path = media_root.join(&archive_name);

        if archive_path.is_file() {
            let output_path = self.output_dir.join(&archive_name);
            match copy_if_missing(&archive_path, &output_path) {
                Ok(()) => {
                    resolved.markup.push_str(&output_path.to_string_lossy());
                    resolved.sources.push(MediaSource {
                        local_path: output_path.to_string_lossy().into_owned(),
                        best_quality_url: best_quality_image_url(original_filename),
                    });
                }
                Err(err) => {
                    warn!("failed to copy {}: {err}", archive_path.display());
                    self.miss(media, &archive_path, &mut resolved);
                }
            }
            return resolved;
        }

        let matches = prefix_matches(media_root, owner_id);
        if matches.is_empty() {
            self.miss(media, &archive_path, &mut resolved);
            return resolved;
        }

        for archive_path in matches {
            let Some(file_name) = archive_path.file_name() else {
                continue;
            };
            let output_path = self.output_dir.join(file_name);
            if let Err(err) = copy_if_missing(&archive_path, &output_path) {
                warn!("failed to copy {}: {err}", archive_path.display());
                continue;
            }
            resolved.markup.push_str(&video_markup(&output_path));

            match best_variant(&media.variants) {
                Some(best_url) => resolved.sources.push(MediaSource {
                    local_path: output_path.to_string_lossy().into_owned(),
                    best_quality_url: best_url.to_string(),
                }),
                None => warn!(
                    "no best-quality URL found for {} ({})",
                    media.short_url, media.remote_url
                ),
            }
        }
        resolved
    }

    /// Resolves one direct-message media item against `media_root`.
    ///
    /// DM media is keyed by message id and its markup replaces the expanded
    /// URL in the body instead of being appended, so this returns just the
    /// markup; no provenance is recorded for DM media.
    pub fn resolve_dm(
        &self,
        message_id: &str,
        media_url: &str,
        media_root: &Path,
    ) -> Option<String> {
        let archive_name = format!("{message_id}-{}", basename(media_url));
        let archive_path = media_root.join(&archive_name);

        if archive_path.is_file() {
            let output_path = self.output_dir.join(&archive_name);
            match copy_if_missing(&archive_path, &output_path) {
                Ok(()) => return Some(output_path.to_string_lossy().into_owned()),
                Err(err) => {
                    warn!("failed to copy {}: {err}", archive_path.display());
                    return None;
                }
            }
        }

        let matches = prefix_matches(media_root, message_id);
        if matches.is_empty() {
            warn!(
                "missing local file: {}, using original link instead",
                archive_path.display()
            );
            return None;
        }

        let mut markup = None;
        for archive_path in matches {
            let Some(file_name) = archive_path.file_name() else {
                continue;
            };
            let output_path = self.output_dir.join(file_name);
            if let Err(err) = copy_if_missing(&archive_path, &output_path) {
                warn!("failed to copy {}: {err}", archive_path.display());
                continue;
            }
            // All prefix matches are copied; the first one supplies the markup.
            if markup.is_none() {
                markup = Some(video_markup(&output_path));
            }
        }
        markup
    }

    fn miss(&self, media: &RemoteMedia, expected: &Path, resolved: &mut ResolvedMedia) {
        warn!(
            "missing local file: {}. Using original link instead: {} (expands to {})",
            expected.display(),
            media.short_url,
            media.remote_url
        );
        resolved.markup.push_str(&media.short_url);
    }
}

/// Selects the URL of the variant with the maximum bitrate.
///
/// The starting best is -1, below any valid bitrate, so a variant marked
/// with bitrate 0 still qualifies. Returns `None` when no variant carries
/// a bitrate at all.
fn best_variant(variants: &[MediaVariant]) -> Option<&str> {
    let mut best_url = None;
    let mut best_bitrate: i64 = -1;
    for variant in variants {
        if let Some(bitrate) = variant.bitrate {
            if bitrate > best_bitrate {
                best_bitrate = bitrate;
                best_url = Some(variant.url.as_str());
            }
        }
    }
    best_url
}

fn video_markup(path: &Path) -> String {
    format!(
        "{} > Your browser does not support the video tag",
        path.to_string_lossy()
    )
}

fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn copy_if_missing(src: &Path, dst: &Path) -> io::Result<()> {
    if !dst.is_file() {
        fs::copy(src, dst)?;
    }
    Ok(())
}

/// Files under `dir` whose name starts with `prefix`, sorted by name.
fn prefix_matches(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches
}
