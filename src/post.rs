//! Post normalization.
//!
//! Converts one raw archived tweet record into a classified, text-rewritten,
//! media-annotated [`Post`]. Classification is decided by content
//! inspection: a body whose first token is `RT` is a repost, a record
//! carrying a reply-target status id is a reply, everything else is an
//! original post.
//!
//! Independent rewriting steps run in a fixed order: whitespace
//! normalization, repost rewriting, legacy-link backfill, link expansion,
//! reply-header reconstruction, media substitution, and finally the
//! identity side effects that feed newly discovered id/handle pairs back
//! into the registry.

use std::path::Path;

use chrono::{DateTime, Datelike};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::media::{MediaResolver, MediaVariant, RemoteMedia};
use crate::model::{MediaSource, Post, PostKind};
use crate::registry::IdentityRegistry;

const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";
const ELLIPSIS: char = '\u{2026}';

/// A record in a tweet source shard; newer archives wrap the tweet in a
/// `{"tweet": {...}}` envelope, older ones do not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TweetRecord {
    Wrapped { tweet: RawTweet },
    Bare(RawTweet),
}

impl TweetRecord {
    pub fn into_inner(self) -> RawTweet {
        match self {
            TweetRecord::Wrapped { tweet } | TweetRecord::Bare(tweet) => tweet,
        }
    }
}

/// Raw tweet fields the normalizer consumes. Ids arrive as strings or
/// numbers depending on archive vintage, hence [`IdValue`].
#[derive(Debug, Deserialize)]
pub struct RawTweet {
    pub created_at: String,
    pub full_text: String,
    pub id_str: String,
    pub entities: Option<Entities>,
    pub extended_entities: Option<ExtendedEntities>,
    pub in_reply_to_status_id: Option<IdValue>,
    pub in_reply_to_screen_name: Option<String>,
    pub in_reply_to_user_id: Option<IdValue>,
}

/// A numeric identifier that may be encoded as a JSON string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Text(String),
    Number(i64),
}

impl IdValue {
    pub fn to_id_string(&self) -> String {
        match self {
            IdValue::Text(s) => s.clone(),
            IdValue::Number(n) => n.to_string(),
        }
    }

    /// Some archives carry ids of -1 for accounts that no longer exist;
    /// those are not real ids and are never registered.
    pub fn is_negative(&self) -> bool {
        match self {
            IdValue::Text(s) => s.parse::<i64>().is_ok_and(|n| n < 0),
            IdValue::Number(n) => *n < 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
    /// Some archives write `null` for the list itself or for single
    /// elements; both collapse to "no mention" instead of a parse error.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub user_mentions: Vec<MentionEntity>,
}

/// Accepts `null` in place of a list and `null` in place of an element,
/// yielding an empty/filtered vector either way.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items.unwrap_or_default().into_iter().flatten().collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlEntity {
    pub url: Option<String>,
    pub expanded_url: Option<String>,
    pub display_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaEntity {
    /// Shortened URL as embedded in the body.
    pub url: Option<String>,
    /// Direct remote URL of the media file.
    pub media_url: Option<String>,
    pub video_info: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub variants: Vec<RawVariant>,
}

#[derive(Debug, Deserialize)]
pub struct RawVariant {
    /// Encoded as a string in most archives, a number in some.
    pub bitrate: Option<Value>,
    pub url: Option<String>,
}

/// Converts raw tweets into normalized posts.
pub struct PostNormalizer<'a> {
    owner_handle: &'a str,
    media_root: &'a Path,
    resolver: &'a MediaResolver,
    mention_prefix: Regex,
}

impl<'a> PostNormalizer<'a> {
    pub fn new(owner_handle: &'a str, media_root: &'a Path, resolver: &'a MediaResolver) -> Self {
        Self {
            owner_handle,
            media_root,
            resolver,
            // A leading run of '@username ' tokens marks who a reply addresses.
            mention_prefix: Regex::new(r"^(@[0-9A-Za-z_]* )*").unwrap(),
        }
    }

    /// Normalizes one raw tweet.
    ///
    /// `registry` receives any id/handle pairs discovered inline;
    /// `media_sources` receives provenance entries for resolved media.
    pub fn normalize(
        &self,
        raw: RawTweet,
        registry: &mut IdentityRegistry,
        media_sources: &mut Vec<MediaSource>,
    ) -> Post {
        let RawTweet {
            created_at,
            full_text,
            id_str,
            entities,
            extended_entities,
            in_reply_to_status_id,
            in_reply_to_screen_name,
            in_reply_to_user_id,
        } = raw;

        let mut entities = entities;
        let mut body = normalize_whitespace(&full_text);
        let mut kind = PostKind::Original;
        let mut reposted_from = None;
        let mut reply_mention_names = None;
        let mut reply_target_url = None;

        // Repost: first token is literally RT, the second carries the
        // original author as '@name:'. The rewritten body drops both.
        let words: Vec<&str> = full_text.split_whitespace().collect();
        if words.first() == Some(&"RT") {
            kind = PostKind::Repost;
            reposted_from = Some(words.get(1).map_or_else(String::new, |t| strip_handle(t)));
            body = join_words(words.iter().skip(2).copied());
        }

        // Posts that predate embedded t.co redirects carry bare links with
        // no entity metadata; synthesize link entities for them so the
        // expansion step below sees a uniform shape.
        if let Some(ents) = entities.as_mut() {
            if ents.media.is_empty() && ents.urls.is_empty() {
                for word in full_text.split_whitespace() {
                    if let Some(entity) = backfill_link_entity(word) {
                        ents.urls.push(entity);
                    }
                }
            }
        }

        // Replace shortened URLs with their expanded versions everywhere
        // they occur in the body.
        if let Some(ents) = entities.as_ref() {
            for link in &ents.urls {
                if let (Some(short), Some(expanded)) =
                    (link.url.as_deref(), link.expanded_url.as_deref())
                {
                    body = body.replace(short, expanded);
                }
            }
        }

        // Reply: reconstruct the header that names the accounts being
        // replied to, stripping the mention run from the body.
        if let Some(status_id) = in_reply_to_status_id.as_ref() {
            kind = PostKind::Reply;
            let prefix = self
                .mention_prefix
                .find(&body)
                .map_or(String::new(), |m| m.as_str().to_string());
            let replying_to = if prefix.is_empty() {
                // No '@username ' in the body: replying to self.
                format!("@{}", self.owner_handle)
            } else {
                body = body[prefix.len()..].to_string();
                prefix
            };
            let names: Vec<String> = replying_to.split_whitespace().map(str::to_string).collect();

            // Old tweets may lack the explicit screen name; fall back to the
            // first stripped mention.
            let screen_name = in_reply_to_screen_name
                .clone()
                .or_else(|| names.first().cloned())
                .unwrap_or_default();
            reply_target_url = Some(format!(
                "https://twitter.com/{screen_name}/status/{}",
                status_id.to_id_string()
            ));
            reply_mention_names = Some(names);
        }

        // Media substitution: resolve each extended media entity locally and
        // strip the now-redundant shortened media URL from the body.
        let mut media_markup = None;
        if let (Some(ents), Some(ext)) = (entities.as_ref(), extended_entities.as_ref()) {
            if !ents.media.is_empty() && !ext.media.is_empty() {
                let short_url = ents.media[0].url.clone().unwrap_or_default();
                let mut markup = String::new();
                for media in &ext.media {
                    if media.url.is_none() || media.media_url.is_none() {
                        continue;
                    }
                    let descriptor = RemoteMedia {
                        short_url: short_url.clone(),
                        remote_url: media.media_url.clone().unwrap_or_default(),
                        variants: convert_variants(media.video_info.as_ref()),
                    };
                    let resolved = self.resolver.resolve(&id_str, &descriptor, self.media_root);
                    markup.push_str(&resolved.markup);
                    media_sources.extend(resolved.sources);
                }
                body = body.replace(&short_url, "");
                media_markup = Some(markup);
            }
        }

        // Identity side effects: any id/handle pair found inline fills the
        // registry, overwriting earlier lookups (last write wins).
        if let (Some(user_id), Some(screen_name)) =
            (in_reply_to_user_id.as_ref(), in_reply_to_screen_name.as_deref())
        {
            if !user_id.is_negative() {
                registry.register(user_id.to_id_string(), screen_name);
            }
        }
        if let Some(ents) = entities.as_ref() {
            for mention in &ents.user_mentions {
                if let (Some(id), Some(handle)) =
                    (mention.id.as_ref(), mention.screen_name.as_deref())
                {
                    if !id.is_negative() {
                        registry.register(id.to_id_string(), handle);
                    }
                }
            }
        }

        Post {
            year: post_year(&created_at),
            kind,
            reposted_from,
            reply_mention_names,
            reply_target_url,
            body,
            timestamp: created_at,
            permalink: format!("https://twitter.com/{}/{id_str}", self.owner_handle),
            media_markup,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MentionEntity {
    pub id: Option<IdValue>,
    pub screen_name: Option<String>,
}

/// Rebuilds `text` with every whitespace run collapsed to a single space;
/// non-empty results keep a trailing space.
pub fn normalize_whitespace(text: &str) -> String {
    join_words(text.split_whitespace())
}

fn join_words<'a, I: Iterator<Item = &'a str>>(words: I) -> String {
    let mut out = String::new();
    for word in words {
        out.push_str(word);
        out.push(' ');
    }
    out
}

/// `@alice:` -> `alice`: drop the leading `@` and trailing punctuation.
fn strip_handle(token: &str) -> String {
    token
        .strip_prefix('@')
        .unwrap_or(token)
        .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_string()
}

/// Synthesizes a link entity for a bare absolute URL, shortening the
/// display form the way the service does: drop a `www.` prefix and
/// truncate path+query at 15 characters with an ellipsis.
fn backfill_link_entity(word: &str) -> Option<UrlEntity> {
    if word.ends_with(ELLIPSIS) {
        return None;
    }
    let parsed = Url::parse(word).ok()?;
    let host = parsed.host_str()?;
    let host_short = host.strip_prefix("www.").unwrap_or(host);

    // Url normalizes a bare host to path "/"; only an explicit slash in
    // the source text keeps one in the display form.
    let after_scheme = word.split_once("://").map_or(word, |(_, rest)| rest);
    let path = match (parsed.path(), parsed.query()) {
        ("/", None) if !after_scheme.contains('/') => "",
        (path, _) => path,
    };
    let path_query = format!("{path}?{}", parsed.query().unwrap_or(""));
    let display_path = if path_query.chars().count() < 15 {
        path.to_string()
    } else {
        let truncated: String = path_query.chars().take(15).collect();
        format!("{truncated}{ELLIPSIS}")
    };

    Some(UrlEntity {
        url: Some(word.to_string()),
        expanded_url: Some(word.to_string()),
        display_url: Some(format!("{host_short}{display_path}")),
    })
}

fn convert_variants(video_info: Option<&VideoInfo>) -> Vec<MediaVariant> {
    let Some(info) = video_info else {
        return Vec::new();
    };
    info.variants
        .iter()
        .filter_map(|variant| {
            let url = variant.url.clone()?;
            Some(MediaVariant {
                bitrate: variant.bitrate.as_ref().and_then(parse_bitrate),
                url,
            })
        })
        .collect()
}

fn parse_bitrate(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Year of a legacy-format timestamp, e.g. `Tue Mar 19 14:05:17 +0000 2019`.
fn post_year(created_at: &str) -> String {
    DateTime::parse_from_str(created_at, CREATED_AT_FORMAT).map_or_else(
        |_| {
            created_at
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_string()
        },
        |dt| dt.year().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn raw_tweet(json: serde_json::Value) -> RawTweet {
        serde_json::from_value::<TweetRecord>(json).unwrap().into_inner()
    }

    struct Fixture {
        _input: tempfile::TempDir,
        _output: tempfile::TempDir,
        resolver: MediaResolver,
        media_root: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let resolver = MediaResolver::new(output.path());
        let media_root = input.path().to_path_buf();
        Fixture {
            _input: input,
            _output: output,
            resolver,
            media_root,
        }
    }

    fn normalize(json: serde_json::Value) -> (Post, IdentityRegistry, Vec<MediaSource>) {
        let fx = fixture();
        let normalizer = PostNormalizer::new("owner", &fx.media_root, &fx.resolver);
        let mut registry = IdentityRegistry::new();
        let mut sources = Vec::new();
        let post = normalizer.normalize(raw_tweet(json), &mut registry, &mut sources);
        (post, registry, sources)
    }

    #[test]
    fn test_original_post() {
        let (post, _, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "just a normal day",
                "id_str": "100"
            }
        }));
        assert_eq!(post.kind, PostKind::Original);
        assert_eq!(post.body, "just a normal day ");
        assert_eq!(post.year, "2019");
        assert_eq!(post.permalink, "https://twitter.com/owner/100");
        assert!(post.reposted_from.is_none());
        assert!(post.reply_target_url.is_none());
    }

    #[test]
    fn test_repost_classification() {
        let (post, _, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "RT @alice: hello world",
                "id_str": "100"
            }
        }));
        assert_eq!(post.kind, PostKind::Repost);
        assert_eq!(post.reposted_from.as_deref(), Some("alice"));
        assert_eq!(post.body, "hello world ");
    }

    #[test]
    fn test_reply_classification() {
        let (post, _, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "@bob @carol thanks",
                "id_str": "100",
                "in_reply_to_status_id": "555",
                "in_reply_to_screen_name": "bob"
            }
        }));
        assert_eq!(post.kind, PostKind::Reply);
        assert_eq!(
            post.reply_mention_names,
            Some(vec!["@bob".to_string(), "@carol".to_string()])
        );
        assert_eq!(post.body, "thanks ");
        assert_eq!(
            post.reply_target_url.as_deref(),
            Some("https://twitter.com/bob/status/555")
        );
    }

    #[test]
    fn test_self_reply_defaults_to_owner() {
        let (post, _, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "continuing my thread",
                "id_str": "100",
                "in_reply_to_status_id": "555"
            }
        }));
        assert_eq!(post.kind, PostKind::Reply);
        assert_eq!(post.reply_mention_names, Some(vec!["@owner".to_string()]));
        assert_eq!(post.body, "continuing my thread ");
        assert_eq!(
            post.reply_target_url.as_deref(),
            Some("https://twitter.com/@owner/status/555")
        );
    }

    #[test]
    fn test_link_expansion() {
        let (post, _, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "look https://t.co/xyz now",
                "id_str": "100",
                "entities": {
                    "urls": [{
                        "url": "https://t.co/xyz",
                        "expanded_url": "https://example.com/article",
                        "display_url": "example.com/article"
                    }]
                }
            }
        }));
        assert_eq!(post.body, "look https://example.com/article now ");
    }

    #[test]
    fn test_identity_side_effects() {
        let (_, registry, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "@bob hi",
                "id_str": "100",
                "in_reply_to_status_id": "555",
                "in_reply_to_screen_name": "bob",
                "in_reply_to_user_id": "42",
                "entities": {
                    "user_mentions": [
                        {"id": 43, "screen_name": "carol"},
                        {"id": "-1", "screen_name": "ghost"}
                    ]
                }
            }
        }));
        assert_eq!(registry.resolve("42"), Some("bob"));
        assert_eq!(registry.resolve("43"), Some("carol"));
        // Negative ids mean "no real id" and are never registered.
        assert_eq!(registry.resolve("-1"), None);
    }

    #[test]
    fn test_null_user_mentions_parse_as_empty() {
        let (post, registry, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "nothing to see",
                "id_str": "100",
                "entities": {"user_mentions": null}
            }
        }));
        assert_eq!(post.kind, PostKind::Original);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_null_mention_elements_are_dropped() {
        let (_, registry, _) = normalize(serde_json::json!({
            "tweet": {
                "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "@carol hi",
                "id_str": "100",
                "entities": {
                    "user_mentions": [null, {"id": "43", "screen_name": "carol"}]
                }
            }
        }));
        assert_eq!(registry.resolve("43"), Some("carol"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_media_substitution_strips_short_url() {
        let fx = fixture();
        std::fs::write(fx.media_root.join("100-photo.jpg"), b"jpeg").unwrap();
        let normalizer = PostNormalizer::new("owner", &fx.media_root, &fx.resolver);
        let mut registry = IdentityRegistry::new();
        let mut sources = Vec::new();
        let post = normalizer.normalize(
            raw_tweet(serde_json::json!({
                "tweet": {
                    "created_at": "Tue Mar 19 14:05:17 +0000 2019",
                    "full_text": "sunset https://t.co/pic",
                    "id_str": "100",
                    "entities": {
                        "media": [{"url": "https://t.co/pic", "media_url": "https://pbs.twimg.com/media/photo.jpg"}]
                    },
                    "extended_entities": {
                        "media": [{"url": "https://t.co/pic", "media_url": "https://pbs.twimg.com/media/photo.jpg"}]
                    }
                }
            })),
            &mut registry,
            &mut sources,
        );
        assert_eq!(post.body, "sunset  ");
        assert!(post.media_markup.unwrap().contains("100-photo.jpg"));
        assert_eq!(sources.len(), 1);
        assert_eq!(
            sources[0].best_quality_url,
            "https://pbs.twimg.com/media/photo.jpg:orig"
        );
    }

    #[test]
    fn test_backfill_link_entity() {
        let entity = backfill_link_entity("https://www.example.com/a").unwrap();
        assert_eq!(entity.display_url.as_deref(), Some("example.com/a"));

        let entity =
            backfill_link_entity("https://example.com/a/very/long/path/indeed").unwrap();
        let display = entity.display_url.unwrap();
        assert!(display.starts_with("example.com/a/very/long/pa"));
        assert!(display.ends_with('\u{2026}'));

        assert!(backfill_link_entity("not-a-url").is_none());
        assert!(backfill_link_entity("https://example.com/cut\u{2026}").is_none());
    }

    #[test]
    fn test_backfill_bare_host_keeps_explicit_slash() {
        let entity = backfill_link_entity("https://example.com").unwrap();
        assert_eq!(entity.display_url.as_deref(), Some("example.com"));

        let entity = backfill_link_entity("https://example.com/").unwrap();
        assert_eq!(entity.display_url.as_deref(), Some("example.com/"));
    }

    #[test]
    fn test_strip_handle() {
        assert_eq!(strip_handle("@alice:"), "alice");
        assert_eq!(strip_handle("@bob"), "bob");
        assert_eq!(strip_handle("carol:"), "carol");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("a  b\n\tc"), "a b c ");
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn test_post_year_fallback() {
        assert_eq!(post_year("Tue Mar 19 14:05:17 +0000 2019"), "2019");
        assert_eq!(post_year("something odd 2021"), "2021");
        assert_eq!(post_year(""), "");
    }

    #[test]
    fn test_id_value_forms() {
        let text: IdValue = serde_json::from_str("\"123\"").unwrap();
        let number: IdValue = serde_json::from_str("123").unwrap();
        assert_eq!(text.to_id_string(), "123");
        assert_eq!(number.to_id_string(), "123");
        assert!(!text.is_negative());

        let negative: IdValue = serde_json::from_str("-1").unwrap();
        assert!(negative.is_negative());
    }
}
