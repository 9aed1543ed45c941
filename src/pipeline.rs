//! The normalization pipeline.
//!
//! Runs single-threaded in a strict sequence: candidate enumeration feeds
//! the bulk identity lookup, posts are normalized next (registering inline
//! discoveries as they appear), and follow edges and conversations are
//! derived last so they see the fullest registry. The only blocking
//! external operation is the bulk lookup, and it is best-effort; every
//! later stage works purely from local files.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::archive::{
    ArchiveLayout, DIRECT_MESSAGES_FILE, DIRECT_MESSAGES_GROUP_FILE, FOLLOWER_FILE,
    FOLLOWING_FILE, read_js_records,
};
use crate::dm::{ConversationRecord, ConversationReconstructor};
use crate::error::{Result, TweetpackError};
use crate::lookup::{LookupOutcome, UserLookup};
use crate::media::MediaResolver;
use crate::model::{FollowEdge, MediaSource, NormalizedModel, Post};
use crate::post::{PostNormalizer, TweetRecord};
use crate::registry::{
    FollowRecord, IdentityRegistry, collect_candidate_ids, following_ids, follower_ids,
    profile_url,
};

#[derive(Debug, Deserialize)]
struct AccountRecord {
    account: Option<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: Option<String>,
}

/// Normalizes the archive at `archive_dir` into a [`NormalizedModel`].
///
/// `lookup` is the optional online enrichment seam; passing `None` runs
/// fully offline, leaving unenumerated ids to their fallback forms.
///
/// # Errors
///
/// Fails only on fatal setup problems: a directory that is not an archive,
/// or required files that are missing or unparseable.
pub fn run(archive_dir: &Path, lookup: Option<&dyn UserLookup>) -> Result<NormalizedModel> {
    let layout = ArchiveLayout::discover(archive_dir)?;
    let owner_handle = read_owner_handle(&layout)?;
    info!("normalizing archive of @{owner_handle}");

    let following: Vec<FollowRecord> = read_js_records(&layout.source_file(FOLLOWING_FILE))?;
    let followers: Vec<FollowRecord> = read_js_records(&layout.source_file(FOLLOWER_FILE))?;
    let dms: Vec<ConversationRecord> =
        read_js_records(&layout.source_file(DIRECT_MESSAGES_FILE))?;
    let group_dms: Vec<ConversationRecord> =
        read_js_records(&layout.source_file(DIRECT_MESSAGES_GROUP_FILE))?;

    let mut registry = IdentityRegistry::new();
    let mut media_sources: Vec<MediaSource> = Vec::new();

    // Phase 1: bulk identity enrichment from the four source enumerations.
    let candidates = collect_candidate_ids(&following, &followers, &dms, &group_dms);
    enrich(&mut registry, &candidates, lookup);

    // Phase 2: posts. Normalization feeds inline id/handle discoveries
    // back into the registry, so it runs before any handle consumer.
    let resolver = MediaResolver::new(&layout.dir_output_media);
    let posts = normalize_posts(&layout, &owner_handle, &resolver, &mut registry, &mut media_sources)?;
    info!("normalized {} posts", posts.len());

    // Phase 3: derived views over the finished registry.
    let following = follow_edges(following_ids(&following), &registry);
    let followers = follow_edges(follower_ids(&followers), &registry);

    let reconstructor = ConversationReconstructor::new(&resolver);
    let direct_messages = reconstructor.pairwise(&dms, &layout.dir_dm_media, &registry);
    info!("reconstructed {} direct messages", direct_messages.len());
    let group_conversations = reconstructor.groups(&group_dms, &layout.dir_group_media, &registry);
    info!("reconstructed {} group conversations", group_conversations.len());

    Ok(NormalizedModel {
        owner_handle,
        following,
        followers,
        posts,
        direct_messages,
        group_conversations,
        media_sources,
    })
}

fn read_owner_handle(layout: &ArchiveLayout) -> Result<String> {
    let path = layout.source_file(crate::archive::ACCOUNT_FILE);
    let records: Vec<AccountRecord> = read_js_records(&path)?;
    records
        .into_iter()
        .find_map(|record| record.account.and_then(|account| account.username))
        .ok_or_else(|| TweetpackError::invalid_structure("account record", path))
}

fn enrich(registry: &mut IdentityRegistry, candidates: &[String], lookup: Option<&dyn UserLookup>) {
    let Some(lookup) = lookup else {
        info!("identity lookup disabled, continuing with unresolved registry");
        return;
    };
    let unresolved = registry.unresolved(candidates);
    let result = lookup.resolve_handles(&unresolved);
    for user in result.users {
        registry.register(user.id, user.handle);
    }
    match result.outcome {
        LookupOutcome::Complete => {}
        LookupOutcome::Partial { remaining } => {
            warn!("identity lookup truncated, {remaining} ids left unresolved");
        }
        LookupOutcome::Unavailable => {
            warn!("identity lookup unavailable, continuing with unresolved registry");
        }
    }
}

fn normalize_posts(
    layout: &ArchiveLayout,
    owner_handle: &str,
    resolver: &MediaResolver,
    registry: &mut IdentityRegistry,
    media_sources: &mut Vec<MediaSource>,
) -> Result<Vec<Post>> {
    let normalizer = PostNormalizer::new(owner_handle, &layout.dir_media, resolver);
    let mut posts = Vec::new();
    for shard in &layout.tweet_shards {
        let records: Vec<TweetRecord> = read_js_records(shard)?;
        for record in records {
            posts.push(normalizer.normalize(record.into_inner(), registry, media_sources));
        }
    }
    Ok(posts)
}

fn follow_edges(ids: Vec<String>, registry: &IdentityRegistry) -> Vec<FollowEdge> {
    ids.into_iter()
        .map(|id| FollowEdge {
            handle: registry.handle_or_unknown(&id),
            profile_url: profile_url(&id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{LookupResult, ResolvedUser};
    use std::fs;
    use tempfile::tempdir;

    struct StubLookup {
        users: Vec<(&'static str, &'static str)>,
    }

    impl UserLookup for StubLookup {
        fn resolve_handles(&self, ids: &[String]) -> LookupResult {
            LookupResult {
                users: self
                    .users
                    .iter()
                    .filter(|(id, _)| ids.contains(&(*id).to_string()))
                    .map(|(id, handle)| ResolvedUser {
                        id: (*id).to_string(),
                        handle: (*handle).to_string(),
                    })
                    .collect(),
                outcome: LookupOutcome::Complete,
            }
        }
    }

    fn write_js(path: &Path, var: &str, body: &str) {
        fs::write(path, format!("window.YTD.{var} = [\n{body}\n]\n")).unwrap();
    }

    fn build_archive(root: &Path) {
        let data = root.join("data");
        fs::create_dir_all(data.join("tweet_media")).unwrap();
        write_js(
            &data.join("account.js"),
            "account.part0",
            r#"{"account": {"username": "owner"}}"#,
        );
        write_js(
            &data.join("tweets.js"),
            "tweets.part0",
            r#"{"tweet": {"created_at": "Tue Mar 19 14:05:17 +0000 2019",
                "full_text": "RT @alice: hello world", "id_str": "100"}}"#,
        );
        write_js(
            &data.join("following.js"),
            "following.part0",
            r#"{"following": {"accountId": "1"}}, {"following": {"accountId": "999"}}"#,
        );
        write_js(
            &data.join("follower.js"),
            "follower.part0",
            r#"{"follower": {"accountId": "2"}}"#,
        );
        write_js(
            &data.join("direct-messages.js"),
            "direct_messages.part0",
            r#"{"dmConversation": {"conversationId": "1-2", "messages": [
                {"messageCreate": {"id": "m1", "senderId": "1", "recipientId": "2",
                 "text": "hello", "createdAt": "2022-01-27T15:58:52.744Z"}}
            ]}}"#,
        );
    }

    #[test]
    fn test_run_offline() {
        let dir = tempdir().unwrap();
        build_archive(dir.path());
        let model = run(dir.path(), None).unwrap();

        assert_eq!(model.owner_handle, "owner");
        assert_eq!(model.posts.len(), 1);
        assert_eq!(model.following_count(), 2);
        // Offline, nothing resolves: follow edges use the sentinel.
        assert_eq!(model.following[0].handle, crate::registry::UNKNOWN_HANDLE);
        assert_eq!(model.following[0].profile_url, "https://twitter.com/i/user/1");
        // Message contexts use the profile-URL fallback instead.
        assert_eq!(
            model.direct_messages[0].from_handle,
            "https://twitter.com/i/user/1"
        );
    }

    #[test]
    fn test_run_with_lookup() {
        let dir = tempdir().unwrap();
        build_archive(dir.path());
        let stub = StubLookup {
            users: vec![("1", "alice"), ("2", "bob")],
        };
        let model = run(dir.path(), Some(&stub)).unwrap();

        assert_eq!(model.following[0].handle, "alice");
        assert_eq!(model.following[1].handle, crate::registry::UNKNOWN_HANDLE);
        assert_eq!(model.followers[0].handle, "bob");
        assert_eq!(model.direct_messages[0].from_handle, "alice");
        assert_eq!(model.direct_messages[0].to_handle, "bob");
    }

    #[test]
    fn test_run_rejects_non_archive() {
        let dir = tempdir().unwrap();
        let err = run(dir.path(), None).unwrap_err();
        assert!(err.is_missing_marker());
    }
}
