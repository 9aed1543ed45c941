//! Identity registry: opaque numeric user ids to human-readable handles.
//!
//! The registry is built in three phases, in this order:
//!
//! 1. **Enumeration** — ids referenced by the four archive sources
//!    (following, followers, pairwise DM conversation ids, group DM
//!    participant events) form the candidate set for online lookup.
//! 2. **Bulk lookup** — the candidate set, minus ids already registered,
//!    is resolved in batches (see [`crate::lookup`]).
//! 3. **Opportunistic discovery** — while normalizing posts, inline
//!    id/handle pairs (reply targets, mentions) are registered as they are
//!    found; the registry is last-write-wins, so these later discoveries
//!    overwrite lookup results when they differ.
//!
//! Consumers never see a missing entry as an error. Follow edges fall back
//! to [`UNKNOWN_HANDLE`]; message contexts fall back to a profile URL built
//! from the raw id.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use tracing::info;

use crate::dm::{ConversationRecord, participant_ids};

/// Stable sentinel for a follow edge whose id never resolved.
pub const UNKNOWN_HANDLE: &str = "~unknown~handle~";

/// Builds the profile URL for a raw user id.
pub fn profile_url(id: &str) -> String {
    format!("https://twitter.com/i/user/{id}")
}

/// Last-write-wins mapping from user id to handle.
///
/// Owned by the pipeline and threaded through its stages explicitly; there
/// is no ambient shared state and no locking.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    users: HashMap<String, String>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the handle for `id`.
    pub fn register(&mut self, id: impl Into<String>, handle: impl Into<String>) {
        self.users.insert(id.into(), handle.into());
    }

    /// Resolved handle for `id`, if known.
    pub fn resolve(&self, id: &str) -> Option<&str> {
        self.users.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.users.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Handle for `id`, or the [`UNKNOWN_HANDLE`] sentinel.
    ///
    /// This is the follow-edge fallback; message contexts use
    /// [`handle_or_profile_url`](Self::handle_or_profile_url) instead.
    pub fn handle_or_unknown(&self, id: &str) -> String {
        self.resolve(id)
            .map_or_else(|| UNKNOWN_HANDLE.to_string(), str::to_string)
    }

    /// Handle for `id`, or a profile URL built from the raw id.
    pub fn handle_or_profile_url(&self, id: &str) -> String {
        self.resolve(id)
            .map_or_else(|| profile_url(id), str::to_string)
    }

    /// Filters `ids` down to those not yet registered, deduplicated and in
    /// a stable order, ready for a lookup request.
    pub fn unresolved<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let set: BTreeSet<&String> = ids.into_iter().filter(|id| !self.contains(id)).collect();
        set.into_iter().cloned().collect()
    }
}

/// One record in `following.js` / `follower.js`.
///
/// Both files share the shape `{<direction>: {"accountId": "..."}}`.
#[derive(Debug, Deserialize)]
pub struct FollowRecord {
    pub following: Option<FollowAccount>,
    pub follower: Option<FollowAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowAccount {
    pub account_id: Option<String>,
}

/// Ids referenced by the following source, in file order.
pub fn following_ids(records: &[FollowRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.following.as_ref())
        .filter_map(|a| a.account_id.clone())
        .collect()
}

/// Ids referenced by the follower source, in file order.
pub fn follower_ids(records: &[FollowRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.follower.as_ref())
        .filter_map(|a| a.account_id.clone())
        .collect()
}

/// Ids referenced by pairwise DM conversations.
///
/// Each conversation id is a literal `"<id1>-<id2>"` pair.
pub fn dm_conversation_ids(records: &[ConversationRecord]) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for conversation in records.iter().filter_map(|r| r.conversation.as_ref()) {
        if let Some(conversation_id) = conversation.id.as_deref() {
            for id in conversation_id.split('-') {
                if !id.is_empty() {
                    ids.insert(id.to_string());
                }
            }
        }
    }
    ids.into_iter().collect()
}

/// Ids of every participant referenced by group DM conversations.
pub fn group_participant_ids(records: &[ConversationRecord]) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for conversation in records.iter().filter_map(|r| r.conversation.as_ref()) {
        for id in participant_ids(&conversation.messages) {
            ids.insert(id);
        }
    }
    ids.into_iter().collect()
}

/// Union of all ids referenced across the four sources.
///
/// The per-source sets are enumerated (and their sizes logged) separately
/// before merging, so diagnostics stay comparable across runs.
pub fn collect_candidate_ids(
    following: &[FollowRecord],
    followers: &[FollowRecord],
    dms: &[ConversationRecord],
    group_dms: &[ConversationRecord],
) -> Vec<String> {
    let following_ids = following_ids(following);
    info!("found {} user IDs in followings", following_ids.len());

    let follower_ids = follower_ids(followers);
    info!("found {} user IDs in followers", follower_ids.len());

    let dm_ids = dm_conversation_ids(dms);
    info!("found {} user IDs in direct messages", dm_ids.len());

    let group_ids = group_participant_ids(group_dms);
    info!("found {} user IDs in group direct messages", group_ids.len());

    let union: BTreeSet<String> = following_ids
        .into_iter()
        .chain(follower_ids)
        .chain(dm_ids)
        .chain(group_ids)
        .collect();
    info!("found {} user IDs overall", union.len());

    union.into_iter().collect()
}
