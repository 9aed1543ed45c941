//! Normalized data model for an archive.
//!
//! All archive sources are converted into these value records, collected
//! under the aggregate root [`NormalizedModel`]. The records are produced
//! once by the pipeline and never mutated afterwards; rendering them into a
//! document format is out of scope for this crate.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Classification of an archived post.
///
/// Exactly one kind holds per post; the classification is decided by
/// content inspection in [`crate::post::PostNormalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostKind {
    /// A post authored by the archive owner.
    Original,
    /// A verbatim re-share of another author's post (`RT @name: ...`).
    Repost,
    /// A reply to another post.
    Reply,
}

/// One archived status update, classified and text-rewritten.
///
/// Invariants upheld by the normalizer:
/// - `kind == Repost` implies `reposted_from` is present
/// - `kind == Reply` implies `reply_target_url` is present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Year the post was created, derived from its timestamp.
    pub year: String,
    /// ORIGINAL, REPOST or REPLY.
    pub kind: PostKind,
    /// Handle the post was re-shared from (REPOST only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reposted_from: Option<String>,
    /// `@name` tokens stripped from the front of a reply body.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_mention_names: Option<Vec<String>>,
    /// Permalink of the post being replied to (REPLY only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_target_url: Option<String>,
    /// Rewritten body text.
    pub body: String,
    /// Original creation timestamp, e.g. `Tue Mar 19 14:05:17 +0000 2019`.
    pub timestamp: String,
    /// Permalink of this post, built from the owner handle and post id.
    pub permalink: String,
    /// Markup fragments for locally resolved media, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub media_markup: Option<String>,
}

/// One follow relationship, in either direction.
///
/// When the id could not be resolved to a handle, `handle` carries the
/// unknown-handle sentinel rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub handle: String,
    pub profile_url: String,
}

/// One message in a two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub from_handle: String,
    pub to_handle: String,
    pub body: String,
    pub timestamp: String,
}

/// One message in a group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub from_handle: String,
    pub body: String,
    pub timestamp: String,
}

/// A reconstructed multi-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConversation {
    /// Conversation name; when several name-update events occur, the last
    /// one in stream order wins.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Messages in stream order.
    pub messages: Vec<GroupMessage>,
    /// Resolved participant handles, in the order their ids were first seen.
    pub participants: Vec<String>,
}

/// Provenance record for one locally resolved media file.
///
/// Maps the copied local file to the best-quality remote copy, enabling a
/// later (out-of-scope) quality-upgrade pass. This is an append-only log,
/// not a keyed store: duplicates are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub local_path: String,
    pub best_quality_url: String,
}

/// Aggregate root holding everything extracted from one archive.
///
/// `following_count` / `follower_count` are derived from the edge vectors
/// and cannot be set independently; serialization emits them alongside the
/// data for downstream consumers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NormalizedModel {
    /// The archive owner's handle, from `account.js`.
    pub owner_handle: String,
    pub following: Vec<FollowEdge>,
    pub followers: Vec<FollowEdge>,
    pub posts: Vec<Post>,
    pub direct_messages: Vec<DirectMessage>,
    pub group_conversations: Vec<GroupConversation>,
    /// Append-only media provenance log collected during normalization.
    pub media_sources: Vec<MediaSource>,
}

impl NormalizedModel {
    /// Number of accounts the owner follows. Always `following.len()`.
    pub fn following_count(&self) -> usize {
        self.following.len()
    }

    /// Number of accounts following the owner. Always `followers.len()`.
    pub fn follower_count(&self) -> usize {
        self.followers.len()
    }
}

impl Serialize for NormalizedModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NormalizedModel", 9)?;
        state.serialize_field("owner_handle", &self.owner_handle)?;
        state.serialize_field("following", &self.following)?;
        state.serialize_field("followers", &self.followers)?;
        state.serialize_field("following_count", &self.following_count())?;
        state.serialize_field("follower_count", &self.follower_count())?;
        state.serialize_field("posts", &self.posts)?;
        state.serialize_field("direct_messages", &self.direct_messages)?;
        state.serialize_field("group_conversations", &self.group_conversations)?;
        state.serialize_field("media_sources", &self.media_sources)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        Post {
            year: "2019".into(),
            kind: PostKind::Original,
            reposted_from: None,
            reply_mention_names: None,
            reply_target_url: None,
            body: "hello world ".into(),
            timestamp: "Tue Mar 19 14:05:17 +0000 2019".into(),
            permalink: "https://twitter.com/alice/1".into(),
            media_markup: None,
        }
    }

    #[test]
    fn test_post_kind_serializes_uppercase() {
        let json = serde_json::to_string(&PostKind::Repost).unwrap();
        assert_eq!(json, "\"REPOST\"");
        let back: PostKind = serde_json::from_str("\"REPLY\"").unwrap();
        assert_eq!(back, PostKind::Reply);
    }

    #[test]
    fn test_post_omits_absent_optionals() {
        let json = serde_json::to_string(&sample_post()).unwrap();
        assert!(!json.contains("reposted_from"));
        assert!(!json.contains("reply_target_url"));
        assert!(json.contains("ORIGINAL"));
    }

    #[test]
    fn test_counts_are_derived() {
        let model = NormalizedModel {
            owner_handle: "alice".into(),
            following: vec![
                FollowEdge {
                    handle: "bob".into(),
                    profile_url: "https://twitter.com/i/user/2".into(),
                },
                FollowEdge {
                    handle: "carol".into(),
                    profile_url: "https://twitter.com/i/user/3".into(),
                },
            ],
            followers: vec![],
            posts: vec![sample_post()],
            direct_messages: vec![],
            group_conversations: vec![],
            media_sources: vec![],
        };
        assert_eq!(model.following_count(), 2);
        assert_eq!(model.follower_count(), 0);

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["following_count"], 2);
        assert_eq!(json["follower_count"], 0);
    }

    #[test]
    fn test_model_round_trip() {
        let model = NormalizedModel {
            owner_handle: "alice".into(),
            following: vec![],
            followers: vec![],
            posts: vec![],
            direct_messages: vec![DirectMessage {
                from_handle: "alice".into(),
                to_handle: "bob".into(),
                body: "hi ".into(),
                timestamp: "2022-01-27T15:58:52.744Z".into(),
            }],
            group_conversations: vec![GroupConversation {
                name: Some("Trip 2024".into()),
                messages: vec![],
                participants: vec!["alice".into(), "bob".into()],
            }],
            media_sources: vec![MediaSource {
                local_path: "out/1-a.jpg".into(),
                best_quality_url: "https://pbs.twimg.com/media/a.jpg:orig".into(),
            }],
        };
        let json = serde_json::to_string(&model).unwrap();
        let back: NormalizedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(model, back);
    }
}
