//! Conversation reconstruction for pairwise and group direct messages.
//!
//! Both sources share the `{"dmConversation": {...}}` record shape, but
//! their event streams differ: pairwise conversations only carry
//! message-create events, while group conversations interleave messages
//! with membership and naming events. The group stream is folded
//! left-to-right into an accumulator; participant ids keep the order they
//! were first seen and are resolved to handles only after the fold
//! completes.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::media::MediaResolver;
use crate::model::{DirectMessage, GroupConversation, GroupMessage};
use crate::post::normalize_whitespace;
use crate::registry::IdentityRegistry;

/// One record in `direct-messages.js` / `direct-messages-group.js`.
#[derive(Debug, Deserialize)]
pub struct ConversationRecord {
    #[serde(rename = "dmConversation")]
    pub conversation: Option<DmConversation>,
}

#[derive(Debug, Deserialize)]
pub struct DmConversation {
    #[serde(rename = "conversationId")]
    pub id: Option<String>,
    #[serde(default)]
    pub messages: Vec<EventRecord>,
}

/// One event in a conversation's stream, keyed by its single field name.
///
/// Event kinds this crate does not consume (reactions, leaves) simply
/// deserialize with every field `None` and fold to nothing.
#[derive(Debug, Default, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "messageCreate")]
    pub message_create: Option<MessageCreate>,
    #[serde(rename = "joinConversation")]
    pub join_conversation: Option<JoinConversation>,
    #[serde(rename = "participantsJoin")]
    pub participants_join: Option<ParticipantsJoin>,
    #[serde(rename = "conversationNameUpdate")]
    pub name_update: Option<NameUpdate>,
}

impl EventRecord {
    /// The tagged event this record carries, if it is one we consume.
    pub fn event(&self) -> Option<ConversationEvent<'_>> {
        if let Some(message) = &self.message_create {
            Some(ConversationEvent::MessageCreate(message))
        } else if let Some(join) = &self.join_conversation {
            Some(ConversationEvent::JoinConversation(join))
        } else if let Some(join) = &self.participants_join {
            Some(ConversationEvent::ParticipantsJoin(join))
        } else if let Some(update) = &self.name_update {
            Some(ConversationEvent::NameUpdate(update))
        } else {
            None
        }
    }
}

/// Tagged view over an [`EventRecord`], the unit the group fold consumes.
#[derive(Debug)]
pub enum ConversationEvent<'a> {
    MessageCreate(&'a MessageCreate),
    JoinConversation(&'a JoinConversation),
    ParticipantsJoin(&'a ParticipantsJoin),
    NameUpdate(&'a NameUpdate),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreate {
    pub id: Option<String>,
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub urls: Vec<DmUrl>,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DmUrl {
    pub url: Option<String>,
    pub expanded: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinConversation {
    pub initiating_user_id: Option<String>,
    #[serde(default)]
    pub participants_snapshot: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsJoin {
    pub initiating_user_id: Option<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameUpdate {
    pub name: Option<String>,
}

/// Ids contributed to the participant set by one event stream, in the
/// order they are first seen.
pub fn participant_ids(events: &[EventRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut add = |id: &str| {
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    };
    for record in events {
        match record.event() {
            Some(ConversationEvent::MessageCreate(message)) => {
                if let Some(sender) = message.sender_id.as_deref() {
                    add(sender);
                }
            }
            Some(ConversationEvent::JoinConversation(join)) => {
                if let Some(initiator) = join.initiating_user_id.as_deref() {
                    add(initiator);
                }
                for id in &join.participants_snapshot {
                    add(id);
                }
            }
            Some(ConversationEvent::ParticipantsJoin(join)) => {
                if let Some(initiator) = join.initiating_user_id.as_deref() {
                    add(initiator);
                }
                for id in &join.user_ids {
                    add(id);
                }
            }
            _ => {}
        }
    }
    ids
}

/// Folds conversation event streams into ordered message records.
pub struct ConversationReconstructor<'a> {
    resolver: &'a MediaResolver,
}

impl<'a> ConversationReconstructor<'a> {
    pub fn new(resolver: &'a MediaResolver) -> Self {
        Self { resolver }
    }

    /// Reconstructs two-party conversations into a flat message list.
    ///
    /// Only message-create events carrying sender, recipient, text and
    /// timestamp are kept; unresolved participant ids fall back to the
    /// profile-URL form.
    pub fn pairwise(
        &self,
        records: &[ConversationRecord],
        media_root: &Path,
        registry: &IdentityRegistry,
    ) -> Vec<DirectMessage> {
        let mut messages = Vec::new();
        for conversation in records.iter().filter_map(|r| r.conversation.as_ref()) {
            if conversation.id.is_none() {
                continue;
            }
            for record in &conversation.messages {
                let Some(ConversationEvent::MessageCreate(message)) = record.event() else {
                    continue;
                };
                let (Some(from_id), Some(to_id), Some(text), Some(created_at)) = (
                    message.sender_id.as_deref(),
                    message.recipient_id.as_deref(),
                    message.text.as_deref(),
                    message.created_at.as_deref(),
                ) else {
                    continue;
                };
                let body = self.rewrite_body(message, text, media_root);
                messages.push(DirectMessage {
                    from_handle: registry.handle_or_profile_url(from_id),
                    to_handle: registry.handle_or_profile_url(to_id),
                    body,
                    timestamp: created_at.to_string(),
                });
            }
        }
        messages
    }

    /// Folds group conversation event streams into [`GroupConversation`]s.
    pub fn groups(
        &self,
        records: &[ConversationRecord],
        media_root: &Path,
        registry: &IdentityRegistry,
    ) -> Vec<GroupConversation> {
        let mut conversations = Vec::new();
        for conversation in records.iter().filter_map(|r| r.conversation.as_ref()) {
            if conversation.id.is_none() {
                continue;
            }
            conversations.push(self.fold_group(conversation, media_root, registry));
        }
        conversations
    }

    fn fold_group(
        &self,
        conversation: &DmConversation,
        media_root: &Path,
        registry: &IdentityRegistry,
    ) -> GroupConversation {
        let mut name = None;
        let mut messages = Vec::new();

        for record in &conversation.messages {
            match record.event() {
                Some(ConversationEvent::MessageCreate(message)) => {
                    let (Some(from_id), Some(text), Some(created_at)) = (
                        message.sender_id.as_deref(),
                        message.text.as_deref(),
                        message.created_at.as_deref(),
                    ) else {
                        continue;
                    };
                    let body = self.rewrite_body(message, text, media_root);
                    messages.push(GroupMessage {
                        from_handle: registry.handle_or_profile_url(from_id),
                        body,
                        timestamp: created_at.to_string(),
                    });
                }
                // Later name updates unconditionally overwrite earlier ones.
                Some(ConversationEvent::NameUpdate(update)) => {
                    if let Some(new_name) = update.name.clone() {
                        name = Some(new_name);
                    }
                }
                // Membership events only contribute participant ids,
                // which are collected below.
                _ => {}
            }
        }

        // Handles are resolved only after the full fold, preserving the
        // order ids were first seen.
        let participants = participant_ids(&conversation.messages)
            .iter()
            .map(|id| registry.handle_or_profile_url(id))
            .collect();

        GroupConversation {
            name,
            messages,
            participants,
        }
    }

    /// Applies link expansion, whitespace normalization, and media
    /// substitution to one message body, mirroring the post pipeline.
    fn rewrite_body(&self, message: &MessageCreate, text: &str, media_root: &Path) -> String {
        let mut body = text.to_string();
        for link in &message.urls {
            if let (Some(short), Some(expanded)) = (link.url.as_deref(), link.expanded.as_deref()) {
                body = body.replace(short, expanded);
            }
        }
        let mut body = normalize_whitespace(&body);

        // One attached media item: its markup replaces the expanded URL.
        if message.media_urls.len() == 1 && !message.urls.is_empty() {
            if let (Some(expanded), Some(message_id)) = (
                message.urls.first().and_then(|u| u.expanded.as_deref()),
                message.id.as_deref(),
            ) {
                if let Some(markup) =
                    self.resolver
                        .resolve_dm(message_id, &message.media_urls[0], media_root)
                {
                    body = body.replace(expanded, &markup);
                }
            }
        }
        body
    }
}
