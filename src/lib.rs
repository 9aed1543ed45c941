//! # Tweetpack
//!
//! A Rust library for normalizing an extracted Twitter archive export into
//! a validated in-memory model.
//!
//! ## Overview
//!
//! A Twitter archive is a tree of loosely-structured `.js` files wrapping
//! JSON arrays: posts, follow edges, and direct-message conversations, plus
//! directories of locally archived media. Tweetpack converts that tree into
//! a [`NormalizedModel`](model::NormalizedModel):
//!
//! - **Identity resolution** — opaque numeric user ids are reconciled to
//!   handles across four sources, an optional online batch lookup, and
//!   inline discoveries made while normalizing posts.
//! - **Media resolution** — posts and messages are matched to locally
//!   archived media files with a multi-level fallback search, and each
//!   resolved file is recorded with its best-quality remote URL for a
//!   possible later upgrade pass.
//! - **Post normalization** — posts are classified as original, repost, or
//!   reply; shortened links are expanded and reply headers reconstructed.
//! - **Conversation reconstruction** — pairwise and group message threads
//!   are folded out of heterogeneous event streams.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tweetpack::prelude::*;
//!
//! fn main() -> Result<()> {
//!     // Fully offline: no identity lookup.
//!     let model = tweetpack::pipeline::run(Path::new("./my-archive"), None)?;
//!     println!("{} posts by @{}", model.posts.len(), model.owner_handle);
//!     Ok(())
//! }
//! ```
//!
//! With the `lookup` feature enabled, pass a
//! [`TwitterLookup`](lookup::TwitterLookup) to enrich the identity registry
//! online; enrichment is best-effort and a failed lookup never aborts the
//! run.
//!
//! ## Module Structure
//!
//! - [`archive`] — archive layout discovery and the `.js`-wrapper reader
//! - [`model`] — the normalized value records and aggregate root
//! - [`registry`] — id-to-handle resolution ([`IdentityRegistry`](registry::IdentityRegistry))
//! - [`lookup`] — the batch lookup seam ([`UserLookup`](lookup::UserLookup))
//! - [`media`] — local media search and provenance ([`MediaResolver`](media::MediaResolver))
//! - [`post`] — post classification and rewriting ([`PostNormalizer`](post::PostNormalizer))
//! - [`dm`] — conversation reconstruction
//! - [`pipeline`] — end-to-end orchestration ([`pipeline::run`])
//! - [`error`] — unified error types ([`TweetpackError`], [`Result`])

pub mod archive;
#[cfg(feature = "cli")]
pub mod cli;
pub mod dm;
pub mod error;
pub mod lookup;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod post;
pub mod registry;

// Re-export the main types at the crate root for convenience
pub use error::{Result, TweetpackError};
pub use model::NormalizedModel;

/// Convenient re-exports for common usage.
///
/// ```rust
/// use tweetpack::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Result, TweetpackError};

    pub use crate::archive::ArchiveLayout;
    pub use crate::lookup::{LookupOutcome, LookupResult, UserLookup};
    pub use crate::media::MediaResolver;
    pub use crate::model::{
        DirectMessage, FollowEdge, GroupConversation, GroupMessage, MediaSource, NormalizedModel,
        Post, PostKind,
    };
    pub use crate::registry::{IdentityRegistry, UNKNOWN_HANDLE};

    #[cfg(feature = "lookup")]
    pub use crate::lookup::TwitterLookup;
}
