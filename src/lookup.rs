//! Batch user-handle lookup against the online service.
//!
//! Enrichment is strictly best-effort: no failure here may abort the run.
//! The pipeline inspects the typed [`LookupOutcome`] to tell "everything
//! resolved" from "lookup truncated" from "service unreachable" without
//! parsing logs, and then continues either way with whatever resolved.
//!
//! Two HTTP calls are involved: a POST to obtain a short-lived guest
//! credential, then one GET per batch of at most [`MAX_BATCH`] ids. Both
//! carry a 2 second timeout and no retry; a failed batch truncates the
//! remaining ones.

use serde::Deserialize;

/// Maximum number of ids the lookup endpoint accepts per request.
pub const MAX_BATCH: usize = 100;

/// Guest credential endpoint.
pub const GUEST_TOKEN_ENDPOINT: &str = "https://api.twitter.com/1.1/guest/activate.json";
/// Batch user metadata endpoint; ids are passed comma-joined in `user_id`.
pub const USER_LOOKUP_ENDPOINT: &str = "https://api.twitter.com/1.1/users/lookup.json";

/// An id/handle pair returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub id: String,
    pub handle: String,
}

/// How far enrichment got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Every batch succeeded. Individual ids may still be unresolved when
    /// the service returned a null handle for them.
    Complete,
    /// A batch failed; `remaining` ids were never requested.
    Partial { remaining: usize },
    /// No guest credential could be obtained; nothing was requested.
    Unavailable,
}

/// Result of one enrichment run: whatever resolved, plus how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub users: Vec<ResolvedUser>,
    pub outcome: LookupOutcome,
}

impl LookupResult {
    /// An empty, successful result; used when there is nothing to look up.
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            outcome: LookupOutcome::Complete,
        }
    }
}

/// Seam for the identity lookup service.
///
/// The pipeline only depends on this trait; tests substitute a stub and the
/// CLI can skip enrichment entirely by passing no implementation.
pub trait UserLookup {
    /// Resolves `ids` to handles, best-effort. Must not fail: transport
    /// errors are reported through [`LookupOutcome`], not `Result`.
    fn resolve_handles(&self, ids: &[String]) -> LookupResult;
}

#[derive(Debug, Deserialize)]
struct GuestTokenResponse {
    guest_token: Option<String>,
}

/// One record of the lookup response array. Records whose handle is null
/// are dropped, leaving those ids unresolved.
#[derive(Debug, Deserialize)]
struct UserRecord {
    id_str: Option<String>,
    screen_name: Option<String>,
}

#[cfg(feature = "lookup")]
pub use client::TwitterLookup;

#[cfg(feature = "lookup")]
mod client {
    use std::time::Duration;

    use reqwest::blocking::Client;
    use tracing::{error, info};

    use super::{
        GUEST_TOKEN_ENDPOINT, GuestTokenResponse, LookupOutcome, LookupResult, MAX_BATCH,
        ResolvedUser, USER_LOOKUP_ENDPOINT, UserLookup, UserRecord,
    };
    use crate::error::Result;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

    /// Blocking HTTP client for the identity lookup service.
    pub struct TwitterLookup {
        client: Client,
        bearer_token: String,
    }

    impl TwitterLookup {
        /// Creates a client with the per-request timeout applied.
        pub fn new(bearer_token: impl Into<String>) -> Result<Self> {
            let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
            Ok(Self {
                client,
                bearer_token: bearer_token.into(),
            })
        }

        /// Obtains a short-lived anonymous session credential.
        fn guest_token(&self) -> reqwest::Result<Option<String>> {
            let response: GuestTokenResponse = self
                .client
                .post(GUEST_TOKEN_ENDPOINT)
                .header("authorization", format!("Bearer {}", self.bearer_token))
                .send()?
                .error_for_status()?
                .json()?;
            Ok(response.guest_token.filter(|t| !t.is_empty()))
        }

        fn fetch_batch(
            &self,
            guest_token: &str,
            batch: &[String],
        ) -> reqwest::Result<Vec<ResolvedUser>> {
            let records: Vec<UserRecord> = self
                .client
                .get(USER_LOOKUP_ENDPOINT)
                .query(&[("user_id", batch.join(","))])
                .header("authorization", format!("Bearer {}", self.bearer_token))
                .header("x-guest-token", guest_token)
                .send()?
                .error_for_status()?
                .json()?;

            Ok(records
                .into_iter()
                .filter_map(|record| match (record.id_str, record.screen_name) {
                    (Some(id), Some(handle)) => Some(ResolvedUser { id, handle }),
                    _ => None,
                })
                .collect())
        }
    }

    impl UserLookup for TwitterLookup {
        fn resolve_handles(&self, ids: &[String]) -> LookupResult {
            if ids.is_empty() {
                // Don't bother opening a session if there's nothing to get.
                return LookupResult::empty();
            }

            let guest_token = match self.guest_token() {
                Ok(Some(token)) => token,
                Ok(None) => {
                    error!("failed to retrieve guest token: empty response");
                    return LookupResult {
                        users: Vec::new(),
                        outcome: LookupOutcome::Unavailable,
                    };
                }
                Err(err) => {
                    error!("failed to retrieve guest token: {err}");
                    return LookupResult {
                        users: Vec::new(),
                        outcome: LookupOutcome::Unavailable,
                    };
                }
            };

            let mut users = Vec::new();
            let mut requested = 0;
            for batch in ids.chunks(MAX_BATCH) {
                match self.fetch_batch(&guest_token, batch) {
                    Ok(batch_users) => {
                        requested += batch.len();
                        users.extend(batch_users);
                    }
                    Err(err) => {
                        error!("failed to download user data: {err}");
                        return LookupResult {
                            users,
                            outcome: LookupOutcome::Partial {
                                remaining: ids.len() - requested,
                            },
                        };
                    }
                }
            }
            info!("resolved {} of {} requested user IDs", users.len(), ids.len());
            LookupResult {
                users,
                outcome: LookupOutcome::Complete,
            }
        }
    }
}
