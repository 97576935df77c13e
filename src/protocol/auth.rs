//! OAuth token types.
//!
//! The accounts service answers both the authorization code exchange and the
//! refresh grant with a token response:
//!
//! ```json
//! {
//!     "access_token": "BQD...",
//!     "token_type": "Bearer",
//!     "scope": "user-read-currently-playing user-read-playback-state",
//!     "expires_in": 3600,
//!     "refresh_token": "AQC..."
//! }
//! ```
//!
//! A refresh response may omit `refresh_token`, in which case the previous
//! one stays valid. The token cache stores the same object plus an absolute
//! `expires_at` in epoch seconds, which keeps cache files interchangeable
//! with other tools that use this layout.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DurationSeconds, TimestampSeconds};
use veil::Redact;

/// Access and refresh token pair.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize, Redact)]
pub struct Token {
    /// Bearer token for Web API requests
    #[redact]
    pub access_token: String,

    /// Always `Bearer`
    pub token_type: String,

    /// Space separated scopes granted to the token
    #[serde(default)]
    pub scope: String,

    /// Lifetime of the access token at the time it was issued
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in: Duration,

    /// When the access token expires; absent in fresh responses
    #[serde_as(as = "Option<TimestampSeconds<i64, Flexible>>")]
    pub expires_at: Option<SystemTime>,

    /// Long lived token to obtain new access tokens with
    #[redact]
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Token {
    /// Access tokens are refreshed this long before they actually expire.
    pub const EXPIRATION_THRESHOLD: Duration = Duration::from_secs(60);

    /// Stamps a freshly received token with its absolute expiry.
    #[must_use]
    pub fn issued_at(mut self, now: SystemTime) -> Self {
        self.expires_at = now.checked_add(self.expires_in).or(Some(now));
        self
    }

    /// Carries over the refresh token of `previous` when this token has none.
    #[must_use]
    pub fn inherit_refresh_token(mut self, previous: &Token) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token.clone_from(&previous.refresh_token);
        }
        self
    }

    /// Whether the access token expires within
    /// [`EXPIRATION_THRESHOLD`](Self::EXPIRATION_THRESHOLD) of `now`.
    ///
    /// A token without known expiry is considered expired.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_none_or(|expires_at| {
            expires_at
                .duration_since(now)
                .map_or(true, |ttl| ttl <= Self::EXPIRATION_THRESHOLD)
        })
    }

    /// Whether every scope in `scopes` was granted to this token.
    #[must_use]
    pub fn has_scopes<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes
            .iter()
            .all(|wanted| self.scope.split_whitespace().any(|s| s == wanted.as_ref()))
    }
}
