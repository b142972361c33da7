use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AuthError;

/// Identity of the user a sync runs for.
///
/// Passed explicitly through every credential, remote and sync call; there is
/// no ambient "current user".
///
/// # Examples
///
/// ```
/// use core_auth::UserId;
///
/// let user = UserId::new();
/// let parsed: UserId = user.to_string().parse().unwrap();
/// assert_eq!(user, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Create a new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| AuthError::InvalidUserId(format!("{}: {}", s, e)))
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Bearer credential handed to the remote library connector.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AccessToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// OAuth 2.0 token set persisted per user.
///
/// The `Debug` implementation redacts both tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: String,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Build a token set from a token endpoint response received at `now`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::OAuthTokens;
    /// use chrono::{Duration, Utc};
    ///
    /// let now = Utc::now();
    /// let tokens = OAuthTokens::issued_at("access", "refresh", 3600, now);
    /// assert_eq!(tokens.expires_at, now + Duration::seconds(3600));
    /// ```
    pub fn issued_at(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    pub fn access(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone())
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_id_parse() {
        let id = UserId::new();
        let parsed = UserId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);

        assert!(matches!(
            UserId::from_str("not-a-uuid"),
            Err(AuthError::InvalidUserId(_))
        ));
    }

    #[test]
    fn test_tokens_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let tokens = OAuthTokens::issued_at("a", "r", 3600, now);

        assert_eq!(tokens.expires_at, now + Duration::seconds(3600));
        assert_eq!(tokens.access().as_str(), "a");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = OAuthTokens::issued_at("BQD-secret", "AQA-secret", 60, Utc::now());
        let debug = format!("{:?} {:?}", tokens, tokens.access());

        assert!(!debug.contains("BQD-secret"));
        assert!(!debug.contains("AQA-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
