//! SQLite-backed token storage for the credential manager

use async_trait::async_trait;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_auth::{AuthError, OAuthTokens, TokenRepository, UserId};
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::sync::Arc;

pub struct SqliteTokenRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(FromRow)]
struct TokenRow {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

impl TryFrom<TokenRow> for OAuthTokens {
    type Error = AuthError;

    fn try_from(row: TokenRow) -> core_auth::Result<Self> {
        let expires_at = DateTime::<Utc>::from_timestamp_millis(row.expires_at).ok_or_else(|| {
            AuthError::Storage(format!("invalid expires_at: {}", row.expires_at))
        })?;

        Ok(OAuthTokens {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at,
        })
    }
}

fn storage_error(e: sqlx::Error) -> AuthError {
    AuthError::Storage(e.to_string())
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn load(&self, user: UserId) -> core_auth::Result<Option<OAuthTokens>> {
        let row = query_as::<_, TokenRow>(
            "SELECT access_token, refresh_token, expires_at FROM user_tokens WHERE user_id = ?",
        )
        .bind(user.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(OAuthTokens::try_from).transpose()
    }

    async fn save(&self, user: UserId, tokens: &OAuthTokens) -> core_auth::Result<()> {
        query(
            r#"
            INSERT INTO user_tokens (user_id, access_token, refresh_token, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.to_string())
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at.timestamp_millis())
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_traits::time::SystemClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_save_and_load_tokens() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteTokenRepository::new(pool, Arc::new(SystemClock));
        let user = UserId::new();

        assert!(repo.load(user).await.unwrap().is_none());

        let issued = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let tokens = OAuthTokens::issued_at("a1", "r1", 3600, issued);
        repo.save(user, &tokens).await.unwrap();
        assert_eq!(repo.load(user).await.unwrap(), Some(tokens));

        let rotated = OAuthTokens::issued_at("a2", "r1", 3600, issued);
        repo.save(user, &rotated).await.unwrap();
        assert_eq!(repo.load(user).await.unwrap().unwrap().access_token, "a2");
    }
}
