//! User and device lookups backing the alert pipeline, plus the token
//! store.
//!
//! The token store is the single serialization point for push-token
//! mutation. Invalidation is a conditional update keyed on the exact old
//! token value, so a stale reconciliation result can never erase a token
//! the user re-registered in the meantime; concurrent invalidations from
//! overlapping reconciliation batches are commutative for the same reason.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DeviceUsers, TokenRecord};

// ---

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a device's owner and associated users. `None` if the device
    /// no longer exists (e.g. deleted between ingestion and reconciliation).
    async fn device_users(&self, device_id: Uuid) -> Result<Option<DeviceUsers>>;

    /// Current push tokens for a set of users, looked up at dispatch time.
    async fn push_tokens(&self, user_ids: &[Uuid]) -> Result<Vec<TokenRecord>>;

    /// Replace a user's push token. Returns false if the user is unknown.
    async fn update_token(&self, user_id: Uuid, token: &str) -> Result<bool>;

    /// Clear a user's push token, but only if the stored value still equals
    /// `token`. Returns true when a record was actually changed; clearing an
    /// already-null or already-different token is a no-op.
    async fn invalidate_token(&self, user_id: Uuid, token: &str) -> Result<bool>;
}

// ---

/// Postgres-backed directory used in production.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn device_users(&self, device_id: Uuid) -> Result<Option<DeviceUsers>> {
        // ---
        let owner_id: Option<Uuid> =
            sqlx::query_scalar("SELECT owner_id FROM devices WHERE id = $1")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(owner_id) = owner_id else {
            return Ok(None);
        };

        let associated_user_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM user_devices WHERE device_id = $1")
                .bind(device_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(DeviceUsers {
            device_id,
            owner_id,
            associated_user_ids,
        }))
    }

    async fn push_tokens(&self, user_ids: &[Uuid]) -> Result<Vec<TokenRecord>> {
        // ---
        let records = sqlx::query_as::<_, TokenRecord>(
            r#"
            SELECT id AS user_id, notification_token
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        // ---
        let result = sqlx::query("UPDATE users SET notification_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn invalidate_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        // ---
        // Conditional update: the WHERE clause is the race guard.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET notification_token = NULL
            WHERE id = $1 AND notification_token = $2
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
