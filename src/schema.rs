//! Database schema management for `hidroflow`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `users`, `devices`, `user_devices` and `measurements` tables.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id                 UUID PRIMARY KEY,
            name               TEXT NOT NULL,
            email              TEXT NOT NULL UNIQUE,
            notification_token TEXT,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id         UUID PRIMARY KEY,
            title      TEXT NOT NULL,
            location   TEXT,
            owner_id   UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
            connected  BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Association is a separate relation from ownership
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_devices (
            user_id   UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
            device_id UUID NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
            UNIQUE (user_id, device_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Readings keep nullable dimensions: devices in the field occasionally
    // report partial data, and the row is still worth persisting.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            id          UUID PRIMARY KEY,
            device_id   UUID NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
            ph          DOUBLE PRECISION,
            turbidity   DOUBLE PRECISION,
            temperature DOUBLE PRECISION,
            tds         DOUBLE PRECISION,
            timestamp   TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_device_time
            ON measurements (device_id, timestamp DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_user_devices_device
            ON user_devices (device_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
