//! Device endpoints: creation, lookup and co-user association.
//!
//! Association is a relation of its own (`user_devices`); it never touches
//! `owner_id`, so dissociating a user can never strip ownership.

use axum::{
    extract::Path, extract::State, http::StatusCode, response::IntoResponse, routing::get,
    routing::post, Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::alerting::AlertService;
use crate::models::Device;

// ---

pub fn router() -> Router<(PgPool, AlertService)> {
    // ---
    Router::new()
        .route("/devices", post(create))
        .route("/devices/{id}", get(show))
        .route(
            "/devices/{device_id}/users/{user_id}",
            post(associate).delete(dissociate),
        )
}

#[derive(Debug, Deserialize)]
struct NewDevice {
    title: String,
    location: Option<String>,
    owner_id: Uuid,
}

async fn create(
    State((pool, _)): State<(PgPool, AlertService)>,
    Json(payload): Json<NewDevice>,
) -> impl IntoResponse {
    // ---
    let device = Device {
        id: Uuid::new_v4(),
        title: payload.title,
        location: payload.location,
        owner_id: payload.owner_id,
        connected: false,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO devices (id, title, location, owner_id, connected)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(device.id)
    .bind(&device.title)
    .bind(&device.location)
    .bind(device.owner_id)
    .bind(device.connected)
    .execute(&pool)
    .await;

    match result {
        Ok(_) => (StatusCode::CREATED, Json(device)).into_response(),
        Err(e) => {
            error!("Failed to create device: {}", e);
            (StatusCode::BAD_REQUEST, Json("Failed to create device")).into_response()
        }
    }
}

async fn show(
    Path(id): Path<Uuid>,
    State((pool, _)): State<(PgPool, AlertService)>,
) -> impl IntoResponse {
    // ---
    let result = sqlx::query_as::<_, Device>(
        "SELECT id, title, location, owner_id, connected FROM devices WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await;

    match result {
        Ok(Some(device)) => (StatusCode::OK, Json(device)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json("Device not found")).into_response(),
        Err(e) => {
            error!("Failed to fetch device: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to fetch device"),
            )
                .into_response()
        }
    }
}

/// Associate a co-user with a device. Idempotent: re-associating an
/// already associated user is a no-op.
async fn associate(
    Path((device_id, user_id)): Path<(Uuid, Uuid)>,
    State((pool, _)): State<(PgPool, AlertService)>,
) -> impl IntoResponse {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO user_devices (user_id, device_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, device_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(device_id)
    .execute(&pool)
    .await;

    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Failed to associate user: {}", e);
            (StatusCode::BAD_REQUEST, Json("Failed to associate user")).into_response()
        }
    }
}

async fn dissociate(
    Path((device_id, user_id)): Path<(Uuid, Uuid)>,
    State((pool, _)): State<(PgPool, AlertService)>,
) -> impl IntoResponse {
    // ---
    let result = sqlx::query("DELETE FROM user_devices WHERE user_id = $1 AND device_id = $2")
        .bind(user_id)
        .bind(device_id)
        .execute(&pool)
        .await;

    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Failed to dissociate user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to dissociate user"),
            )
                .into_response()
        }
    }
}
