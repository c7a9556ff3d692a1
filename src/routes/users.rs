//! User endpoints: creation and push-token registration.

use axum::{
    extract::Path, extract::State, http::StatusCode, response::IntoResponse, routing::patch,
    routing::post, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::alerting::AlertService;
use crate::models::User;

// ---

pub fn router() -> Router<(PgPool, AlertService)> {
    // ---
    Router::new()
        .route("/users", post(create))
        .route("/users/{id}/token", patch(update_token))
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
    email: String,
}

async fn create(
    State((pool, _)): State<(PgPool, AlertService)>,
    Json(payload): Json<NewUser>,
) -> impl IntoResponse {
    // ---
    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        notification_token: None,
    };

    let result = sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .execute(&pool)
        .await;

    match result {
        Ok(_) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => {
            error!("Failed to create user: {}", e);
            (StatusCode::BAD_REQUEST, Json("Failed to create user")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenUpdate {
    token: String,
}

#[derive(Serialize)]
struct TokenUpdateResponse {
    success: bool,
}

/// Register the push token of a user's mobile device. This is the only
/// write path for tokens besides invalidation by the alert engine.
async fn update_token(
    Path(id): Path<Uuid>,
    State((_, alerts)): State<(PgPool, AlertService)>,
    Json(payload): Json<TokenUpdate>,
) -> impl IntoResponse {
    // ---
    match alerts.update_notification_token(id, &payload.token).await {
        Ok(true) => (StatusCode::OK, Json(TokenUpdateResponse { success: true })).into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json("User not found")).into_response(),
        Err(e) => {
            error!("Failed to update notification token: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to update notification token"),
            )
                .into_response()
        }
    }
}
