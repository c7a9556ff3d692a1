use axum::Router;
use sqlx::PgPool;

use crate::alerting::AlertService;

mod devices;
mod health;
mod measurements;
mod users;

// ---

pub fn router(pool: PgPool, alerts: AlertService) -> Router {
    // ---
    Router::new()
        .merge(devices::router())
        .merge(measurements::router())
        .merge(users::router())
        .merge(health::router())
        .with_state((pool, alerts))
}
