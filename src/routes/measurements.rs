//! Measurement ingestion and query endpoints.
//!
//! `POST /devices/{device_id}/measurements` is where readings enter the
//! system: the row is persisted first, then the alert pipeline runs.
//! Alerting is best-effort relative to the write; a reading is accepted and
//! persisted even if every downstream notification step fails.

use axum::{
    extract::Path, extract::Query, extract::State, http::StatusCode, response::IntoResponse,
    routing::get, routing::post, Json, Router,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

use crate::alerting::AlertService;
use crate::models::{Measurement, NewMeasurement};

// ---

pub fn router() -> Router<(PgPool, AlertService)> {
    // ---
    Router::new()
        .route(
            "/devices/{device_id}/measurements",
            post(create).get(list),
        )
        .route("/devices/{device_id}/measurements/latest", get(latest))
        .route("/devices/{device_id}/weekly-average", get(weekly_average))
}

async fn create(
    Path(device_id): Path<Uuid>,
    State((pool, alerts)): State<(PgPool, AlertService)>,
    Json(payload): Json<NewMeasurement>,
) -> impl IntoResponse {
    // ---
    match device_exists(&pool, device_id).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::NOT_FOUND, Json("Device not found")).into_response();
        }
        Err(e) => {
            error!("Device lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to store measurement"),
            )
                .into_response();
        }
    }

    let measurement = match store_measurement(&pool, device_id, &payload).await {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to store measurement: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to store measurement"),
            )
                .into_response();
        }
    };

    info!("Stored measurement {} for device {}", measurement.id, device_id);

    // The measurement write already succeeded; whatever happens inside the
    // alert pipeline stays inside it. The reconciliation handle is dropped:
    // the deferred receipt check outlives this request by design.
    alerts.on_reading_created(device_id, &payload).await;

    (StatusCode::CREATED, Json(measurement)).into_response()
}

async fn list(
    Path(device_id): Path<Uuid>,
    Query(params): Query<ListQuery>,
    State((pool, _)): State<(PgPool, AlertService)>,
) -> impl IntoResponse {
    // ---
    let limit = params.limit.unwrap_or(100).min(1000) as i64;

    let result = sqlx::query_as::<_, Measurement>(
        r#"
        SELECT id, device_id, ph, turbidity, temperature, tds, timestamp
        FROM measurements
        WHERE device_id = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(&pool)
    .await;

    match result {
        Ok(measurements) => (StatusCode::OK, Json(measurements)).into_response(),
        Err(e) => {
            error!("Failed to list measurements: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to list measurements"),
            )
                .into_response()
        }
    }
}

async fn latest(
    Path(device_id): Path<Uuid>,
    State((pool, _)): State<(PgPool, AlertService)>,
) -> impl IntoResponse {
    // ---
    let result = sqlx::query_as::<_, Measurement>(
        r#"
        SELECT id, device_id, ph, turbidity, temperature, tds, timestamp
        FROM measurements
        WHERE device_id = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(device_id)
    .fetch_optional(&pool)
    .await;

    match result {
        Ok(Some(measurement)) => (StatusCode::OK, Json(measurement)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json("No measurements for this device"),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to fetch latest measurement: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to fetch latest measurement"),
            )
                .into_response()
        }
    }
}

/// Per-day averages over the trailing seven days, zero-filled for days
/// without readings so the mobile chart always gets seven rows.
async fn weekly_average(
    Path(device_id): Path<Uuid>,
    State((pool, _)): State<(PgPool, AlertService)>,
) -> impl IntoResponse {
    // ---
    let start_date = Utc::now().date_naive() - Duration::days(6);
    let start = start_date.and_time(NaiveTime::MIN).and_utc();

    let rows = match sqlx::query_as::<_, Measurement>(
        r#"
        SELECT id, device_id, ph, turbidity, temperature, tds, timestamp
        FROM measurements
        WHERE device_id = $1 AND timestamp >= $2
        "#,
    )
    .bind(device_id)
    .bind(start)
    .fetch_all(&pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("Failed to fetch weekly measurements: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to compute weekly average"),
            )
                .into_response();
        }
    };

    (StatusCode::OK, Json(aggregate_week(start_date, &rows))).into_response()
}

// ---

async fn device_exists(pool: &PgPool, device_id: Uuid) -> Result<bool, sqlx::Error> {
    // ---
    let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM devices WHERE id = $1")
        .bind(device_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

async fn store_measurement(
    pool: &PgPool,
    device_id: Uuid,
    payload: &NewMeasurement,
) -> Result<Measurement, sqlx::Error> {
    // ---
    let measurement = Measurement {
        id: Uuid::new_v4(),
        device_id,
        ph: payload.ph,
        turbidity: payload.turbidity,
        temperature: payload.temperature,
        tds: payload.tds,
        timestamp: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO measurements (id, device_id, ph, turbidity, temperature, tds, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(measurement.id)
    .bind(measurement.device_id)
    .bind(measurement.ph)
    .bind(measurement.turbidity)
    .bind(measurement.temperature)
    .bind(measurement.tds)
    .bind(measurement.timestamp)
    .execute(pool)
    .await?;

    Ok(measurement)
}

/// Query parameters for listing measurements
#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

/// One row of the weekly-average response.
#[derive(Debug, Serialize, PartialEq)]
struct DailyAverage {
    // ---
    day: String,
    date: NaiveDate,
    ph: f64,
    turbidity: f64,
    temperature: f64,
    tds: f64,
}

fn aggregate_week(start_date: NaiveDate, rows: &[Measurement]) -> Vec<DailyAverage> {
    // ---
    struct Sums {
        ph: f64,
        turbidity: f64,
        temperature: f64,
        tds: f64,
        count: u32,
    }

    let mut daily: HashMap<NaiveDate, Sums> = HashMap::new();
    for row in rows {
        let entry = daily.entry(row.timestamp.date_naive()).or_insert(Sums {
            ph: 0.0,
            turbidity: 0.0,
            temperature: 0.0,
            tds: 0.0,
            count: 0,
        });
        entry.ph += row.ph.unwrap_or_default();
        entry.turbidity += row.turbidity.unwrap_or_default();
        entry.temperature += row.temperature.unwrap_or_default();
        entry.tds += row.tds.unwrap_or_default();
        entry.count += 1;
    }

    (0..7)
        .map(|i| {
            let date = start_date + Duration::days(i);
            let sums = daily.get(&date);
            let avg = |total: f64| match sums {
                Some(s) if s.count > 0 => total / s.count as f64,
                _ => 0.0,
            };
            DailyAverage {
                day: date.weekday().to_string(),
                date,
                ph: avg(sums.map_or(0.0, |s| s.ph)),
                turbidity: avg(sums.map_or(0.0, |s| s.turbidity)),
                temperature: avg(sums.map_or(0.0, |s| s.temperature)),
                tds: avg(sums.map_or(0.0, |s| s.tds)),
            }
        })
        .collect()
}
