//! Simple data models for the water quality pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// Raw measurement payload submitted by an IoT device.
///
/// Devices in the field occasionally report partial readings, so every
/// dimension is optional at the ingestion boundary. Alert evaluation fails
/// closed on partial data (see `alerting::thresholds`).
#[derive(Debug, Clone, Deserialize)]
pub struct NewMeasurement {
    // ---
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub tds: Option<f64>,
}

/// Persisted measurement row served back to API clients.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Measurement {
    // ---
    pub id: Uuid,
    pub device_id: Uuid,
    pub ph: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub tds: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Persisted device row.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Device {
    // ---
    pub id: Uuid,
    pub title: String,
    pub location: Option<String>,
    pub owner_id: Uuid,
    pub connected: bool,
}

/// Persisted user row. The password/auth columns of the full product are
/// out of scope here; only the fields the notification engine needs.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct User {
    // ---
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub notification_token: Option<String>,
}

// ---

/// Ownership and association for one device, as seen by alert fan-out.
///
/// Ownership and association are distinct relations: the owner is always an
/// implicit alert recipient and is never represented (or removed) through
/// the association set.
#[derive(Debug, Clone)]
pub struct DeviceUsers {
    // ---
    pub device_id: Uuid,
    pub owner_id: Uuid,
    pub associated_user_ids: Vec<Uuid>,
}

/// A user's stored push token, possibly absent or already invalidated.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRecord {
    // ---
    pub user_id: Uuid,
    pub notification_token: Option<String>,
}

/// One deliverable (user, token) pair for a single dispatch cycle.
///
/// Destinations are resolved fresh for every reading; tokens are never
/// cached across cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDestination {
    // ---
    pub user_id: Uuid,
    pub token: String,
}
