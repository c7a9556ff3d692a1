//! Alert pipeline orchestration.
//!
//! Glues the pure pieces together for one reading: evaluate against the
//! potability bounds, resolve recipients, dispatch concurrently, then hand
//! the accepted tickets to the receipt reconciler. Everything in here is
//! best-effort from the CRUD layer's perspective: a failure anywhere in the
//! pipeline is logged and swallowed, never surfaced to the reading-creation
//! response.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::destinations;
use super::directory::UserDirectory;
use super::dispatch::{self, AlertPayload};
use super::gateway::PushGateway;
use super::reconcile::{ReconcileHandle, Reconciler};
use super::thresholds;
use crate::models::{NewMeasurement, PushDestination};

// ---

/// Entry point the CRUD layer calls into. Cheap to clone; all inner state
/// is shared.
#[derive(Clone)]
pub struct AlertService {
    // ---
    gateway: Arc<dyn PushGateway>,
    directory: Arc<dyn UserDirectory>,
    reconciler: Reconciler,
}

impl AlertService {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        directory: Arc<dyn UserDirectory>,
        receipt_delay: Duration,
    ) -> Self {
        // ---
        let reconciler = Reconciler::new(gateway.clone(), directory.clone(), receipt_delay);
        Self {
            gateway,
            directory,
            reconciler,
        }
    }

    /// Run the alert pipeline for a newly persisted reading.
    ///
    /// Dispatch happens within this call; receipt reconciliation is deferred
    /// to a spawned task so the caller never blocks on the receipt delay.
    /// Returns the handle of the scheduled reconciliation, if any, so
    /// shutdown paths and tests can await or abort it; callers on the
    /// ingestion path simply drop it.
    pub async fn on_reading_created(
        &self,
        device_id: Uuid,
        reading: &NewMeasurement,
    ) -> Option<ReconcileHandle> {
        // ---
        let set = match thresholds::evaluate(reading) {
            Ok(set) => set,
            Err(e) => {
                // Fail closed on partial data: no alert, no gateway call.
                warn!(%device_id, "{e}; skipping alert evaluation");
                return None;
            }
        };
        if set.is_empty() {
            debug!(%device_id, "reading within bounds, no alert");
            return None;
        }

        let device = match self.directory.device_users(device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                warn!(%device_id, "device vanished before alert dispatch");
                return None;
            }
            Err(e) => {
                error!(%device_id, "device lookup failed: {e}");
                return None;
            }
        };

        let recipients = destinations::resolve(&device);
        let records = match self.directory.push_tokens(&recipients).await {
            Ok(records) => records,
            Err(e) => {
                error!(%device_id, "push token lookup failed: {e}");
                return None;
            }
        };

        let targets: Vec<PushDestination> = records
            .into_iter()
            .filter_map(|r| {
                r.notification_token.map(|token| PushDestination {
                    user_id: r.user_id,
                    token,
                })
            })
            .collect();
        if targets.is_empty() {
            debug!(%device_id, "no registered push tokens for alert recipients");
            return None;
        }

        info!(
            device_id = %device.device_id,
            conditions = set.conditions.len(),
            destinations = targets.len(),
            "dispatching water quality alert"
        );

        let alert = AlertPayload::water_alert(&set);
        let accepted = dispatch::dispatch_all(
            self.gateway.as_ref(),
            self.directory.as_ref(),
            &alert,
            &targets,
        )
        .await;

        self.reconciler.schedule(accepted)
    }

    /// Store a freshly registered push token for a user.
    pub async fn update_notification_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        // ---
        self.directory.update_token(user_id, token).await
    }
}
