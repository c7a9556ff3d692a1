//! Push dispatch: one alert, fanned out to every resolved destination.

use futures::future::join_all;
use serde_json::json;
use tracing::{debug, error, warn};

use super::directory::UserDirectory;
use super::gateway::{
    is_valid_push_token, DispatchTicket, FailureReason, GatewayError, PushGateway, PushMessage,
    TicketStatus,
};
use super::thresholds::AlertSet;
use crate::models::PushDestination;

// ---

/// Notification title shown by the mobile app.
pub const ALERT_TITLE: &str = "⚠️ Alerta de Qualidade da Água";

/// Rendered alert content, independent of any particular destination.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    // ---
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl AlertPayload {
    /// Build the notification for one evaluated reading: joined condition
    /// text plus a structured payload with the raw measured values, so the
    /// client can render rich UI without re-deriving the violation.
    pub fn water_alert(set: &AlertSet) -> Self {
        // ---
        Self {
            title: ALERT_TITLE.to_string(),
            body: set.body(),
            data: json!({
                "type": "water_alert",
                "values": set.values,
            }),
        }
    }

    fn message_for(&self, token: &str) -> PushMessage {
        // ---
        PushMessage {
            to: token.to_string(),
            sound: "default",
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

/// An accepted ticket waiting for its delivery receipt, together with the
/// destination it was issued for. The reconciler needs this mapping to turn
/// a failed receipt back into a token invalidation.
#[derive(Debug, Clone)]
pub struct AcceptedTicket {
    // ---
    pub ticket_id: String,
    pub destination: PushDestination,
}

// ---

/// Dispatch one alert to one destination.
///
/// A malformed token is rejected locally; the gateway is never called with
/// it. A transport error is returned as `Err` and is the caller's retry
/// concern; it never implies the token is bad. A synchronous rejection with
/// a permanent reason invalidates the token immediately instead of waiting
/// for reconciliation.
pub async fn dispatch(
    gateway: &dyn PushGateway,
    directory: &dyn UserDirectory,
    alert: &AlertPayload,
    destination: &PushDestination,
) -> Result<DispatchTicket, GatewayError> {
    // ---
    if !is_valid_push_token(&destination.token) {
        debug!(
            user_id = %destination.user_id,
            "skipping destination with malformed push token"
        );
        return Ok(DispatchTicket {
            token: destination.token.clone(),
            status: TicketStatus::Rejected {
                reason: FailureReason::InvalidTokenFormat,
                message: "invalid token format".to_string(),
            },
        });
    }

    let status = gateway.submit(&alert.message_for(&destination.token)).await?;

    if let TicketStatus::Rejected { reason, message } = &status {
        warn!(
            user_id = %destination.user_id,
            ?reason,
            %message,
            "push gateway rejected message"
        );
        if reason.is_permanent() {
            invalidate(directory, destination).await;
        }
    }

    Ok(DispatchTicket {
        token: destination.token.clone(),
        status,
    })
}

/// Dispatch one alert to every destination concurrently.
///
/// Failure domains are isolated per destination: a transport error or
/// rejection for one destination never aborts the others. Returns the
/// accepted tickets that need receipt reconciliation.
pub async fn dispatch_all(
    gateway: &dyn PushGateway,
    directory: &dyn UserDirectory,
    alert: &AlertPayload,
    destinations: &[PushDestination],
) -> Vec<AcceptedTicket> {
    // ---
    let outcomes = join_all(
        destinations
            .iter()
            .map(|dest| dispatch(gateway, directory, alert, dest)),
    )
    .await;

    let mut accepted = Vec::new();
    for (destination, outcome) in destinations.iter().zip(outcomes) {
        match outcome {
            Ok(ticket) => match ticket.status {
                TicketStatus::Accepted { ticket_id } => {
                    accepted.push(AcceptedTicket {
                        ticket_id,
                        destination: destination.clone(),
                    });
                }
                TicketStatus::Rejected { .. } => {
                    debug!(token = %ticket.token, "rejected ticket, nothing to reconcile");
                }
            },
            Err(e) => {
                // Transport failure: retried on the ingestion path's normal
                // cadence, never treated as a dead token.
                error!(user_id = %destination.user_id, "push dispatch failed: {e}");
            }
        }
    }
    accepted
}

async fn invalidate(directory: &dyn UserDirectory, destination: &PushDestination) {
    // ---
    match directory
        .invalidate_token(destination.user_id, &destination.token)
        .await
    {
        Ok(true) => {
            warn!(user_id = %destination.user_id, "invalidated dead push token");
        }
        Ok(false) => {
            debug!(
                user_id = %destination.user_id,
                "push token already changed, leaving it alone"
            );
        }
        Err(e) => {
            error!(user_id = %destination.user_id, "token invalidation failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::testutil::{MemoryDirectory, MockGateway};
    use super::super::thresholds;
    use super::*;
    use crate::models::NewMeasurement;
    use uuid::Uuid;

    fn create_test_alert() -> AlertPayload {
        // ---
        let reading = NewMeasurement {
            ph: Some(5.0),
            turbidity: Some(2.0),
            temperature: Some(22.0),
            tds: Some(100.0),
        };
        AlertPayload::water_alert(&thresholds::evaluate(&reading).unwrap())
    }

    fn create_test_destination(token: &str) -> PushDestination {
        // ---
        PushDestination {
            user_id: Uuid::new_v4(),
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_malformed_token_rejected_without_gateway_call() {
        // ---
        let gateway = MockGateway::default();
        let directory = MemoryDirectory::default();
        let dest = create_test_destination("not-a-push-token");

        let ticket = dispatch(&gateway, &directory, &create_test_alert(), &dest)
            .await
            .unwrap();

        match ticket.status {
            TicketStatus::Rejected { reason, .. } => {
                assert_eq!(reason, FailureReason::InvalidTokenFormat);
            }
            other => panic!("expected local rejection, got {other:?}"),
        }
        assert_eq!(gateway.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_accepted_ticket_carries_gateway_id() {
        // ---
        let gateway = MockGateway::default();
        let directory = MemoryDirectory::default();
        let dest = create_test_destination("ExponentPushToken[alive]");

        let ticket = dispatch(&gateway, &directory, &create_test_alert(), &dest)
            .await
            .unwrap();

        assert!(matches!(ticket.status, TicketStatus::Accepted { .. }));
        assert_eq!(gateway.submit_count(), 1);

        let sent = gateway.submits.lock().unwrap();
        assert_eq!(sent[0].to, "ExponentPushToken[alive]");
        assert_eq!(sent[0].title, ALERT_TITLE);
        assert_eq!(sent[0].body, "pH baixo (5.0 < 6.5)");
        assert_eq!(sent[0].data["type"], "water_alert");
        assert_eq!(sent[0].data["values"]["ph"], 5.0);
    }

    #[tokio::test]
    async fn test_synchronous_permanent_rejection_invalidates_immediately() {
        // ---
        let gateway = MockGateway::default();
        let directory = MemoryDirectory::default();
        let dest = create_test_destination("ExponentPushToken[dead]");
        directory.insert_user(dest.user_id, Some(&dest.token));
        gateway.reject_token(
            &dest.token,
            TicketStatus::Rejected {
                reason: FailureReason::DeviceNotRegistered,
                message: "not registered".to_string(),
            },
        );

        dispatch(&gateway, &directory, &create_test_alert(), &dest)
            .await
            .unwrap();

        assert_eq!(directory.token_of(dest.user_id), None);
    }

    #[tokio::test]
    async fn test_dispatch_isolation_across_destinations() {
        // ---
        let gateway = MockGateway::default();
        let directory = MemoryDirectory::default();
        let destinations = vec![
            create_test_destination("ExponentPushToken[one]"),
            create_test_destination("malformed"),
            create_test_destination("ExponentPushToken[three]"),
        ];

        let accepted =
            dispatch_all(&gateway, &directory, &create_test_alert(), &destinations).await;

        // Destinations 1 and 3 still got tickets; only they are pending
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].destination.token, "ExponentPushToken[one]");
        assert_eq!(accepted[1].destination.token, "ExponentPushToken[three]");
        assert_eq!(gateway.submit_count(), 2);
    }
}
