//! Delivery receipt reconciliation.
//!
//! Accepted tickets are only half the story: the gateway resolves actual
//! delivery asynchronously, so a deferred task polls for receipts after a
//! fixed delay and turns permanent failures into token invalidations.
//! Reconciliation is best-effort: a missed batch only delays token cleanup,
//! it never corrupts state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::directory::UserDirectory;
use super::dispatch::AcceptedTicket;
use super::gateway::{DeliveryReceipt, GatewayError, PushGateway};

// ---

/// Receipt queries that fail at the transport level are retried with the
/// same ticket ids, once per delay window, up to this many attempts.
const MAX_ATTEMPTS: u32 = 3;

/// Polls the gateway for delivery receipts and applies token invalidation.
#[derive(Clone)]
pub struct Reconciler {
    // ---
    gateway: Arc<dyn PushGateway>,
    directory: Arc<dyn UserDirectory>,
    delay: Duration,
}

/// Handle for one scheduled reconciliation task. Dropping it detaches the
/// task; aborting it cancels a pending check, e.g. on shutdown.
pub struct ReconcileHandle {
    handle: JoinHandle<()>,
}

impl ReconcileHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the task to finish. Used by tests and graceful shutdown.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        directory: Arc<dyn UserDirectory>,
        delay: Duration,
    ) -> Self {
        // ---
        Self {
            gateway,
            directory,
            delay,
        }
    }

    /// Schedule a deferred receipt check for a batch of accepted tickets.
    ///
    /// The check runs after the configured delay; querying sooner is wasted
    /// work since the gateway has not processed delivery yet. The spawned
    /// task is decoupled from the ingestion request's lifetime.
    pub fn schedule(&self, tickets: Vec<AcceptedTicket>) -> Option<ReconcileHandle> {
        // ---
        if tickets.is_empty() {
            return None;
        }
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run(tickets).await });
        Some(ReconcileHandle { handle })
    }

    async fn run(self, tickets: Vec<AcceptedTicket>) {
        // ---
        for attempt in 1..=MAX_ATTEMPTS {
            tokio::time::sleep(self.delay).await;

            match self.reconcile(&tickets).await {
                Ok(receipts) => {
                    self.apply(&tickets, receipts).await;
                    return;
                }
                Err(e) => {
                    // Transport failure: same ticket ids retried on the
                    // next scheduling opportunity.
                    warn!(attempt, "receipt fetch failed, will retry: {e}");
                }
            }
        }
        warn!(
            tickets = tickets.len(),
            "giving up receipt reconciliation after {MAX_ATTEMPTS} attempts"
        );
    }

    /// Fetch receipts for the given tickets, chunked to the gateway's
    /// batch-query limit. Chunking never changes which receipts are fetched.
    pub async fn reconcile(
        &self,
        tickets: &[AcceptedTicket],
    ) -> Result<HashMap<String, DeliveryReceipt>, GatewayError> {
        // ---
        let ids: Vec<String> = tickets.iter().map(|t| t.ticket_id.clone()).collect();

        let mut receipts = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(self.gateway.receipt_batch_limit().max(1)) {
            receipts.extend(self.gateway.fetch_receipts(chunk).await?);
        }
        Ok(receipts)
    }

    async fn apply(&self, tickets: &[AcceptedTicket], receipts: HashMap<String, DeliveryReceipt>) {
        // ---
        let by_ticket: HashMap<&str, &AcceptedTicket> = tickets
            .iter()
            .map(|t| (t.ticket_id.as_str(), t))
            .collect();

        for (ticket_id, receipt) in receipts {
            let Some(ticket) = by_ticket.get(ticket_id.as_str()) else {
                // Lost ticket-to-token mapping; best-effort, drop it.
                warn!(%ticket_id, "receipt for unknown ticket, dropping");
                continue;
            };

            match receipt {
                DeliveryReceipt::Delivered => {
                    debug!(%ticket_id, user_id = %ticket.destination.user_id, "push delivered");
                }
                DeliveryReceipt::Failed { reason, message } if reason.is_permanent() => {
                    warn!(
                        %ticket_id,
                        user_id = %ticket.destination.user_id,
                        %message,
                        "destination permanently invalid"
                    );
                    self.invalidate(ticket).await;
                }
                DeliveryReceipt::Failed { reason, message } => {
                    debug!(
                        %ticket_id,
                        user_id = %ticket.destination.user_id,
                        ?reason,
                        %message,
                        "push delivery failed (transient)"
                    );
                }
            }
        }
    }

    async fn invalidate(&self, ticket: &AcceptedTicket) {
        // ---
        let dest = &ticket.destination;
        match self
            .directory
            .invalidate_token(dest.user_id, &dest.token)
            .await
        {
            Ok(true) => warn!(user_id = %dest.user_id, "invalidated dead push token"),
            Ok(false) => debug!(
                user_id = %dest.user_id,
                "push token already changed, leaving it alone"
            ),
            Err(e) => warn!(user_id = %dest.user_id, "token invalidation failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::testutil::{MemoryDirectory, MockGateway};
    use super::*;
    use crate::models::PushDestination;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn create_test_ticket(ticket_id: &str, user_id: Uuid, token: &str) -> AcceptedTicket {
        // ---
        AcceptedTicket {
            ticket_id: ticket_id.to_string(),
            destination: PushDestination {
                user_id,
                token: token.to_string(),
            },
        }
    }

    fn create_test_reconciler(
        delay: Duration,
    ) -> (Reconciler, Arc<MockGateway>, Arc<MemoryDirectory>) {
        // ---
        let gateway = Arc::new(MockGateway::default());
        let directory = Arc::new(MemoryDirectory::default());
        let reconciler = Reconciler::new(gateway.clone(), directory.clone(), delay);
        (reconciler, gateway, directory)
    }

    #[tokio::test]
    async fn test_no_fetch_before_delay_one_after() {
        // ---
        let (reconciler, gateway, _) = create_test_reconciler(Duration::from_millis(200));
        let user = Uuid::new_v4();

        let handle = reconciler
            .schedule(vec![create_test_ticket("t-1", user, "ExponentPushToken[a]")])
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gateway.fetch_count(), 0, "fetched before the delay elapsed");

        handle.wait().await;
        assert_eq!(gateway.fetch_count(), 1);
        assert_eq!(gateway.fetches.lock().unwrap()[0], vec!["t-1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_batch_schedules_nothing() {
        // ---
        let (reconciler, gateway, _) = create_test_reconciler(Duration::from_millis(1));
        assert!(reconciler.schedule(vec![]).is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gateway.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_invalidates_token() {
        // ---
        let (reconciler, gateway, directory) = create_test_reconciler(Duration::from_millis(1));
        let user = Uuid::new_v4();
        let token = "ExponentPushToken[dead]";
        directory.insert_user(user, Some(token));
        gateway.set_receipt(
            "t-1",
            DeliveryReceipt::Failed {
                reason: super::super::gateway::FailureReason::DeviceNotRegistered,
                message: "destination permanently invalid".to_string(),
            },
        );

        let handle = reconciler
            .schedule(vec![create_test_ticket("t-1", user, token)])
            .unwrap();
        handle.wait().await;

        assert_eq!(directory.token_of(user), None);
    }

    #[tokio::test]
    async fn test_stale_invalidation_spares_reregistered_token() {
        // ---
        let (reconciler, gateway, directory) = create_test_reconciler(Duration::from_millis(50));
        let user = Uuid::new_v4();
        gateway.set_receipt(
            "t-1",
            DeliveryReceipt::Failed {
                reason: super::super::gateway::FailureReason::DeviceNotRegistered,
                message: "destination permanently invalid".to_string(),
            },
        );

        // Ticket issued against the old token...
        directory.insert_user(user, Some("ExponentPushToken[old]"));
        let handle = reconciler
            .schedule(vec![create_test_ticket(
                "t-1",
                user,
                "ExponentPushToken[old]",
            )])
            .unwrap();

        // ...but the user re-registers before the receipt arrives.
        directory.insert_user(user, Some("ExponentPushToken[new]"));
        handle.wait().await;

        assert_eq!(
            directory.token_of(user).as_deref(),
            Some("ExponentPushToken[new]")
        );
    }

    #[tokio::test]
    async fn test_transport_failure_retries_same_ids() {
        // ---
        let (reconciler, gateway, _) = create_test_reconciler(Duration::from_millis(1));
        gateway.failing_fetches.store(1, Ordering::SeqCst);
        let user = Uuid::new_v4();

        let handle = reconciler
            .schedule(vec![create_test_ticket("t-9", user, "ExponentPushToken[a]")])
            .unwrap();
        handle.wait().await;

        // First attempt failed (not recorded), second succeeded with the
        // same ids.
        assert_eq!(gateway.fetch_count(), 1);
        assert_eq!(gateway.fetches.lock().unwrap()[0], vec!["t-9".to_string()]);
    }

    #[tokio::test]
    async fn test_aborted_schedule_never_fetches() {
        // ---
        let (reconciler, gateway, _) = create_test_reconciler(Duration::from_millis(100));
        let user = Uuid::new_v4();

        let handle = reconciler
            .schedule(vec![create_test_ticket("t-1", user, "ExponentPushToken[a]")])
            .unwrap();
        handle.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(gateway.fetch_count(), 0);
    }
}
