//! In-memory gateway and directory doubles shared by the alerting tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::directory::UserDirectory;
use super::gateway::{
    DeliveryReceipt, GatewayError, PushGateway, PushMessage, TicketStatus,
};
use crate::models::{DeviceUsers, TokenRecord};

// ---

/// Scripted push gateway. Records every submit and receipt fetch; tickets
/// are accepted with generated ids unless a rejection is scripted for the
/// token, and receipts default to `Delivered` unless scripted otherwise.
#[derive(Default)]
pub struct MockGateway {
    // ---
    pub submits: Mutex<Vec<PushMessage>>,
    pub fetches: Mutex<Vec<Vec<String>>>,
    pub rejections: Mutex<HashMap<String, TicketStatus>>,
    pub receipts: Mutex<HashMap<String, DeliveryReceipt>>,
    /// Number of upcoming receipt fetches to fail with a transport error.
    pub failing_fetches: AtomicUsize,
    ticket_seq: AtomicUsize,
}

impl MockGateway {
    pub fn reject_token(&self, token: &str, status: TicketStatus) {
        // ---
        self.rejections
            .lock()
            .unwrap()
            .insert(token.to_string(), status);
    }

    pub fn set_receipt(&self, ticket_id: &str, receipt: DeliveryReceipt) {
        // ---
        self.receipts
            .lock()
            .unwrap()
            .insert(ticket_id.to_string(), receipt);
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl PushGateway for MockGateway {
    async fn submit(&self, message: &PushMessage) -> Result<TicketStatus, GatewayError> {
        // ---
        self.submits.lock().unwrap().push(message.clone());

        if let Some(status) = self.rejections.lock().unwrap().get(&message.to) {
            return Ok(status.clone());
        }
        let n = self.ticket_seq.fetch_add(1, Ordering::SeqCst);
        Ok(TicketStatus::Accepted {
            ticket_id: format!("ticket-{n}"),
        })
    }

    async fn fetch_receipts(
        &self,
        ticket_ids: &[String],
    ) -> Result<HashMap<String, DeliveryReceipt>, GatewayError> {
        // ---
        if self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Transport("scripted failure".to_string()));
        }

        self.fetches.lock().unwrap().push(ticket_ids.to_vec());

        let scripted = self.receipts.lock().unwrap();
        Ok(ticket_ids
            .iter()
            .map(|id| {
                let receipt = scripted.get(id).cloned().unwrap_or(DeliveryReceipt::Delivered);
                (id.clone(), receipt)
            })
            .collect())
    }

    fn receipt_batch_limit(&self) -> usize {
        300
    }
}

// ---

/// In-memory directory with the same conditional-invalidation contract as
/// the Postgres implementation.
#[derive(Default)]
pub struct MemoryDirectory {
    // ---
    pub devices: Mutex<HashMap<Uuid, DeviceUsers>>,
    pub tokens: Mutex<HashMap<Uuid, Option<String>>>,
}

impl MemoryDirectory {
    pub fn insert_device(&self, device: DeviceUsers) {
        self.devices.lock().unwrap().insert(device.device_id, device);
    }

    pub fn insert_user(&self, user_id: Uuid, token: Option<&str>) {
        // ---
        self.tokens
            .lock()
            .unwrap()
            .insert(user_id, token.map(str::to_string));
    }

    pub fn token_of(&self, user_id: Uuid) -> Option<String> {
        self.tokens.lock().unwrap().get(&user_id).cloned().flatten()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn device_users(&self, device_id: Uuid) -> Result<Option<DeviceUsers>> {
        Ok(self.devices.lock().unwrap().get(&device_id).cloned())
    }

    async fn push_tokens(&self, user_ids: &[Uuid]) -> Result<Vec<TokenRecord>> {
        // ---
        let tokens = self.tokens.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| {
                tokens.get(id).map(|token| TokenRecord {
                    user_id: *id,
                    notification_token: token.clone(),
                })
            })
            .collect())
    }

    async fn update_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        // ---
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get_mut(&user_id) {
            Some(slot) => {
                *slot = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        // ---
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get_mut(&user_id) {
            Some(slot) if slot.as_deref() == Some(token) => {
                *slot = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
