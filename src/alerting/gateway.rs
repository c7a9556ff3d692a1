//! Push gateway client for the Expo push service.
//!
//! The gateway exposes a two-phase delivery protocol: `submit` returns a
//! synchronous ticket (accepted or rejected), and the actual delivery
//! outcome arrives later as a receipt keyed by the ticket id. Both calls can
//! fail at the transport level; transport failures are a separate error
//! class and must never be read as "the token is bad".
//!
//! [`PushGateway`] is the seam the dispatcher and reconciler depend on;
//! [`ExpoPushGateway`] is the production implementation over reqwest.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ---

/// Failure talking to the gateway itself. Always retryable; never implies
/// anything about the destination token.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("push gateway transport failure: {0}")]
    Transport(String),

    #[error("push gateway returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("push gateway returned malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// Gateway failure vocabulary, shared by ticket rejections and receipt
/// failures. Only [`FailureReason::DeviceNotRegistered`] means the token is
/// permanently dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Local static check failed; the gateway was never called.
    InvalidTokenFormat,
    /// Destination permanently invalid (app uninstalled, token revoked).
    DeviceNotRegistered,
    MessageTooBig,
    MessageRateExceeded,
    InvalidCredentials,
    Unknown,
}

impl FailureReason {
    pub fn from_gateway(code: &str) -> Self {
        // ---
        match code {
            "DeviceNotRegistered" => FailureReason::DeviceNotRegistered,
            "MessageTooBig" => FailureReason::MessageTooBig,
            "MessageRateExceeded" => FailureReason::MessageRateExceeded,
            "InvalidCredentials" => FailureReason::InvalidCredentials,
            _ => FailureReason::Unknown,
        }
    }

    /// True when the destination token will never work again and must be
    /// invalidated.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FailureReason::DeviceNotRegistered)
    }
}

/// One push message for one destination token.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    // ---
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Synchronous submission outcome for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketStatus {
    Accepted { ticket_id: String },
    Rejected { reason: FailureReason, message: String },
}

/// Immutable record of one dispatch attempt.
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    // ---
    pub token: String,
    pub status: TicketStatus,
}

/// Asynchronous delivery outcome for one accepted ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
    Delivered,
    Failed { reason: FailureReason, message: String },
}

// ---

/// Remote push gateway contract.
///
/// Implementations must be stateless and injectable; dispatcher and
/// reconciler receive the gateway explicitly instead of reaching for a
/// process-wide client.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Submit one message, returning the synchronous ticket.
    async fn submit(&self, message: &PushMessage) -> Result<TicketStatus, GatewayError>;

    /// Fetch delivery receipts for previously accepted tickets. Tickets the
    /// gateway has not resolved yet are simply absent from the map.
    async fn fetch_receipts(
        &self,
        ticket_ids: &[String],
    ) -> Result<HashMap<String, DeliveryReceipt>, GatewayError>;

    /// Maximum number of ticket ids one receipt query may carry.
    fn receipt_batch_limit(&self) -> usize;
}

/// Static token-format check against the Expo token shape. Runs client-side
/// before any network call; a malformed token is rejected locally.
pub fn is_valid_push_token(token: &str) -> bool {
    // ---
    let inner = token
        .strip_prefix("ExponentPushToken[")
        .or_else(|| token.strip_prefix("ExpoPushToken["));
    match inner {
        Some(rest) => rest.strip_suffix(']').is_some_and(|id| !id.is_empty()),
        None => false,
    }
}

// ---

/// Production gateway client over the Expo push HTTP API.
pub struct ExpoPushGateway {
    // ---
    client: reqwest::Client,
    base_url: String,
    receipt_batch_limit: usize,
}

impl ExpoPushGateway {
    /// Build a client with a bounded per-request timeout. Exceeding the
    /// timeout surfaces as [`GatewayError::Transport`].
    pub fn new(
        base_url: String,
        timeout: Duration,
        receipt_batch_limit: usize,
    ) -> Result<Self, reqwest::Error> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            receipt_batch_limit,
        })
    }

    fn parse_ticket(entry: &Value) -> Result<TicketStatus, GatewayError> {
        // ---
        match entry.get("status").and_then(Value::as_str) {
            Some("ok") => {
                let ticket_id = entry
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        GatewayError::Malformed("accepted ticket without an id".into())
                    })?
                    .to_string();
                Ok(TicketStatus::Accepted { ticket_id })
            }
            Some("error") => Ok(TicketStatus::Rejected {
                reason: error_reason(entry),
                message: error_message(entry),
            }),
            other => Err(GatewayError::Malformed(format!(
                "unexpected ticket status {other:?}"
            ))),
        }
    }

    fn parse_receipt(entry: &Value) -> Result<DeliveryReceipt, GatewayError> {
        // ---
        match entry.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(DeliveryReceipt::Delivered),
            Some("error") => Ok(DeliveryReceipt::Failed {
                reason: error_reason(entry),
                message: error_message(entry),
            }),
            other => Err(GatewayError::Malformed(format!(
                "unexpected receipt status {other:?}"
            ))),
        }
    }
}

fn error_reason(entry: &Value) -> FailureReason {
    // ---
    entry
        .get("details")
        .and_then(|d| d.get("error"))
        .and_then(Value::as_str)
        .map(FailureReason::from_gateway)
        .unwrap_or(FailureReason::Unknown)
}

fn error_message(entry: &Value) -> String {
    // ---
    entry
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unspecified gateway error")
        .to_string()
}

#[async_trait]
impl PushGateway for ExpoPushGateway {
    async fn submit(&self, message: &PushMessage) -> Result<TicketStatus, GatewayError> {
        // ---
        let url = format!("{}/--/api/v2/push/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&[message])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }

        let body: Value = response.json().await?;
        let tickets = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::Malformed("missing data array".into()))?;

        // One message in, one ticket out.
        let entry = tickets
            .first()
            .ok_or_else(|| GatewayError::Malformed("empty ticket array".into()))?;
        Self::parse_ticket(entry)
    }

    async fn fetch_receipts(
        &self,
        ticket_ids: &[String],
    ) -> Result<HashMap<String, DeliveryReceipt>, GatewayError> {
        // ---
        let url = format!("{}/--/api/v2/push/getReceipts", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "ids": ticket_ids }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }

        let body: Value = response.json().await?;
        let entries = body
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| GatewayError::Malformed("missing data object".into()))?;

        let mut receipts = HashMap::with_capacity(entries.len());
        for (ticket_id, entry) in entries {
            receipts.insert(ticket_id.clone(), Self::parse_receipt(entry)?);
        }
        Ok(receipts)
    }

    fn receipt_batch_limit(&self) -> usize {
        self.receipt_batch_limit
    }
}
