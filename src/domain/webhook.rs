use super::topup::TopupStatus;
use crate::error::TopupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gateway code used for administrator-originated confirmations.
pub const MANUAL_GATEWAY: &str = "manual";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    /// An in-progress notification; recorded but never moves the order.
    Informational,
}

impl PaymentOutcome {
    /// Maps a gateway status word onto an outcome.
    pub fn from_status(raw: &str) -> Result<PaymentOutcome, TopupError> {
        match raw.trim().to_lowercase().as_str() {
            "paid" | "succeeded" | "success" | "captured" => Ok(PaymentOutcome::Succeeded),
            "failed" | "canceled" | "cancelled" | "declined" | "rejected" => Ok(PaymentOutcome::Failed),
            "pending" | "waiting_for_capture" | "processing" => Ok(PaymentOutcome::Informational),
            other => Err(TopupError::InvalidPayload(format!("unknown payment status '{other}'"))),
        }
    }
}

/// A gateway notification reduced to the fields the engine acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_id: String,
    pub topup_id: String,
    pub outcome: PaymentOutcome,
    pub raw_status: String,
    pub external_payment_id: Option<String>,
    /// The verbatim body, kept for gateway-side investigations.
    pub payload_json: String,
}

/// De-duplication ledger entry; unique per `(gateway_code, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub gateway_code: String,
    pub event_id: String,
    pub topup_id: String,
    pub raw_status: String,
    pub outcome: PaymentOutcome,
    /// Top-up status computed when the event was processed; replays return it.
    pub resulting_status: TopupStatus,
    pub payload_json: String,
    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl WebhookEventRecord {
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.gateway_code, &self.event_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub gateway_code: String,
    pub event_id: String,
}

impl EventKey {
    pub fn new(gateway_code: &str, event_id: &str) -> Self {
        Self {
            gateway_code: gateway_code.to_string(),
            event_id: event_id.to_string(),
        }
    }

    /// Flat storage key, `gateway\0event`.
    pub fn encode(&self) -> String {
        format!("{}\u{0}{}", self.gateway_code, self.event_id)
    }
}

/// The answer returned for every successfully handled webhook, new or replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResult {
    pub topup_id: String,
    pub status: TopupStatus,
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(PaymentOutcome::from_status("Succeeded").unwrap(), PaymentOutcome::Succeeded);
        assert_eq!(PaymentOutcome::from_status("captured").unwrap(), PaymentOutcome::Succeeded);
        assert_eq!(PaymentOutcome::from_status("canceled").unwrap(), PaymentOutcome::Failed);
        assert_eq!(
            PaymentOutcome::from_status("waiting_for_capture").unwrap(),
            PaymentOutcome::Informational
        );
        assert!(matches!(
            PaymentOutcome::from_status("refunded?"),
            Err(TopupError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_event_key_encoding_separates_gateways() {
        assert_ne!(
            EventKey::new("stripe", "evt_1").encode(),
            EventKey::new("yookassa", "evt_1").encode()
        );
    }
}
