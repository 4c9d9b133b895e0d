//! Gateway adapters.
//!
//! Real gateways are reached through a generic JSON contract: the inbound body
//! carries `{eventId, topupId, status, externalPaymentId, payload}` and checkout
//! is a redirect to the gateway's hosted page.

use crate::domain::config::normalize_gateway_code;
use crate::domain::ports::{Checkout, GatewayAdapter};
use crate::domain::topup::Topup;
use crate::domain::webhook::{MANUAL_GATEWAY, NormalizedEvent, PaymentOutcome};
use crate::error::{Result, TopupError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody {
    #[serde(default, alias = "event_id")]
    event_id: String,
    #[serde(default, alias = "topup_id")]
    topup_id: String,
    #[serde(default)]
    status: String,
    #[serde(default, alias = "external_payment_id")]
    external_payment_id: Option<String>,
}

fn parse_body(payload: &[u8], generate_event_id: bool) -> Result<NormalizedEvent> {
    let body: WebhookBody = serde_json::from_slice(payload)
        .map_err(|e| TopupError::InvalidPayload(format!("malformed body: {e}")))?;

    let mut event_id = body.event_id.trim().to_string();
    if event_id.is_empty() {
        if !generate_event_id {
            return Err(TopupError::InvalidPayload("missing eventId".into()));
        }
        event_id = Uuid::new_v4().to_string();
    }
    let topup_id = body.topup_id.trim().to_string();
    if topup_id.is_empty() {
        return Err(TopupError::InvalidPayload("missing topupId".into()));
    }
    let raw_status = body.status.trim().to_lowercase();
    let outcome = PaymentOutcome::from_status(&raw_status)?;

    Ok(NormalizedEvent {
        event_id,
        topup_id,
        outcome,
        raw_status,
        external_payment_id: body
            .external_payment_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        payload_json: String::from_utf8_lossy(payload).into_owned(),
    })
}

/// A hosted-checkout gateway speaking the generic JSON webhook contract.
pub struct JsonWebhookAdapter {
    code: String,
    checkout_base_url: String,
}

impl JsonWebhookAdapter {
    pub fn new(code: &str, checkout_base_url: &str) -> Self {
        Self {
            code: normalize_gateway_code(code),
            checkout_base_url: checkout_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GatewayAdapter for JsonWebhookAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    async fn build_checkout(&self, topup: &Topup) -> Result<Checkout> {
        let mut client_params = Map::new();
        client_params.insert("topupId".into(), json!(topup.topup_id));
        client_params.insert(
            "amount".into(),
            json!(topup.pricing.total_pay_amount.to_string()),
        );
        client_params.insert("currency".into(), json!(topup.pricing.pay_currency));
        client_params.insert("paymentMethod".into(), json!(topup.pricing.payment_method));

        Ok(Checkout {
            redirect_url: Some(format!(
                "{}/{}/checkout/{}",
                self.checkout_base_url, self.code, topup.topup_id
            )),
            client_params,
        })
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<NormalizedEvent> {
        parse_body(payload, false)
    }
}

/// Administrator confirmations. Events without an id get a fresh one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualAdapter;

#[async_trait]
impl GatewayAdapter for ManualAdapter {
    fn code(&self) -> &str {
        MANUAL_GATEWAY
    }

    async fn build_checkout(&self, topup: &Topup) -> Result<Checkout> {
        let mut client_params = Map::new();
        client_params.insert("topupId".into(), Value::String(topup.topup_id.clone()));
        client_params.insert("awaitingManualConfirmation".into(), Value::Bool(true));
        Ok(Checkout {
            redirect_url: None,
            client_params,
        })
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<NormalizedEvent> {
        parse_body(payload, true)
    }
}
