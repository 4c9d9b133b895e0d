//! Executes script commands against a [`TopupEngine`].
//!
//! Each command mirrors one inbound operation of the HTTP surface. A command
//! may carry `"as": "name"` to remember the quote or top-up id it produced;
//! later commands refer to it as `"$name"` in any string field.

use super::command_reader::ScriptLine;
use crate::application::engine::TopupEngine;
use crate::application::orders::CreateTopupRequest;
use crate::application::pricing::PackageQuery;
use crate::application::quotes::QuoteRequest;
use crate::domain::config::ConfigUpdate;
use crate::domain::topup::TopupStatus;
use crate::error::{Result, TopupError};
use crate::interfaces::api::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{error, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    GetPackages(PackageQuery),
    CreateQuote {
        user_id: u64,
        #[serde(flatten)]
        request: QuoteRequest,
    },
    #[serde(alias = "create_topup_from_quote")]
    CreateTopup {
        user_id: u64,
        #[serde(flatten)]
        request: CreateTopupRequest,
    },
    #[serde(alias = "list_user_topups")]
    ListMyTopups {
        user_id: u64,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        page: u32,
        #[serde(default)]
        limit: u32,
    },
    Webhook {
        gateway: String,
        #[serde(default)]
        body: Option<Value>,
        /// Sent verbatim instead of `body`, for malformed deliveries.
        #[serde(default)]
        raw: Option<String>,
    },
    Balance {
        user_id: u64,
    },
    GetConfig,
    UpdateConfig {
        admin_id: u64,
        update: ConfigUpdate,
    },
    PreviewPackages(PackageQuery),
    ListTopups {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        limit: u32,
    },
    GetTopup {
        topup_id: String,
    },
    #[serde(alias = "approve_manual_topup")]
    Approve {
        topup_id: String,
        admin_id: u64,
        #[serde(default)]
        note: String,
    },
    #[serde(alias = "reject_topup")]
    Reject {
        topup_id: String,
        admin_id: u64,
        #[serde(default)]
        note: String,
    },
    MarkPaid {
        topup_id: String,
        admin_id: u64,
        #[serde(default)]
        external_payment_id: Option<String>,
    },
    SweepQuotes,
}

/// The JSON line written for every executed command.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptOutcome {
    pub line: usize,
    pub op: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

pub struct ScriptRunner<'a> {
    engine: &'a TopupEngine,
    bindings: HashMap<String, String>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(engine: &'a TopupEngine) -> Self {
        Self {
            engine,
            bindings: HashMap::new(),
        }
    }

    pub async fn run_line(&mut self, script_line: ScriptLine) -> ScriptOutcome {
        let ScriptLine { line, mut value } = script_line;
        let op = value
            .get("op")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let alias = value
            .as_object_mut()
            .and_then(|object| object.remove("as"))
            .and_then(|name| name.as_str().map(String::from));
        self.substitute(&mut value);

        let outcome = match serde_json::from_value::<Command>(value) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(TopupError::InvalidRequest(e.to_string())),
        };

        match outcome {
            Ok((result, produced_id)) => {
                if let (Some(name), Some(id)) = (alias, produced_id) {
                    self.bindings.insert(name, id);
                }
                ScriptOutcome {
                    line,
                    op,
                    ok: true,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                if e.is_internal() {
                    error!(line, op = %op, error = %e, "Command failed");
                } else {
                    warn!(line, op = %op, code = e.code(), "Command rejected");
                }
                ScriptOutcome {
                    line,
                    op,
                    ok: false,
                    result: None,
                    error: Some(ApiError::from(&e)),
                }
            }
        }
    }

    fn substitute(&self, value: &mut Value) {
        match value {
            Value::String(text) => {
                if let Some(bound) = text.strip_prefix('$').and_then(|name| self.bindings.get(name)) {
                    *text = bound.clone();
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.substitute(item)),
            Value::Object(object) => object.values_mut().for_each(|item| self.substitute(item)),
            _ => {}
        }
    }

    /// Runs one command; returns its JSON result and the id it produced, if any.
    async fn execute(&self, command: Command) -> Result<(Value, Option<String>)> {
        let engine = self.engine;
        let produced = match command {
            Command::GetPackages(query) => (to_json(&engine.get_packages(&query).await?)?, None),
            Command::CreateQuote { user_id, request } => {
                let quote = engine.create_quote(user_id, &request).await?;
                let id = quote.quote_id.clone();
                (to_json(&quote)?, Some(id))
            }
            Command::CreateTopup { user_id, request } => {
                let created = engine.create_topup_from_quote(user_id, &request).await?;
                let id = created.topup.topup_id.clone();
                (to_json(&created)?, Some(id))
            }
            Command::ListMyTopups {
                user_id,
                status,
                page,
                limit,
            } => {
                let status = parse_status(status.as_deref())?;
                let page = engine.list_user_topups(user_id, status, page, limit).await?;
                (to_json(&page)?, None)
            }
            Command::Webhook { gateway, body, raw } => {
                let payload = match (raw, body) {
                    (Some(raw), _) => raw.into_bytes(),
                    (None, Some(body)) => serde_json::to_vec(&body)?,
                    (None, None) => return Err(TopupError::InvalidPayload("empty body".into())),
                };
                (to_json(&engine.handle_webhook(&gateway, &payload).await?)?, None)
            }
            Command::Balance { user_id } => {
                let balance = engine.balance(user_id).await?;
                (json!({ "user_id": user_id, "balance": balance }), None)
            }
            Command::GetConfig => (to_json(&engine.get_config().await?)?, None),
            Command::UpdateConfig { admin_id, update } => {
                (to_json(&engine.update_config(update, admin_id).await?)?, None)
            }
            Command::PreviewPackages(query) => {
                (to_json(&engine.preview_packages(&query).await?)?, None)
            }
            Command::ListTopups { status, limit } => {
                let status = parse_status(status.as_deref())?;
                (to_json(&engine.list_topups(status, limit).await?)?, None)
            }
            Command::GetTopup { topup_id } => (to_json(&engine.get_topup(&topup_id).await?)?, None),
            Command::Approve {
                topup_id,
                admin_id,
                note,
            } => {
                let topup = engine.approve_manual_topup(&topup_id, admin_id, &note).await?;
                (to_json(&topup)?, None)
            }
            Command::Reject {
                topup_id,
                admin_id,
                note,
            } => (to_json(&engine.reject_topup(&topup_id, admin_id, &note).await?)?, None),
            Command::MarkPaid {
                topup_id,
                admin_id,
                external_payment_id,
            } => {
                let result = engine
                    .mark_paid(&topup_id, admin_id, external_payment_id.as_deref())
                    .await?;
                (to_json(&result)?, None)
            }
            Command::SweepQuotes => {
                let expired = engine.sweep_expired_quotes().await?;
                (json!({ "expired": expired }), None)
            }
        };
        Ok(produced)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn parse_status(raw: Option<&str>) -> Result<Option<TopupStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => TopupStatus::parse(text)
            .map(Some)
            .ok_or_else(|| TopupError::InvalidRequest(format!("unknown status '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::EnginePorts;
    use crate::application::gateways::GatewayRegistry;
    use crate::config::EngineSettings;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::gateways::{JsonWebhookAdapter, ManualAdapter};
    use crate::infrastructure::in_memory::{
        InMemoryConfigStore, InMemoryTopupRepository, InMemoryWalletLedger,
    };
    use crate::interfaces::api::RetryHint;
    use std::sync::Arc;

    fn engine() -> TopupEngine {
        TopupEngine::new(
            EnginePorts {
                repository: Arc::new(InMemoryTopupRepository::new()),
                config_store: Arc::new(InMemoryConfigStore::new()),
                ledger: Arc::new(InMemoryWalletLedger::new()),
                gateways: GatewayRegistry::new()
                    .with(Arc::new(JsonWebhookAdapter::new("yookassa", "https://pay.example.com")))
                    .with(Arc::new(ManualAdapter)),
                clock: Arc::new(SystemClock),
            },
            EngineSettings::default(),
        )
    }

    fn line(n: usize, value: Value) -> ScriptLine {
        ScriptLine { line: n, value }
    }

    #[tokio::test]
    async fn test_bindings_flow_between_commands() {
        let engine = engine();
        let mut runner = ScriptRunner::new(&engine);

        let quote = runner
            .run_line(line(1, json!({"op": "create_quote", "as": "q", "user_id": 1, "lkm_amount": 500, "region": "cis"})))
            .await;
        assert!(quote.ok, "{quote:?}");

        let topup = runner
            .run_line(line(2, json!({"op": "create_topup", "as": "t", "user_id": 1, "quote_id": "$q"})))
            .await;
        assert!(topup.ok, "{topup:?}");

        let paid = runner
            .run_line(line(3, json!({"op": "mark_paid", "topup_id": "$t", "admin_id": 9})))
            .await;
        assert_eq!(paid.result.unwrap()["status"], "credited");

        let balance = runner.run_line(line(4, json!({"op": "balance", "user_id": 1}))).await;
        assert_eq!(balance.result.unwrap()["balance"], 500);
    }

    #[tokio::test]
    async fn test_errors_carry_stable_codes() {
        let engine = engine();
        let mut runner = ScriptRunner::new(&engine);

        let unknown = runner.run_line(line(1, json!({"op": "teleport"}))).await;
        let unknown = unknown.error.unwrap();
        assert_eq!(unknown.error_code, "INVALID_REQUEST");
        assert_eq!(unknown.retry, Some(RetryHint::FixInput));

        let mobile = runner
            .run_line(line(2, json!({"op": "create_quote", "user_id": 1, "lkm_amount": 500, "platform": "android"})))
            .await;
        assert_eq!(mobile.error.unwrap().error_code, "TOPUP_NOT_ALLOWED_ON_MOBILE");

        let bad_webhook = runner
            .run_line(line(3, json!({"op": "webhook", "gateway": "yookassa", "raw": "{oops"})))
            .await;
        assert_eq!(bad_webhook.error.unwrap().error_code, "INVALID_PAYLOAD");
    }
}
