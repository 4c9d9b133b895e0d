use crate::error::TopupError;
use serde::{Deserialize, Serialize};

const INTERNAL_MESSAGE: &str = "internal error";

/// What a client can do to recover from a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryHint {
    FixInput,
    RequestNewQuote,
}

/// Client-facing error body: a stable code plus a message safe to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryHint>,
}

impl From<&TopupError> for ApiError {
    fn from(error: &TopupError) -> Self {
        let message = if error.is_internal() {
            INTERNAL_MESSAGE.to_string()
        } else {
            error.to_string()
        };
        let retry = if error.requires_new_quote() {
            Some(RetryHint::RequestNewQuote)
        } else if error.is_validation() {
            Some(RetryHint::FixInput)
        } else {
            None
        };
        Self {
            error_code: error.code().to_string(),
            message,
            retry,
        }
    }
}
