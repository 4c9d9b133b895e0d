use crate::domain::topup::TopupStatus;
use thiserror::Error;

/// Every failure the top-up engine can report.
///
/// Business errors are distinct variants so callers match on them directly;
/// the stable client-facing code for each one is exposed through [`TopupError::code`].
#[derive(Error, Debug)]
pub enum TopupError {
    #[error("invalid top-up amount for selected region")]
    InvalidAmount,
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("selected payment gateway is disabled: {0}")]
    GatewayDisabled(String),
    #[error("quote not found")]
    QuoteNotFound,
    #[error("quote is expired")]
    QuoteExpired,
    #[error("quote already used")]
    QuoteAlreadyUsed,
    #[error("top-up is not allowed on mobile")]
    TopupNotAllowedOnMobile,
    #[error("top-up not found")]
    TopupNotFound,
    #[error("top-up is not awaiting manual review (status: {0})")]
    TopupNotAwaitingReview(TopupStatus),
    #[error("top-up blocked by risk policy")]
    TopupBlocked,
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("checkout failed: {0}")]
    Checkout(String),
    #[error("invalid top-up transition from {from} to {to}")]
    InvalidTransition { from: TopupStatus, to: TopupStatus },
    #[error("concurrent update on top-up {0}")]
    ConcurrentUpdate(String),
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, TopupError>;

impl TopupError {
    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            TopupError::InvalidAmount => "INVALID_TOPUP_AMOUNT",
            TopupError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            TopupError::GatewayDisabled(_) => "GATEWAY_DISABLED",
            TopupError::QuoteNotFound => "QUOTE_NOT_FOUND",
            TopupError::QuoteExpired => "QUOTE_EXPIRED",
            TopupError::QuoteAlreadyUsed => "QUOTE_ALREADY_USED",
            TopupError::TopupNotAllowedOnMobile => "TOPUP_NOT_ALLOWED_ON_MOBILE",
            TopupError::TopupNotFound => "TOPUP_NOT_FOUND",
            TopupError::TopupNotAwaitingReview(_) => "TOPUP_NOT_AWAITING_REVIEW",
            TopupError::TopupBlocked => "TOPUP_BLOCKED",
            TopupError::InvalidPayload(_) => "INVALID_PAYLOAD",
            TopupError::InvalidRequest(_) => "INVALID_REQUEST",
            TopupError::Checkout(_) => "CHECKOUT_FAILED",
            TopupError::InvalidTransition { .. }
            | TopupError::ConcurrentUpdate(_)
            | TopupError::Ledger(_)
            | TopupError::Serialization(_)
            | TopupError::Csv(_)
            | TopupError::Io(_) => "INTERNAL_ERROR",
            #[cfg(feature = "storage-rocksdb")]
            TopupError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Internal errors are logged with context but never shown verbatim to end users.
    pub fn is_internal(&self) -> bool {
        self.code() == "INTERNAL_ERROR"
    }

    /// Errors a caller can fix by changing its input and retrying.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TopupError::InvalidAmount
                | TopupError::UnsupportedCurrency(_)
                | TopupError::GatewayDisabled(_)
                | TopupError::InvalidRequest(_)
        )
    }

    /// Errors after which the client has to ask for a fresh quote.
    pub fn requires_new_quote(&self) -> bool {
        matches!(
            self,
            TopupError::QuoteNotFound | TopupError::QuoteExpired | TopupError::QuoteAlreadyUsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(TopupError::QuoteAlreadyUsed.code(), "QUOTE_ALREADY_USED");
        assert_eq!(
            TopupError::TopupNotAllowedOnMobile.code(),
            "TOPUP_NOT_ALLOWED_ON_MOBILE"
        );
        assert_eq!(
            TopupError::UnsupportedCurrency("XYZ".into()).code(),
            "UNSUPPORTED_CURRENCY"
        );
    }

    #[test]
    fn test_internal_classification() {
        assert!(TopupError::Ledger("boom".into()).is_internal());
        assert!(TopupError::ConcurrentUpdate("t".into()).is_internal());
        assert!(!TopupError::TopupNotFound.is_internal());
        assert!(TopupError::QuoteExpired.requires_new_quote());
        assert!(TopupError::InvalidAmount.is_validation());
        assert!(!TopupError::InvalidPayload("x".into()).is_validation());
    }
}
