use domain::UserId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlertError {
    #[error("invalid range: min price {min} must be below max price {max}")]
    InvalidRange { min: f64, max: f64 },
    #[error("invalid symbol: symbol must not be empty")]
    InvalidSymbol,
    #[error("invalid price: bounds must be finite numbers")]
    InvalidPrice,
    #[error("price fetch failed for {symbol}: {reason}")]
    SymbolFetchFailed { symbol: String, reason: String },
    #[error("notification to {user_id} failed: {reason}")]
    NotificationFailed { user_id: UserId, reason: String },
}

pub type AlertResult<T> = Result<T, AlertError>;
