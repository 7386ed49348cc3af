//! Unified error codes for the seckill workspace
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Voucher errors
//! - 3xxx: Seckill order errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Auth ====================
    /// Caller identity is missing
    NotAuthenticated = 1001,
    /// Caller identity could not be parsed
    InvalidIdentity = 1002,

    // ==================== 2xxx: Voucher ====================
    /// Voucher not found
    VoucherNotFound = 2001,
    /// Seckill window has not opened yet
    SeckillNotStarted = 2002,
    /// Seckill window already closed
    SeckillEnded = 2003,
    /// Stock must be a non-negative integer
    InvalidStock = 2004,

    // ==================== 3xxx: Seckill order ====================
    /// No stock unit left for this voucher
    OutOfStock = 3001,
    /// Caller already holds an order for this voucher
    AlreadyPurchased = 3002,
    /// Order not found (or not yet persisted)
    OrderNotFound = 3003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Shared store (Redis) unavailable
    StoreUnavailable = 9003,
    /// Configuration error
    ConfigError = 9004,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::InvalidIdentity => "User identity is invalid",

            // Voucher
            ErrorCode::VoucherNotFound => "Voucher not found",
            ErrorCode::SeckillNotStarted => "Seckill has not started yet",
            ErrorCode::SeckillEnded => "Seckill has already ended",
            ErrorCode::InvalidStock => "Stock must not be negative",

            // Seckill order
            ErrorCode::OutOfStock => "Voucher is out of stock",
            ErrorCode::AlreadyPurchased => "Voucher already purchased, one order per user",
            ErrorCode::OrderNotFound => "Order not found",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::StoreUnavailable => "Shared store unavailable, retry later",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidIdentity),

            // Voucher
            2001 => Ok(ErrorCode::VoucherNotFound),
            2002 => Ok(ErrorCode::SeckillNotStarted),
            2003 => Ok(ErrorCode::SeckillEnded),
            2004 => Ok(ErrorCode::InvalidStock),

            // Seckill order
            3001 => Ok(ErrorCode::OutOfStock),
            3002 => Ok(ErrorCode::AlreadyPurchased),
            3003 => Ok(ErrorCode::OrderNotFound),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::StoreUnavailable),
            9004 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::NotFound.code(), 3);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::VoucherNotFound.code(), 2001);
        assert_eq!(ErrorCode::OutOfStock.code(), 3001);
        assert_eq!(ErrorCode::AlreadyPurchased.code(), 3002);
        assert_eq!(ErrorCode::StoreUnavailable.code(), 9003);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::OutOfStock.is_success());
    }

    #[test]
    fn test_try_from_covers_every_code() {
        let all = [
            ErrorCode::Success,
            ErrorCode::Unknown,
            ErrorCode::ValidationFailed,
            ErrorCode::NotFound,
            ErrorCode::AlreadyExists,
            ErrorCode::InvalidRequest,
            ErrorCode::NotAuthenticated,
            ErrorCode::InvalidIdentity,
            ErrorCode::VoucherNotFound,
            ErrorCode::SeckillNotStarted,
            ErrorCode::SeckillEnded,
            ErrorCode::InvalidStock,
            ErrorCode::OutOfStock,
            ErrorCode::AlreadyPurchased,
            ErrorCode::OrderNotFound,
            ErrorCode::InternalError,
            ErrorCode::DatabaseError,
            ErrorCode::StoreUnavailable,
            ErrorCode::ConfigError,
        ];
        for code in all {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(
            InvalidErrorCode(999).to_string(),
            "invalid error code: 999"
        );
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::OutOfStock).unwrap();
        assert_eq!(json, "3001");

        let code: ErrorCode = serde_json::from_str("3002").unwrap();
        assert_eq!(code, ErrorCode::AlreadyPurchased);

        let result: Result<ErrorCode, _> = serde_json::from_str("10000");
        assert!(result.is_err());
    }
}
