//! # tokenvault error
//!
//! The error taxonomy shared by every tokenvault crate. Low-level provider
//! failures are classified into these variants at the provider boundary so
//! that callers can render an actionable outcome instead of a raw RPC code.
//!
//! ## Example
//!
//! ```
//! use tokenvault_error::{ErrorCode, TokenVaultError};
//!
//! let err = TokenVaultError::TransactionRejected;
//! assert!(err.is_user_rejection());
//! assert_eq!(err.code(), ErrorCode::TransactionRejected);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use thiserror::Error;

/// Every failure a tokenvault operation can surface to its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenVaultError {
    // ============ Session ============
    /// No injected wallet provider is available
    #[error("No wallet provider detected")]
    NoProviderDetected,

    /// The user declined the account access prompt
    #[error("User rejected the request")]
    UserRejected,

    /// A write was requested without a connected account
    #[error("Wallet not connected")]
    WalletNotConnected,

    /// The active account or chain changed while an operation was in flight
    #[error("Wallet account or network changed during the operation")]
    SessionChanged,

    /// Connecting to the provider failed for a reason other than rejection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    // ============ Network ============
    /// The target chain is not in the chain registry
    #[error("Unsupported network: chain id {chain_id}")]
    UnsupportedNetwork {
        /// Requested chain id
        chain_id: u64,
    },

    /// The provider failed to switch or add the chain
    #[error("Network switch failed: {0}")]
    NetworkSwitchFailed(String),

    // ============ Tokens ============
    /// One of the name/symbol/decimals reads failed
    #[error("Token metadata unavailable for {token}: {reason}")]
    TokenMetadataUnavailable {
        /// Token contract address
        token: String,
        /// Underlying failure
        reason: String,
    },

    /// A user-supplied amount could not be converted to base units
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A user-supplied address could not be parsed
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The rejected input
        address: String,
        /// Reason for rejection
        reason: String,
    },

    // ============ Transactions ============
    /// The vault reported itself paused before any prompt was shown
    #[error("Vault is paused")]
    VaultPaused,

    /// The user declined to sign a transaction
    #[error("Transaction rejected by user")]
    TransactionRejected,

    /// The account cannot cover value plus gas
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Gas estimation simulated a revert; nothing was submitted
    #[error("Gas estimation failed: {0}")]
    EstimationFailed(String),

    /// The transaction executed and failed on chain
    #[error("Transaction reverted{}", .hash.as_ref().map(|h| format!(": {h}")).unwrap_or_default())]
    TransactionReverted {
        /// Hash of the reverted transaction, when one was mined
        hash: Option<String>,
    },

    /// No receipt appeared before the confirmation deadline
    #[error("Transaction {hash} not confirmed after {seconds}s")]
    ConfirmationTimeout {
        /// Hash of the still-pending transaction
        hash: String,
        /// Deadline that elapsed
        seconds: u64,
    },

    /// The hash was never submitted through this client
    #[error("Unknown transaction {hash}")]
    UnknownTransaction {
        /// The unknown hash
        hash: String,
    },

    // ============ Provider ============
    /// The provider answered with a payload of the wrong shape
    #[error("Malformed response to {method}: {reason}")]
    MalformedResponse {
        /// RPC method that was called
        method: String,
        /// What was wrong with the payload
        reason: String,
    },

    /// Unclassified provider failure, with the raw message for diagnostics
    #[error("Provider error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    ProviderError {
        /// Provider error code, if one was reported
        code: Option<i64>,
        /// Raw provider message
        message: String,
    },

    // ============ Configuration ============
    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenient Result type using [`TokenVaultError`]
pub type Result<T> = std::result::Result<T, TokenVaultError>;

/// Stable numeric codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ErrorCode {
    /// No provider
    NoProviderDetected = 1001,
    /// Account access rejected
    UserRejected = 1002,
    /// Not connected
    WalletNotConnected = 1003,
    /// Session moved during an operation
    SessionChanged = 1004,
    /// Connection failure
    ConnectionError = 1005,
    /// Unsupported chain
    UnsupportedNetwork = 2001,
    /// Switch/add chain failure
    NetworkSwitchFailed = 2002,
    /// Token metadata failure
    TokenMetadataUnavailable = 3001,
    /// Bad amount
    InvalidAmount = 3002,
    /// Bad address
    InvalidAddress = 3003,
    /// Vault paused
    VaultPaused = 4001,
    /// Signature declined
    TransactionRejected = 4002,
    /// Insufficient funds
    InsufficientFunds = 4003,
    /// Estimation reverted
    EstimationFailed = 4004,
    /// Reverted on chain
    TransactionReverted = 4005,
    /// Confirmation deadline elapsed
    ConfirmationTimeout = 4006,
    /// Hash not tracked
    UnknownTransaction = 4007,
    /// Malformed provider payload
    MalformedResponse = 5001,
    /// Unclassified provider failure
    ProviderError = 5002,
    /// Bad configuration
    ConfigError = 9001,
}

impl TokenVaultError {
    /// Returns the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoProviderDetected => ErrorCode::NoProviderDetected,
            Self::UserRejected => ErrorCode::UserRejected,
            Self::WalletNotConnected => ErrorCode::WalletNotConnected,
            Self::SessionChanged => ErrorCode::SessionChanged,
            Self::ConnectionError(_) => ErrorCode::ConnectionError,
            Self::UnsupportedNetwork { .. } => ErrorCode::UnsupportedNetwork,
            Self::NetworkSwitchFailed(_) => ErrorCode::NetworkSwitchFailed,
            Self::TokenMetadataUnavailable { .. } => ErrorCode::TokenMetadataUnavailable,
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::InvalidAddress { .. } => ErrorCode::InvalidAddress,
            Self::VaultPaused => ErrorCode::VaultPaused,
            Self::TransactionRejected => ErrorCode::TransactionRejected,
            Self::InsufficientFunds(_) => ErrorCode::InsufficientFunds,
            Self::EstimationFailed(_) => ErrorCode::EstimationFailed,
            Self::TransactionReverted { .. } => ErrorCode::TransactionReverted,
            Self::ConfirmationTimeout { .. } => ErrorCode::ConfirmationTimeout,
            Self::UnknownTransaction { .. } => ErrorCode::UnknownTransaction,
            Self::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            Self::ProviderError { .. } => ErrorCode::ProviderError,
            Self::ConfigError(_) => ErrorCode::ConfigError,
        }
    }

    /// True when the user declined a prompt. These are benign and should not
    /// be reported as system faults.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected | Self::TransactionRejected)
    }

    /// True when re-invoking the operation may succeed without changing the
    /// environment. Retrying is always left to the user; nothing in tokenvault
    /// retries a write on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UserRejected
                | Self::TransactionRejected
                | Self::NetworkSwitchFailed(_)
                | Self::ConnectionError(_)
                | Self::SessionChanged
                | Self::ProviderError { .. }
                | Self::ConfirmationTimeout { .. }
        )
    }

    /// The transaction hash carried by the error, if any
    pub fn transaction_hash(&self) -> Option<&str> {
        match self {
            Self::TransactionReverted { hash } => hash.as_deref(),
            Self::ConfirmationTimeout { hash, .. } => Some(hash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TokenVaultError::UnsupportedNetwork { chain_id: 999_999 };
        assert_eq!(err.to_string(), "Unsupported network: chain id 999999");

        let err = TokenVaultError::TokenMetadataUnavailable {
            token: "0xabc".into(),
            reason: "decimals() reverted".into(),
        };
        assert!(err.to_string().contains("0xabc"));
        assert!(err.to_string().contains("decimals() reverted"));
    }

    #[test]
    fn test_reverted_display_with_and_without_hash() {
        let with = TokenVaultError::TransactionReverted { hash: Some("0x12".into()) };
        assert_eq!(with.to_string(), "Transaction reverted: 0x12");

        let without = TokenVaultError::TransactionReverted { hash: None };
        assert_eq!(without.to_string(), "Transaction reverted");
    }

    #[test]
    fn test_provider_error_display() {
        let err = TokenVaultError::ProviderError { code: Some(-32603), message: "internal".into() };
        assert_eq!(err.to_string(), "Provider error (-32603): internal");

        let err = TokenVaultError::ProviderError { code: None, message: "boom".into() };
        assert_eq!(err.to_string(), "Provider error: boom");
    }

    #[test]
    fn test_error_code() {
        assert_eq!(TokenVaultError::VaultPaused.code(), ErrorCode::VaultPaused);
        assert_eq!(ErrorCode::VaultPaused as u32, 4001);
        assert_eq!(
            TokenVaultError::EstimationFailed("revert".into()).code(),
            ErrorCode::EstimationFailed
        );
    }

    #[test]
    fn test_user_rejection() {
        assert!(TokenVaultError::UserRejected.is_user_rejection());
        assert!(TokenVaultError::TransactionRejected.is_user_rejection());
        assert!(!TokenVaultError::VaultPaused.is_user_rejection());
    }

    #[test]
    fn test_retryable() {
        assert!(TokenVaultError::TransactionRejected.is_retryable());
        assert!(TokenVaultError::NetworkSwitchFailed("x".into()).is_retryable());
        assert!(!TokenVaultError::NoProviderDetected.is_retryable());
        assert!(!TokenVaultError::UnsupportedNetwork { chain_id: 5 }.is_retryable());
        assert!(!TokenVaultError::EstimationFailed("revert".into()).is_retryable());
    }

    #[test]
    fn test_transaction_hash() {
        let err = TokenVaultError::ConfirmationTimeout { hash: "0xfeed".into(), seconds: 120 };
        assert_eq!(err.transaction_hash(), Some("0xfeed"));
        assert_eq!(TokenVaultError::VaultPaused.transaction_hash(), None);
    }
}
