//! Provider failures and their classification into [`TokenVaultError`].

use thiserror::Error;
use tokenvault_error::TokenVaultError;

/// EIP-1193: the user rejected the request.
pub const USER_REJECTED: i64 = 4001;
/// EIP-1193: the requested method or account has not been authorized.
pub const UNAUTHORIZED: i64 = 4100;
/// EIP-1193: the provider does not support the requested method.
pub const UNSUPPORTED_METHOD: i64 = 4200;
/// EIP-1193: the provider is disconnected from all chains.
pub const DISCONNECTED: i64 = 4900;
/// EIP-3085/3326: the chain has not been added to the wallet.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
/// JSON-RPC: execution reverted (geth style).
pub const EXECUTION_REVERTED: i64 = 3;
/// JSON-RPC: generic server error.
pub const SERVER_ERROR: i64 = -32000;
/// JSON-RPC: method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC: internal error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Provider-related errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error object returned by the provider
    #[error("RPC error: code={code}, message={message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Error message
        message: String,
        /// Additional data
        data: Option<serde_json::Value>,
    },

    /// The response did not have the expected shape
    #[error("Malformed response to {method}: {reason}")]
    MalformedResponse {
        /// RPC method
        method: String,
        /// What was wrong
        reason: String,
    },

    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// All endpoints failed
    #[error("All endpoints failed")]
    AllEndpointsFailed,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Builds an RPC error without data
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc { code, message: message.into(), data: None }
    }

    /// Builds a malformed-response error
    pub fn malformed(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse { method: method.into(), reason: reason.into() }
    }

    /// The RPC error code, if this is an RPC error
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn message_contains(&self, needle: &str) -> bool {
        match self {
            Self::Rpc { message, data, .. } => {
                message.to_ascii_lowercase().contains(needle)
                    || data
                        .as_ref()
                        .map(|d| d.to_string().to_ascii_lowercase().contains(needle))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// The user declined the prompt (code 4001)
    pub fn is_user_rejected(&self) -> bool {
        self.code() == Some(USER_REJECTED)
    }

    /// The wallet does not know the requested chain (code 4902)
    pub fn is_unrecognized_chain(&self) -> bool {
        self.code() == Some(UNRECOGNIZED_CHAIN)
    }

    /// The account cannot pay value plus gas
    pub fn is_insufficient_funds(&self) -> bool {
        self.message_contains("insufficient funds")
    }

    /// The call or transaction reverted during execution
    pub fn is_execution_reverted(&self) -> bool {
        self.code() == Some(EXECUTION_REVERTED) || self.message_contains("execution reverted")
    }

    fn into_unclassified(self) -> TokenVaultError {
        match self {
            Self::Rpc { code, message, .. } => {
                TokenVaultError::ProviderError { code: Some(code), message }
            }
            Self::MalformedResponse { method, reason } => {
                TokenVaultError::MalformedResponse { method, reason }
            }
            Self::Http(e) => TokenVaultError::ConnectionError(e.to_string()),
            Self::AllEndpointsFailed => {
                TokenVaultError::ConnectionError("all endpoints failed".to_string())
            }
            other => TokenVaultError::ProviderError { code: None, message: other.to_string() },
        }
    }

    /// Classification for `eth_requestAccounts` and the reads that follow it
    pub fn into_connect_error(self) -> TokenVaultError {
        if self.is_user_rejected() {
            return TokenVaultError::UserRejected;
        }
        match self {
            Self::Rpc { message, .. } => TokenVaultError::ConnectionError(message),
            Self::MalformedResponse { method, reason } => {
                TokenVaultError::ConnectionError(format!("malformed {method} response: {reason}"))
            }
            other => TokenVaultError::ConnectionError(other.to_string()),
        }
    }

    /// Classification for `wallet_switchEthereumChain` / `wallet_addEthereumChain`
    pub fn into_switch_error(self) -> TokenVaultError {
        if self.is_user_rejected() {
            return TokenVaultError::UserRejected;
        }
        match self {
            Self::Rpc { message, .. } => TokenVaultError::NetworkSwitchFailed(message),
            other => TokenVaultError::NetworkSwitchFailed(other.to_string()),
        }
    }

    /// Classification for `eth_sendTransaction`
    pub fn into_write_error(self) -> TokenVaultError {
        if self.is_user_rejected() {
            TokenVaultError::TransactionRejected
        } else if self.code() == Some(UNAUTHORIZED) {
            TokenVaultError::WalletNotConnected
        } else if self.is_insufficient_funds() {
            TokenVaultError::InsufficientFunds(self.to_string())
        } else if self.is_execution_reverted() {
            TokenVaultError::TransactionReverted { hash: None }
        } else {
            self.into_unclassified()
        }
    }

    /// Classification for read-only calls
    pub fn into_read_error(self) -> TokenVaultError {
        self.into_unclassified()
    }
}

impl From<ProviderError> for TokenVaultError {
    fn from(err: ProviderError) -> Self {
        err.into_read_error()
    }
}
