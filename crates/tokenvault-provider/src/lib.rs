//! # TokenVault Provider
//!
//! The boundary between the client and an Ethereum node or wallet.
//!
//! ## Features
//!
//! - [`Eip1193Provider`]: the injected-wallet contract (`request` + events)
//! - [`TypedProvider`]: typed, shape-checked wrappers over the raw methods
//! - [`HttpProvider`]: read-only JSON-RPC over HTTP with endpoint failover
//! - Classification of provider errors into [`tokenvault_error::TokenVaultError`]
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokenvault_provider::{HttpProvider, TypedProvider};
//!
//! let http = HttpProvider::new(["https://rpc.sepolia.org"], Duration::from_secs(30))?;
//! let provider = TypedProvider::new(Arc::new(http));
//! let chain_id = provider.chain_id().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod eip1193;
pub mod error;
pub mod http;
pub mod typed;

pub use eip1193::{Eip1193Provider, ProviderEvent};
pub use error::{ProviderError, Result};
pub use http::{EndpointHealth, EndpointInfo, HttpProvider, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use typed::{parse_quantity, transaction_request, AddChainParameter, NativeCurrency, TypedProvider};
