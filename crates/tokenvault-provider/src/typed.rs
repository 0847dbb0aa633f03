//! A narrow typed adapter over [`Eip1193Provider`].
//!
//! Every method validates the shape of the provider's answer and raises
//! [`ProviderError::MalformedResponse`] instead of handing untyped JSON to
//! the rest of the crate.

use std::fmt;
use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::rpc::types::{Filter, TransactionInput, TransactionReceipt, TransactionRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::eip1193::{Eip1193Provider, ProviderEvent};
use crate::error::{ProviderError, Result};

/// `eth_call` / `eth_estimateGas` / `eth_sendTransaction` parameters.
///
/// Calldata is carried in both `input` and `data`.
pub fn transaction_request(from: Option<Address>, to: Address, data: Bytes, value: U256) -> TransactionRequest {
    let mut tx = TransactionRequest::default().with_to(to);
    if let Some(from) = from {
        tx = tx.with_from(from);
    }
    if !data.is_empty() {
        tx = tx.input(TransactionInput::both(data));
    }
    if !value.is_zero() {
        tx = tx.with_value(value);
    }
    tx
}

/// `nativeCurrency` member of `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Currency name
    pub name: String,
    /// Ticker
    pub symbol: String,
    /// Fraction digits
    pub decimals: u8,
}

/// Parameter object for `wallet_addEthereumChain` (EIP-3085)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParameter {
    /// Hex chain id
    pub chain_id: String,
    /// Human readable name
    pub chain_name: String,
    /// Native currency
    pub native_currency: NativeCurrency,
    /// RPC endpoints
    pub rpc_urls: Vec<String>,
    /// Explorer URLs
    pub block_explorer_urls: Vec<String>,
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ProviderError::malformed(method, e.to_string()))
}

fn quantity<T: DeserializeOwned>(method: &str, value: &Value) -> Result<T> {
    match value.as_str() {
        Some(s) if s.starts_with("0x") => decode(method, value.clone()),
        _ => Err(ProviderError::malformed(method, format!("expected hex quantity, got {value}"))),
    }
}

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_quantity(method: &str, value: &Value) -> Result<u64> {
    quantity::<U64>(method, value).map(|q| q.to::<u64>())
}

/// Typed view of a shared provider handle.
#[derive(Clone)]
pub struct TypedProvider {
    inner: Arc<dyn Eip1193Provider>,
}

impl fmt::Debug for TypedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedProvider").finish_non_exhaustive()
    }
}

impl TypedProvider {
    /// Wraps a provider
    pub fn new(inner: Arc<dyn Eip1193Provider>) -> Self {
        Self { inner }
    }

    /// The underlying provider
    pub fn inner(&self) -> &Arc<dyn Eip1193Provider> {
        &self.inner
    }

    /// Subscribes to provider events
    pub fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.inner.subscribe()
    }

    /// Raw request, for methods without a typed wrapper
    pub async fn raw(&self, method: &str, params: Value) -> Result<Value> {
        tracing::trace!(method, "provider request");
        self.inner.request(method, params).await
    }

    /// Parses an `accountsChanged` / `eth_accounts` style list
    pub fn parse_accounts(method: &str, value: &Value) -> Result<Vec<Address>> {
        decode(method, value.clone())
    }

    /// `eth_requestAccounts`
    pub async fn request_accounts(&self) -> Result<Vec<Address>> {
        let value = self.raw("eth_requestAccounts", json!([])).await?;
        Self::parse_accounts("eth_requestAccounts", &value)
    }

    /// `eth_accounts`
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        let value = self.raw("eth_accounts", json!([])).await?;
        Self::parse_accounts("eth_accounts", &value)
    }

    /// `eth_chainId`
    pub async fn chain_id(&self) -> Result<u64> {
        let value = self.raw("eth_chainId", json!([])).await?;
        parse_quantity("eth_chainId", &value)
    }

    /// `wallet_switchEthereumChain`
    pub async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        self.raw("wallet_switchEthereumChain", json!([{ "chainId": format!("{chain_id:#x}") }]))
            .await?;
        Ok(())
    }

    /// `wallet_addEthereumChain`
    pub async fn add_chain(&self, chain: &AddChainParameter) -> Result<()> {
        self.raw("wallet_addEthereumChain", json!([chain])).await?;
        Ok(())
    }

    /// `eth_call` against the latest block
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = transaction_request(None, to, data, U256::ZERO);
        let value = self.raw("eth_call", json!([serde_json::to_value(&tx)?, "latest"])).await?;
        decode("eth_call", value)
    }

    /// `eth_getBalance` at the latest block
    pub async fn get_balance(&self, owner: Address) -> Result<U256> {
        let value = self.raw("eth_getBalance", json!([owner, "latest"])).await?;
        quantity::<U256>("eth_getBalance", &value)
    }

    /// `eth_estimateGas`
    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let value = self.raw("eth_estimateGas", json!([serde_json::to_value(tx)?])).await?;
        parse_quantity("eth_estimateGas", &value)
    }

    /// `eth_sendTransaction`; the wallet signs and broadcasts
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256> {
        let value = self.raw("eth_sendTransaction", json!([serde_json::to_value(tx)?])).await?;
        decode("eth_sendTransaction", value)
    }

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        let value = self.raw("eth_getTransactionReceipt", json!([hash])).await?;
        decode("eth_getTransactionReceipt", value)
    }

    /// `eth_subscribe("logs", filter)`, returning the subscription id
    pub async fn subscribe_logs(&self, filter: &Filter) -> Result<String> {
        let value = self.raw("eth_subscribe", json!(["logs", serde_json::to_value(filter)?])).await?;
        decode("eth_subscribe", value)
    }

    /// `eth_unsubscribe`
    pub async fn unsubscribe(&self, subscription: &str) -> Result<bool> {
        let value = self.raw("eth_unsubscribe", json!([subscription])).await?;
        decode("eth_unsubscribe", value)
    }
}
