//! The injected-provider boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

/// Notifications a provider may push at any time, independently of the
/// requests made against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ProviderEvent {
    /// `accountsChanged`: the exposed accounts, most recently used first
    AccountsChanged(Vec<String>),
    /// `chainChanged`: the new chain id as a hex string
    ChainChanged(String),
    /// `message` of type `eth_subscription`
    Message {
        /// Subscription id returned by `eth_subscribe`
        subscription: String,
        /// Notification payload
        result: Value,
    },
    /// `disconnect`: the provider lost connection to every chain
    Disconnect {
        /// Provider error code
        code: i64,
        /// Provider message
        message: String,
    },
}

/// An EIP-1193 provider: one request primitive plus an event stream.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// `request({ method, params })`
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Subscribes to provider events. Each call yields an independent
    /// receiver; dropping it releases the subscription.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
