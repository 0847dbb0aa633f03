//! Read-only JSON-RPC provider over HTTP.
//!
//! Used for reads when no injected wallet is available. It speaks plain
//! JSON-RPC to the chain's public endpoints, failing over between them on
//! transport errors. Wallet-only methods are answered with
//! [`UNSUPPORTED_METHOD`](crate::error::UNSUPPORTED_METHOD).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use crate::eip1193::{Eip1193Provider, ProviderEvent};
use crate::error::{ProviderError, Result, UNSUPPORTED_METHOD};

const WALLET_METHODS: &[&str] = &[
    "eth_requestAccounts",
    "eth_sendTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData_v4",
    "wallet_switchEthereumChain",
    "wallet_addEthereumChain",
    "eth_subscribe",
    "eth_unsubscribe",
];

/// RPC request payload
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Method name
    pub method: &'a str,
    /// Parameters
    pub params: &'a Value,
    /// Request ID
    pub id: u64,
}

/// RPC response payload
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Response ID
    pub id: Option<u64>,
    /// Result (if successful)
    #[serde(default)]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// RPC error
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(default)]
    pub data: Option<Value>,
}

/// Health status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    /// Last request succeeded
    Healthy,
    /// Last request failed at the transport level
    Unhealthy,
    /// Not yet used
    Unknown,
}

/// Information about a provider endpoint
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    /// The endpoint URL
    pub url: Url,
    /// Current health status
    pub health: EndpointHealth,
    /// Total requests made
    pub total_requests: u64,
    /// Total transport failures
    pub total_failures: u64,
    /// Time of the last failure
    pub last_failure: Option<Instant>,
}

impl EndpointInfo {
    fn new(url: Url) -> Self {
        Self { url, health: EndpointHealth::Unknown, total_requests: 0, total_failures: 0, last_failure: None }
    }
}

/// JSON-RPC provider with ordered endpoint failover
pub struct HttpProvider {
    client: Client,
    endpoints: Mutex<Vec<EndpointInfo>>,
    current: AtomicUsize,
    request_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl HttpProvider {
    /// Creates a provider over the given endpoints, tried in order
    pub fn new<I, S>(urls: I, timeout: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = urls
            .into_iter()
            .map(|u| {
                Url::parse(u.as_ref())
                    .map(EndpointInfo::new)
                    .map_err(|e| ProviderError::InvalidUrl(format!("{}: {e}", u.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        if endpoints.is_empty() {
            return Err(ProviderError::InvalidUrl("no RPC endpoints configured".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("tokenvault/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (events, _) = broadcast::channel(1);

        Ok(Self {
            client,
            endpoints: Mutex::new(endpoints),
            current: AtomicUsize::new(0),
            request_id: AtomicU64::new(1),
            events,
        })
    }

    /// Returns endpoint statistics
    pub fn stats(&self) -> Vec<EndpointInfo> {
        self.endpoints.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Returns the current active endpoint URL
    pub fn current_url(&self) -> Option<Url> {
        let idx = self.current.load(Ordering::SeqCst);
        self.endpoints.lock().ok().and_then(|e| e.get(idx).map(|info| info.url.clone()))
    }

    fn record(&self, idx: usize, ok: bool) {
        if let Ok(mut endpoints) = self.endpoints.lock() {
            if let Some(info) = endpoints.get_mut(idx) {
                info.total_requests += 1;
                if ok {
                    info.health = EndpointHealth::Healthy;
                } else {
                    info.total_failures += 1;
                    info.last_failure = Some(Instant::now());
                    info.health = EndpointHealth::Unhealthy;
                }
            }
        }
    }

    async fn post(&self, url: Url, method: &str, params: &Value) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest { jsonrpc: "2.0", method, params, id };

        let response: JsonRpcResponse = self.client.post(url).json(&request).send().await?.json().await?;

        if let Some(error) = response.error {
            return Err(ProviderError::Rpc { code: error.code, message: error.message, data: error.data });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Eip1193Provider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if WALLET_METHODS.contains(&method) {
            return Err(ProviderError::rpc(
                UNSUPPORTED_METHOD,
                format!("{method} requires an injected wallet"),
            ));
        }

        let count = self.endpoints.lock().map(|e| e.len()).unwrap_or(0);
        let start = self.current.load(Ordering::SeqCst);
        for attempt in 0..count {
            let idx = (start + attempt) % count;
            let Some(url) = self.endpoints.lock().ok().and_then(|e| e.get(idx).map(|i| i.url.clone())) else {
                continue;
            };
            match self.post(url.clone(), method, &params).await {
                Ok(result) => {
                    self.record(idx, true);
                    self.current.store(idx, Ordering::SeqCst);
                    return Ok(result);
                }
                Err(e @ (ProviderError::Http(_) | ProviderError::Json(_))) => {
                    self.record(idx, false);
                    tracing::warn!(%url, method, error = %e, "RPC endpoint failed, trying next");
                }
                // The node answered; another endpoint would answer the same.
                Err(e) => {
                    self.record(idx, true);
                    return Err(e);
                }
            }
        }
        Err(ProviderError::AllEndpointsFailed)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("current_url", &self.current_url())
            .field("request_count", &(self.request_id.load(Ordering::SeqCst) - 1))
            .finish()
    }
}
