//! A scripted, call-recording EIP-1193 provider.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::{hex, keccak256, Address, Bloom, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokenvault_provider::error::{METHOD_NOT_FOUND, USER_REJECTED};
use tokenvault_provider::{Eip1193Provider, ProviderError, ProviderEvent, Result};
use tokio::sync::broadcast;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted answer to one request
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Successful result
    Value(Value),
    /// Provider error object
    Error {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },
    /// Resolves to the inner reply after the delay (tokio time)
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    /// Successful JSON result
    pub fn ok(value: Value) -> Self {
        Self::Value(value)
    }

    /// Provider error
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }

    /// The user declined the prompt
    pub fn rejected() -> Self {
        Self::error(USER_REJECTED, "User rejected the request.")
    }

    /// Wraps this reply in a delay
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }

    /// Raw bytes, hex encoded as `eth_call` returns them
    pub fn bytes(data: impl AsRef<[u8]>) -> Self {
        Self::Value(json!(hex::encode_prefixed(data)))
    }

    /// ABI-encoded `uint256` return value
    pub fn uint(value: impl Into<u128>) -> Self {
        Self::word(U256::from(value.into()))
    }

    /// ABI-encoded `uint256` return value beyond `u128`
    pub fn word(value: U256) -> Self {
        Self::bytes((value,).abi_encode_params())
    }

    /// ABI-encoded `string` return value
    pub fn string(value: &str) -> Self {
        Self::bytes((value.to_string(),).abi_encode_params())
    }

    /// ABI-encoded `bool` return value
    pub fn boolean(value: bool) -> Self {
        Self::bytes((value,).abi_encode_params())
    }

    /// Hex quantity, as `eth_chainId` / `eth_estimateGas` return them
    pub fn quantity(value: u64) -> Self {
        Self::Value(json!(format!("{value:#x}")))
    }
}

/// A request the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// RPC method
    pub method: String,
    /// Raw params
    pub params: Value,
}

impl RecordedCall {
    fn tx(&self) -> Option<&Value> {
        self.params.get(0).filter(|v| v.is_object())
    }

    /// `from` of the transaction object, if any
    pub fn from(&self) -> Option<Address> {
        self.tx()?.get("from")?.as_str().and_then(|s| Address::from_str(s).ok())
    }

    /// `to` of the transaction object, if any
    pub fn to(&self) -> Option<Address> {
        self.tx()?.get("to")?.as_str().and_then(|s| Address::from_str(s).ok())
    }

    /// Calldata of the transaction object (`input`, else `data`), if any
    pub fn data(&self) -> Option<Bytes> {
        let tx = self.tx()?;
        tx.get("input").or_else(|| tx.get("data"))?.as_str().and_then(|s| Bytes::from_str(s).ok())
    }

    /// Function selector of the calldata
    pub fn selector(&self) -> Option<[u8; 4]> {
        let data = self.data()?;
        data.get(..4).and_then(|s| s.try_into().ok())
    }

    /// Explicit gas limit of the transaction object
    pub fn gas(&self) -> Option<u64> {
        let gas = self.tx()?.get("gas")?.as_str()?;
        u64::from_str_radix(gas.trim_start_matches("0x"), 16).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContractKey {
    method: String,
    to: Address,
    selector: [u8; 4],
}

#[derive(Debug, Default)]
struct Miner {
    enabled: bool,
    next_hash: u64,
    block: u64,
    mined: HashMap<B256, MinedTx>,
    reverts: HashSet<(Address, [u8; 4])>,
    receipt_delay: u32,
    polls: HashMap<B256, u32>,
}

#[derive(Debug, Clone)]
struct MinedTx {
    success: bool,
    from: Option<Address>,
    to: Option<Address>,
}

/// Receipt in the shape nodes return for EIP-1559 transactions
fn receipt_json(hash: B256, block: u64, mined: &MinedTx) -> Value {
    json!({
        "type": "0x2",
        "status": if mined.success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": "0xc350",
        "logs": [],
        "logsBloom": Bloom::ZERO,
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": B256::from(U256::from(block).to_be_bytes::<32>()),
        "blockNumber": format!("{block:#x}"),
        "gasUsed": "0xc350",
        "effectiveGasPrice": "0x3b9aca00",
        "from": mined.from.unwrap_or_default(),
        "to": mined.to,
        "contractAddress": null,
    })
}

#[derive(Debug, Default)]
struct Subscriptions {
    next_id: u64,
    active: Vec<String>,
}

/// Mock EIP-1193 provider.
///
/// Replies are resolved in order: one-shot contract replies, contract
/// defaults, one-shot method replies, method defaults, then built-in
/// behaviour (subscriptions, and receipts when [`MockProvider::auto_mine`]
/// is on). Anything else answers `-32601`.
pub struct MockProvider {
    calls: Mutex<Vec<RecordedCall>>,
    queued: Mutex<HashMap<String, VecDeque<MockReply>>>,
    defaults: Mutex<HashMap<String, MockReply>>,
    contract_queued: Mutex<HashMap<ContractKey, VecDeque<MockReply>>>,
    contract_defaults: Mutex<HashMap<ContractKey, MockReply>>,
    miner: Mutex<Miner>,
    subscriptions: Mutex<Subscriptions>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").field("calls", &lock(&self.calls).len()).finish_non_exhaustive()
    }
}

impl MockProvider {
    /// Empty mock: every request fails until scripted
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            calls: Mutex::new(Vec::new()),
            queued: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            contract_queued: Mutex::new(HashMap::new()),
            contract_defaults: Mutex::new(HashMap::new()),
            miner: Mutex::new(Miner::default()),
            subscriptions: Mutex::new(Subscriptions::default()),
            events,
        }
    }

    /// Wallet with one authorized account on `chain_id`
    pub fn with_account(account: Address, chain_id: u64) -> Self {
        let mock = Self::new();
        mock.on("eth_requestAccounts", MockReply::ok(json!([account.to_string()])));
        mock.on("eth_accounts", MockReply::ok(json!([account.to_string()])));
        mock.on("eth_chainId", MockReply::quantity(chain_id));
        mock
    }

    /// Default reply for `method`
    pub fn on(&self, method: &str, reply: MockReply) -> &Self {
        lock(&self.defaults).insert(method.to_string(), reply);
        self
    }

    /// One-shot reply for `method`, consumed before the default
    pub fn enqueue(&self, method: &str, reply: MockReply) -> &Self {
        lock(&self.queued).entry(method.to_string()).or_default().push_back(reply);
        self
    }

    /// Default reply for `method` whose transaction targets `to` with `selector`
    pub fn on_contract(&self, method: &str, to: Address, selector: [u8; 4], reply: MockReply) -> &Self {
        lock(&self.contract_defaults).insert(ContractKey { method: method.to_string(), to, selector }, reply);
        self
    }

    /// One-shot reply for `method` against `to` with `selector`
    pub fn enqueue_contract(&self, method: &str, to: Address, selector: [u8; 4], reply: MockReply) -> &Self {
        lock(&self.contract_queued)
            .entry(ContractKey { method: method.to_string(), to, selector })
            .or_default()
            .push_back(reply);
        self
    }

    /// Default `eth_call` reply for a contract function
    pub fn on_call(&self, to: Address, selector: [u8; 4], reply: MockReply) -> &Self {
        self.on_contract("eth_call", to, selector, reply)
    }

    /// One-shot `eth_call` reply for a contract function
    pub fn enqueue_call(&self, to: Address, selector: [u8; 4], reply: MockReply) -> &Self {
        self.enqueue_contract("eth_call", to, selector, reply)
    }

    /// Accept every `eth_sendTransaction` with a fresh hash and serve
    /// successful receipts for it; also answers `eth_estimateGas` with
    /// 50 000 unless scripted.
    pub fn auto_mine(&self) -> &Self {
        lock(&self.miner).enabled = true;
        self
    }

    /// Mined transactions to `to` with `selector` get a `0x0` receipt
    pub fn revert_on(&self, to: Address, selector: [u8; 4]) -> &Self {
        lock(&self.miner).reverts.insert((to, selector));
        self
    }

    /// Receipts stay `null` for the first `polls` lookups of each hash
    pub fn receipt_after_polls(&self, polls: u32) -> &Self {
        lock(&self.miner).receipt_delay = polls;
        self
    }

    /// Pushes an event to every subscriber, returning how many received it
    pub fn emit(&self, event: ProviderEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Pushes an ERC-20 `Transfer` log notification
    pub fn emit_transfer(&self, subscription: &str, token: Address, from: Address, to: Address, value: U256) -> usize {
        let topic0 = keccak256("Transfer(address,address,uint256)");
        let log = json!({
            "address": token.to_string(),
            "topics": [
                topic0.to_string(),
                from.into_word().to_string(),
                to.into_word().to_string(),
            ],
            "data": hex::encode_prefixed(value.to_be_bytes::<32>()),
        });
        self.emit(ProviderEvent::Message { subscription: subscription.to_string(), result: log })
    }

    /// Live event receivers
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Every recorded request, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Recorded requests for one method
    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        lock(&self.calls).iter().filter(|c| c.method == method).cloned().collect()
    }

    /// Number of requests for one method
    pub fn count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.method == method).count()
    }

    /// Selectors of every `eth_sendTransaction`, in submission order
    pub fn sent_selectors(&self) -> Vec<Option<[u8; 4]>> {
        self.calls_to("eth_sendTransaction").iter().map(RecordedCall::selector).collect()
    }

    /// Subscription ids not yet unsubscribed
    pub fn active_subscriptions(&self) -> Vec<String> {
        lock(&self.subscriptions).active.clone()
    }

    /// Forgets recorded calls
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn scripted(&self, call: &RecordedCall) -> Option<MockReply> {
        if let (Some(to), Some(selector)) = (call.to(), call.selector()) {
            let key = ContractKey { method: call.method.clone(), to, selector };
            if let Some(reply) = lock(&self.contract_queued).get_mut(&key).and_then(VecDeque::pop_front) {
                return Some(reply);
            }
            if let Some(reply) = lock(&self.contract_defaults).get(&key) {
                return Some(reply.clone());
            }
        }
        if let Some(reply) = lock(&self.queued).get_mut(&call.method).and_then(VecDeque::pop_front) {
            return Some(reply);
        }
        lock(&self.defaults).get(&call.method).cloned()
    }

    fn builtin(&self, call: &RecordedCall) -> Option<MockReply> {
        match call.method.as_str() {
            "eth_subscribe" => {
                let mut subs = lock(&self.subscriptions);
                subs.next_id += 1;
                let id = format!("{:#x}", subs.next_id);
                subs.active.push(id.clone());
                Some(MockReply::ok(json!(id)))
            }
            "eth_unsubscribe" => {
                let id = call.params.get(0).and_then(Value::as_str).unwrap_or_default();
                let mut subs = lock(&self.subscriptions);
                let before = subs.active.len();
                subs.active.retain(|s| s != id);
                Some(MockReply::ok(json!(subs.active.len() != before)))
            }
            "eth_sendTransaction" => {
                let mut miner = lock(&self.miner);
                if !miner.enabled {
                    return None;
                }
                miner.next_hash += 1;
                let hash = B256::from(U256::from(miner.next_hash).to_be_bytes::<32>());
                let reverted = match (call.to(), call.selector()) {
                    (Some(to), Some(selector)) => miner.reverts.contains(&(to, selector)),
                    _ => false,
                };
                miner.mined.insert(hash, MinedTx { success: !reverted, from: call.from(), to: call.to() });
                Some(MockReply::ok(json!(hash.to_string())))
            }
            "eth_getTransactionReceipt" => {
                let mut miner = lock(&self.miner);
                if !miner.enabled {
                    return None;
                }
                let hash = call.params.get(0).and_then(Value::as_str).and_then(|s| B256::from_str(s).ok())?;
                let Some(mined) = miner.mined.get(&hash).cloned() else {
                    return Some(MockReply::ok(Value::Null));
                };
                let delay = miner.receipt_delay;
                let polls = miner.polls.entry(hash).or_insert(0);
                if *polls < delay {
                    *polls += 1;
                    return Some(MockReply::ok(Value::Null));
                }
                miner.block += 1;
                Some(MockReply::ok(receipt_json(hash, miner.block, &mined)))
            }
            "eth_estimateGas" if lock(&self.miner).enabled => Some(MockReply::quantity(50_000)),
            _ => None,
        }
    }
}

#[async_trait]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let call = RecordedCall { method: method.to_string(), params };
        lock(&self.calls).push(call.clone());

        let mut reply = match self.scripted(&call).or_else(|| self.builtin(&call)) {
            Some(reply) => reply,
            None => return Err(ProviderError::rpc(METHOD_NOT_FOUND, format!("mock has no reply for {method}"))),
        };
        loop {
            match reply {
                MockReply::Value(value) => return Ok(value),
                MockReply::Error { code, message } => return Err(ProviderError::rpc(code, message)),
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
