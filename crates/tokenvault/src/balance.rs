//! Token balances with last-writer-by-issue-order semantics and live
//! refresh from `Transfer` logs.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use dashmap::DashMap;
use serde::Serialize;
use tokenvault_error::Result;
use tokenvault_provider::TypedProvider;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::abi::{call_contract, IERC20};
use crate::session::{LogNotification, WalletSession, WalletState};
use crate::tokens::TokenRegistry;
use crate::units::{display_amount, format_units, NATIVE_DECIMALS};

const UPDATE_CAPACITY: usize = 64;

/// A balance read at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Holder
    pub owner: Address,
    /// Token contract, or the zero address for the native currency
    pub token: Address,
    /// Raw units
    pub raw: U256,
    /// Token decimals
    pub decimals: u8,
    /// Rounded for display
    pub display: String,
}

impl Balance {
    /// Builds a balance and its display form
    pub fn new(owner: Address, token: Address, raw: U256, decimals: u8) -> Self {
        Self { owner, token, raw, decimals, display: display_amount(raw, decimals) }
    }

    /// Exact decimal form
    pub fn formatted(&self) -> String {
        format_units(self.raw, self.decimals)
    }

    /// Whether this is a native currency balance
    pub fn is_native(&self) -> bool {
        self.token == Address::ZERO
    }
}

type BalanceKey = (u64, Address, Address);

#[derive(Debug, Default)]
struct Slot {
    issued: u64,
    applied: u64,
    value: Option<Balance>,
}

/// Reads token balances and keeps the freshest one per
/// `(chain, token, owner)`.
///
/// Every read takes a sequence number when it starts; a result is stored
/// only when no later-issued read has been stored already.
#[derive(Debug)]
pub struct BalanceTracker {
    session: Arc<WalletSession>,
    tokens: Arc<TokenRegistry>,
    slots: DashMap<BalanceKey, Slot>,
    updates: broadcast::Sender<Balance>,
}

impl BalanceTracker {
    /// Tracker reading through `session`
    pub fn new(session: Arc<WalletSession>, tokens: Arc<TokenRegistry>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self { session, tokens, slots: DashMap::new(), updates }
    }

    fn issue(&self, key: BalanceKey) -> u64 {
        let mut slot = self.slots.entry(key).or_default();
        slot.issued += 1;
        slot.issued
    }

    fn store(&self, key: BalanceKey, seq: u64, balance: Balance) -> Balance {
        let mut slot = self.slots.entry(key).or_default();
        if seq > slot.applied {
            slot.applied = seq;
            slot.value = Some(balance.clone());
            drop(slot);
            // no receivers is fine
            let _ = self.updates.send(balance.clone());
            balance
        } else {
            debug!(token = %key.1, owner = %key.2, seq, applied = slot.applied, "discarding stale balance");
            slot.value.clone().unwrap_or(balance)
        }
    }

    /// Reads `owner`'s balance of `token`.
    ///
    /// When a later-issued read for the same key has already completed,
    /// its value is returned instead of this read's.
    pub async fn get_balance(&self, token: Address, owner: Address) -> Result<Balance> {
        let key = (self.session.active_chain_id(), token, owner);
        let seq = self.issue(key);

        let info = self.tokens.get_token_info(token).await?;
        let reader = self.session.reader()?;
        let raw = call_contract(&reader, token, IERC20::balanceOfCall { account: owner })
            .await
            .map_err(|e| e.into_read_error())?;

        Ok(self.store(key, seq, Balance::new(owner, token, raw, info.decimals)))
    }

    /// Native currency balance of `owner` on the active chain
    pub async fn native_balance(&self, owner: Address) -> Result<Balance> {
        let key = (self.session.active_chain_id(), Address::ZERO, owner);
        let seq = self.issue(key);
        let raw = self.session.reader()?.get_balance(owner).await?;
        Ok(self.store(key, seq, Balance::new(owner, Address::ZERO, raw, NATIVE_DECIMALS)))
    }

    /// Last stored balance on the active chain
    pub fn balance(&self, token: Address, owner: Address) -> Option<Balance> {
        let key = (self.session.active_chain_id(), token, owner);
        self.slots.get(&key).and_then(|slot| slot.value.clone())
    }

    /// Every stored balance, as it is stored
    pub fn updates(&self) -> broadcast::Receiver<Balance> {
        self.updates.subscribe()
    }

    /// Subscribes to `Transfer` logs of `token` and refreshes `owner`'s
    /// balance whenever one moves funds in or out of it.
    ///
    /// The watch ends when the chain changes, the wallet disconnects, or
    /// the handle is released or dropped. The log subscription is removed
    /// exactly once when it ends.
    pub async fn watch(self: &Arc<Self>, token: Address, owner: Address) -> Result<BalanceWatch> {
        let reader = self.session.reader()?;
        let notifications = self.session.notifications();
        let changes = self.session.changes();
        let filter = Filter::new().address(token).event_signature(IERC20::Transfer::SIGNATURE_HASH);
        let subscription = reader
            .subscribe_logs(&filter)
            .await
            .map_err(|e| e.into_read_error())?;
        info!(%token, %owner, %subscription, "watching transfers");

        let (stop, stopped) = oneshot::channel();
        let task = WatchTask {
            tracker: self.clone(),
            reader,
            token,
            owner,
            subscription: subscription.clone(),
            chain_id: self.session.active_chain_id(),
        };
        let handle = tokio::spawn(task.run(notifications, changes, stopped));
        Ok(BalanceWatch { subscription, stop: Some(stop), handle: Some(handle) })
    }
}

struct WatchTask {
    tracker: Arc<BalanceTracker>,
    reader: TypedProvider,
    token: Address,
    owner: Address,
    subscription: String,
    chain_id: u64,
}

impl WatchTask {
    fn moves_owner(&self, log: &Log) -> bool {
        if log.address() != self.token {
            return false;
        }
        match IERC20::Transfer::decode_log_data(log.data()) {
            Ok(transfer) => transfer.from == self.owner || transfer.to == self.owner,
            Err(e) => {
                debug!(subscription = %self.subscription, error = %e, "not a Transfer log");
                false
            }
        }
    }

    async fn refresh(&self) {
        if let Err(e) = self.tracker.get_balance(self.token, self.owner).await {
            warn!(token = %self.token, owner = %self.owner, error = %e, "balance refresh failed");
        }
    }

    async fn run(
        self,
        mut notifications: broadcast::Receiver<LogNotification>,
        mut changes: watch::Receiver<WalletState>,
        mut stopped: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = changes.borrow_and_update().clone();
                    if !state.is_connected() || state.chain_id() != Some(self.chain_id) {
                        debug!(subscription = %self.subscription, "session moved, ending watch");
                        break;
                    }
                }
                received = notifications.recv() => match received {
                    Ok(LogNotification { subscription, result }) if subscription == self.subscription => {
                        match serde_json::from_value::<Log>(result) {
                            Ok(log) if self.moves_owner(&log) => self.refresh().await,
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "ignoring malformed log notification"),
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "log notifications lagged, refreshing");
                        self.refresh().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        match self.reader.unsubscribe(&self.subscription).await {
            Ok(true) => debug!(subscription = %self.subscription, "unsubscribed"),
            Ok(false) => debug!(subscription = %self.subscription, "subscription already gone"),
            Err(e) => warn!(subscription = %self.subscription, error = %e, "unsubscribe failed"),
        }
    }
}

/// Handle to a running balance watch. Dropping it stops the watch.
#[derive(Debug)]
pub struct BalanceWatch {
    subscription: String,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BalanceWatch {
    /// Provider subscription id
    pub fn subscription_id(&self) -> &str {
        &self.subscription
    }

    /// Whether the watch is still running
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the watch and waits for the unsubscribe to complete
    pub async fn release(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "balance watch task failed");
            }
        }
    }
}

impl Drop for BalanceWatch {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
