//! Wallet session: connection state, network, and the provider event
//! listener.
//!
//! The session is the only writer of wallet state. Every other component
//! reads [`WalletState`] through [`WalletSession::state`] or
//! [`WalletSession::changes`], and write paths capture a [`Signer`] whose
//! epoch is checked again before each transaction is submitted.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use alloy::primitives::Address;
use serde::Serialize;
use serde_json::Value;
use tokenvault_error::{Result, TokenVaultError};
use tokenvault_provider::{Eip1193Provider, HttpProvider, ProviderError, ProviderEvent, TypedProvider};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chains::{ChainDescriptor, ChainRegistry};

const NOTIFICATION_CAPACITY: usize = 256;

/// An `eth_subscribe` notification forwarded from the provider
#[derive(Debug, Clone, PartialEq)]
pub struct LogNotification {
    /// Subscription id
    pub subscription: String,
    /// Notification payload
    pub result: Value,
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    /// No account exposed
    Disconnected,
    /// `eth_requestAccounts` in flight
    Connecting,
    /// Account and chain known
    Connected,
}

/// Snapshot of the wallet connection.
///
/// `network` always matches `chain_id`, and a signer is only reported with an
/// account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletState {
    status: ConnectionStatus,
    account: Option<Address>,
    chain_id: Option<u64>,
    network: Option<ChainDescriptor>,
    has_signer: bool,
    epoch: u64,
}

impl WalletState {
    fn disconnected() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            account: None,
            chain_id: None,
            network: None,
            has_signer: false,
            epoch: 0,
        }
    }

    fn connecting() -> Self {
        Self { status: ConnectionStatus::Connecting, ..Self::disconnected() }
    }

    fn connected(account: Address, chain_id: u64, chains: &ChainRegistry) -> Self {
        Self {
            status: ConnectionStatus::Connected,
            account: Some(account),
            chain_id: Some(chain_id),
            network: Some(chains.describe(chain_id)),
            has_signer: true,
            epoch: 0,
        }
    }

    /// Connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Active account
    pub fn account(&self) -> Option<Address> {
        self.account
    }

    /// Active chain id
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    /// Descriptor of the active chain
    pub fn network(&self) -> Option<&ChainDescriptor> {
        self.network.as_ref()
    }

    /// Whether transactions can be signed
    pub fn has_signer(&self) -> bool {
        self.has_signer
    }

    /// Bumped on every account, chain or connection change
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Shorthand for `status() == Connected`
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Whether the active chain is one the vault operates on
    pub fn is_supported_network(&self) -> bool {
        self.network.as_ref().is_some_and(|n| n.is_supported)
    }

    fn same_session(&self, other: &Self) -> bool {
        self.status == other.status && self.account == other.account && self.chain_id == other.chain_id
    }
}

/// Capability to submit transactions as the connected account.
///
/// Captured at the start of a write; [`WalletSession::ensure_current`]
/// rejects it once the session has moved on.
#[derive(Debug, Clone)]
pub struct Signer {
    /// Sending account
    pub account: Address,
    /// Chain the account was on when captured
    pub chain_id: u64,
    epoch: u64,
    provider: TypedProvider,
}

impl Signer {
    /// Provider to sign through
    pub fn provider(&self) -> &TypedProvider {
        &self.provider
    }

    /// Session epoch at capture time
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

struct SessionInner {
    provider: Option<TypedProvider>,
    fallback: OnceLock<TypedProvider>,
    chains: Arc<ChainRegistry>,
    state: watch::Sender<WalletState>,
    notifications: broadcast::Sender<LogNotification>,
}

impl SessionInner {
    /// Replaces the state when the session actually changed, bumping the epoch.
    fn transition(&self, f: impl FnOnce(&WalletState) -> Option<WalletState>) -> bool {
        self.state.send_if_modified(|current| match f(current) {
            Some(mut next) if !next.same_session(current) => {
                next.epoch = current.epoch + 1;
                *current = next;
                true
            }
            _ => false,
        })
    }

    fn set_disconnected(&self) {
        self.transition(|_| Some(WalletState::disconnected()));
    }

    fn apply_chain(&self, chain_id: u64) {
        let changed = self.transition(|s| {
            let account = s.account?;
            s.is_connected().then(|| WalletState::connected(account, chain_id, &self.chains))
        });
        if changed {
            info!(chain_id, "active chain changed");
        }
    }

    fn apply_accounts(&self, accounts: &[Address]) {
        match accounts.first() {
            None => {
                if self.transition(|_| Some(WalletState::disconnected())) {
                    info!("wallet exposed no accounts, disconnected");
                }
            }
            Some(&account) => {
                let changed = self.transition(|s| {
                    let chain_id = s.chain_id?;
                    s.is_connected().then(|| WalletState::connected(account, chain_id, &self.chains))
                });
                if changed {
                    info!(%account, "active account changed");
                }
            }
        }
    }

    fn handle_event(&self, event: &ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(raw) => {
                let value = serde_json::json!(raw);
                match TypedProvider::parse_accounts("accountsChanged", &value) {
                    Ok(accounts) => self.apply_accounts(&accounts),
                    Err(e) => warn!(error = %e, "ignoring malformed accountsChanged"),
                }
            }
            ProviderEvent::ChainChanged(hex) => {
                match tokenvault_provider::parse_quantity("chainChanged", &serde_json::json!(hex)) {
                    Ok(chain_id) => self.apply_chain(chain_id),
                    Err(e) => warn!(error = %e, "ignoring malformed chainChanged"),
                }
            }
            ProviderEvent::Disconnect { code, message } => {
                info!(code, %message, "provider disconnected");
                self.set_disconnected();
            }
            ProviderEvent::Message { subscription, result } => {
                // nobody watching is fine
                let _ = self
                    .notifications
                    .send(LogNotification { subscription: subscription.clone(), result: result.clone() });
            }
        }
    }

    async fn resync(&self) {
        let Some(provider) = &self.provider else { return };
        let connected = self.state.borrow().is_connected();
        if !connected {
            return;
        }
        match tokio::try_join!(provider.accounts(), provider.chain_id()) {
            Ok((accounts, chain_id)) => {
                self.apply_accounts(&accounts);
                self.apply_chain(chain_id);
            }
            Err(e) => warn!(error = %e, "session resync failed"),
        }
    }
}

async fn listen(inner: Weak<SessionInner>, mut events: broadcast::Receiver<ProviderEvent>) {
    loop {
        let received = events.recv().await;
        let Some(session) = inner.upgrade() else { break };
        match received {
            Ok(event) => session.handle_event(&event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "provider events lagged, resyncing");
                session.resync().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("session listener stopped");
}

/// The wallet connection shared by every component.
pub struct WalletSession {
    inner: Arc<SessionInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession").field("state", &*self.inner.state.borrow()).finish_non_exhaustive()
    }
}

impl WalletSession {
    /// Creates a session over the injected provider, if any.
    ///
    /// Subscribes to provider events once and spawns the listener, so it
    /// must be called inside a tokio runtime.
    pub fn new(provider: Option<Arc<dyn Eip1193Provider>>, chains: Arc<ChainRegistry>) -> Self {
        let provider = provider.map(TypedProvider::new);
        let (state, _) = watch::channel(WalletState::disconnected());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let inner = Arc::new(SessionInner { provider, fallback: OnceLock::new(), chains, state, notifications });

        let listener = inner.provider.as_ref().map(|p| {
            let events = p.events();
            tokio::spawn(listen(Arc::downgrade(&inner), events))
        });

        Self { inner, listener: Mutex::new(listener) }
    }

    /// Uses `http` for reads when no wallet is injected
    pub fn with_read_fallback(self, http: HttpProvider) -> Self {
        if self.inner.fallback.set(TypedProvider::new(Arc::new(http))).is_err() {
            warn!("read fallback already set, keeping the first");
        }
        self
    }

    fn injected(&self) -> Result<&TypedProvider> {
        self.inner.provider.as_ref().ok_or(TokenVaultError::NoProviderDetected)
    }

    /// Requests account access and reads the active chain.
    ///
    /// An already connected session is returned as is; the wallet is not
    /// prompted again and the epoch does not move.
    pub async fn connect(&self) -> Result<WalletState> {
        let provider = self.injected()?;
        let current = self.state();
        if current.is_connected() {
            debug!(account = ?current.account, "already connected");
            return Ok(current);
        }
        self.inner.transition(|_| Some(WalletState::connecting()));

        let result = async {
            let accounts = provider.request_accounts().await.map_err(ProviderError::into_connect_error)?;
            let account = accounts
                .first()
                .copied()
                .ok_or_else(|| TokenVaultError::ConnectionError("wallet exposed no accounts".into()))?;
            let chain_id = provider.chain_id().await.map_err(ProviderError::into_connect_error)?;
            Ok::<_, TokenVaultError>((account, chain_id))
        }
        .await;

        match result {
            Ok((account, chain_id)) => {
                let chains = &self.inner.chains;
                self.inner.transition(|_| Some(WalletState::connected(account, chain_id, chains)));
                info!(%account, chain_id, "wallet connected");
                Ok(self.state())
            }
            Err(e) => {
                self.inner.set_disconnected();
                if e.is_user_rejection() {
                    debug!("connection request rejected by user");
                } else {
                    warn!(error = %e, "wallet connection failed");
                }
                Err(e)
            }
        }
    }

    /// Forgets the connection locally; the wallet is not contacted
    pub fn disconnect_wallet(&self) {
        self.inner.set_disconnected();
        info!("wallet disconnected");
    }

    /// Asks the wallet to switch to `chain_id`, adding the chain first if
    /// the wallet does not know it
    pub async fn switch_network(&self, chain_id: u64) -> Result<()> {
        let chain = self
            .inner
            .chains
            .get(chain_id)
            .filter(|c| c.is_supported)
            .ok_or(TokenVaultError::UnsupportedNetwork { chain_id })?;
        let provider = self.injected()?;

        match provider.switch_chain(chain_id).await {
            Ok(()) => {}
            Err(e) if e.is_unrecognized_chain() => {
                info!(chain_id, "wallet does not know the chain, adding it");
                provider.add_chain(&chain.add_chain_parameter()).await.map_err(ProviderError::into_switch_error)?;
                provider.switch_chain(chain_id).await.map_err(ProviderError::into_switch_error)?;
            }
            Err(e) => {
                let err = e.into_switch_error();
                if err.is_user_rejection() {
                    debug!(chain_id, "network switch rejected by user");
                }
                return Err(err);
            }
        }

        let active = provider.chain_id().await.map_err(ProviderError::into_switch_error)?;
        self.inner.apply_chain(active);
        Ok(())
    }

    /// Applies a provider event as the listener would
    pub fn handle_event(&self, event: &ProviderEvent) {
        self.inner.handle_event(event);
    }

    /// Re-reads accounts and chain from the wallet
    pub async fn resync(&self) {
        self.inner.resync().await;
    }

    /// Signing capability for the connected account
    pub fn signer(&self) -> Result<Signer> {
        let state = self.inner.state.borrow();
        match (&self.inner.provider, state.account, state.chain_id) {
            (Some(provider), Some(account), Some(chain_id)) if state.is_connected() && state.has_signer => {
                Ok(Signer { account, chain_id, epoch: state.epoch, provider: provider.clone() })
            }
            _ => Err(TokenVaultError::WalletNotConnected),
        }
    }

    /// Fails with `SessionChanged` once the account, chain or connection
    /// moved since `signer` was captured
    pub fn ensure_current(&self, signer: &Signer) -> Result<()> {
        if self.inner.state.borrow().epoch == signer.epoch {
            Ok(())
        } else {
            Err(TokenVaultError::SessionChanged)
        }
    }

    /// Provider for reads: the wallet if injected, else the fallback
    pub fn reader(&self) -> Result<TypedProvider> {
        self.inner
            .provider
            .as_ref()
            .or_else(|| self.inner.fallback.get())
            .cloned()
            .ok_or(TokenVaultError::NoProviderDetected)
    }

    /// Whether a wallet was injected
    pub fn has_injected_provider(&self) -> bool {
        self.inner.provider.is_some()
    }

    /// Active chain id, or the registry default
    pub fn active_chain_id(&self) -> u64 {
        self.inner.state.borrow().chain_id.unwrap_or_else(|| self.inner.chains.default_chain_id())
    }

    /// Current state
    pub fn state(&self) -> WalletState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn changes(&self) -> watch::Receiver<WalletState> {
        self.inner.state.subscribe()
    }

    /// Subscription notifications received by the listener
    pub fn notifications(&self) -> broadcast::Receiver<LogNotification> {
        self.inner.notifications.subscribe()
    }

    /// Network registry
    pub fn chains(&self) -> &Arc<ChainRegistry> {
        &self.inner.chains
    }

    /// Stops the event listener and clears the state
    pub fn teardown(&self) {
        if let Some(handle) = self.listener.lock().ok().and_then(|mut l| l.take()) {
            handle.abort();
        }
        self.inner.set_disconnected();
        debug!("session torn down");
    }
}

impl Drop for WalletSession {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}
