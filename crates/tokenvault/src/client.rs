//! All client components wired over one session.

use std::sync::Arc;

use tokenvault_error::Result;
use tokenvault_provider::Eip1193Provider;
use tracing::{info, warn};

use crate::balance::BalanceTracker;
use crate::chains::ChainRegistry;
use crate::config::ClientConfig;
use crate::session::{WalletSession, WalletState};
use crate::tokens::TokenRegistry;
use crate::transfer::TransferClient;
use crate::tx::TransactionTracker;
use crate::vault::VaultClient;

/// Session, caches and clients sharing one provider
#[derive(Debug)]
pub struct TokenVault {
    session: Arc<WalletSession>,
    tokens: Arc<TokenRegistry>,
    balances: Arc<BalanceTracker>,
    transactions: Arc<TransactionTracker>,
    vault: VaultClient,
    transfers: TransferClient,
}

impl TokenVault {
    /// Builds every component over `provider`.
    ///
    /// Without an injected provider, reads go to the public endpoints of
    /// the configured default chain.
    pub fn new(provider: Option<Arc<dyn Eip1193Provider>>, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let chains = Arc::new(ChainRegistry::from_config(config));

        let mut session = WalletSession::new(provider, chains.clone());
        if !session.has_injected_provider() {
            match chains.describe(config.default_chain_id).read_provider(config.http_timeout()) {
                Ok(http) => {
                    info!(chain_id = config.default_chain_id, "no wallet injected, reading over HTTP");
                    session = session.with_read_fallback(http);
                }
                Err(e) => warn!(chain_id = config.default_chain_id, error = %e, "no read-only endpoint"),
            }
        }
        let session = Arc::new(session);

        let tokens = Arc::new(TokenRegistry::new(session.clone()));
        let balances = Arc::new(BalanceTracker::new(session.clone(), tokens.clone()));
        let transactions = Arc::new(TransactionTracker::new(session.clone(), config));
        let vault = VaultClient::new(tokens.clone(), transactions.clone());
        let transfers = TransferClient::new(transactions.clone());

        Ok(Self { session, tokens, balances, transactions, vault, transfers })
    }

    /// [`TokenVault::new`] with configuration from the environment
    pub fn from_env(provider: Option<Arc<dyn Eip1193Provider>>) -> Result<Self> {
        Self::new(provider, &ClientConfig::from_env()?)
    }

    /// Requests account access from the wallet
    pub async fn connect(&self) -> Result<WalletState> {
        self.session.connect().await
    }

    /// Stops listening to the provider
    pub fn shutdown(&self) {
        self.session.teardown();
    }

    /// Wallet session
    pub fn session(&self) -> &Arc<WalletSession> {
        &self.session
    }

    /// Token metadata
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Token balances
    pub fn balances(&self) -> &Arc<BalanceTracker> {
        &self.balances
    }

    /// Submitted transactions
    pub fn transactions(&self) -> &Arc<TransactionTracker> {
        &self.transactions
    }

    /// Vault operations
    pub fn vault(&self) -> &VaultClient {
        &self.vault
    }

    /// Direct transfers
    pub fn transfers(&self) -> &TransferClient {
        &self.transfers
    }
}
