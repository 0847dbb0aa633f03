//! ERC-20 metadata lookup with a per-chain cache.

use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokenvault_error::{Result, TokenVaultError};
use tracing::{debug, warn};

use crate::abi::{call_contract, IERC20};
use crate::session::WalletSession;
use crate::units::MAX_DECIMALS;

/// Token metadata as read from the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Contract address
    pub address: Address,
    /// `name()`
    pub name: String,
    /// `symbol()`
    pub symbol: String,
    /// `decimals()`
    pub decimals: u8,
}

fn cache_key(address: Address) -> String {
    address.to_string().to_lowercase()
}

/// Fetches and caches token metadata.
///
/// Entries are scoped to the chain they were read on; the first lookup
/// after a chain change empties the cache.
#[derive(Debug)]
pub struct TokenRegistry {
    session: Arc<WalletSession>,
    cache: DashMap<String, TokenInfo>,
    cache_chain: Mutex<Option<u64>>,
}

impl TokenRegistry {
    /// Registry reading through `session`
    pub fn new(session: Arc<WalletSession>) -> Self {
        Self { session, cache: DashMap::new(), cache_chain: Mutex::new(None) }
    }

    fn scope_to(&self, chain_id: u64) {
        let Ok(mut current) = self.cache_chain.lock() else {
            self.cache.clear();
            return;
        };
        if *current != Some(chain_id) {
            if current.is_some() {
                debug!(from = ?*current, to = chain_id, entries = self.cache.len(), "chain changed, dropping token cache");
            }
            self.cache.clear();
            *current = Some(chain_id);
        }
    }

    /// Metadata for `token`, from cache when possible.
    ///
    /// `name`, `symbol` and `decimals` are read concurrently; if any of them
    /// fails nothing is cached.
    pub async fn get_token_info(&self, token: Address) -> Result<TokenInfo> {
        let chain_id = self.session.active_chain_id();
        self.scope_to(chain_id);

        let key = cache_key(token);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let reader = self.session.reader()?;
        let unavailable = |reason: String| TokenVaultError::TokenMetadataUnavailable {
            token: token.to_string(),
            reason,
        };

        let (name, symbol, decimals) = futures::try_join!(
            call_contract(&reader, token, IERC20::nameCall {}),
            call_contract(&reader, token, IERC20::symbolCall {}),
            call_contract(&reader, token, IERC20::decimalsCall {}),
        )
        .map_err(|e| {
            warn!(%token, error = %e, "token metadata lookup failed");
            unavailable(e.to_string())
        })?;

        if decimals > MAX_DECIMALS {
            return Err(unavailable(format!("decimals {decimals} exceeds {MAX_DECIMALS}")));
        }

        let info = TokenInfo { address: token, name, symbol, decimals };
        if self.session.active_chain_id() == chain_id {
            self.scope_to(chain_id);
            self.cache.insert(key, info.clone());
        } else {
            debug!(%token, chain_id, "chain changed during metadata fetch, not caching");
        }
        Ok(info)
    }

    /// Looks up several tokens concurrently
    pub async fn prefetch(&self, tokens: &[Address]) -> Vec<(Address, Result<TokenInfo>)> {
        let lookups = tokens.iter().map(|&token| async move { (token, self.get_token_info(token).await) });
        join_all(lookups).await
    }

    /// Cached metadata for `token` on the active chain
    pub fn cached(&self, token: Address) -> Option<TokenInfo> {
        let current = self.cache_chain.lock().ok().and_then(|c| *c);
        if current != Some(self.session.active_chain_id()) {
            return None;
        }
        self.cache.get(&cache_key(token)).map(|hit| hit.clone())
    }

    /// Empties the cache
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}
