//! # TokenVault
//!
//! Client for an ERC-20 custodial vault, driven through an injected
//! EIP-1193 wallet.
//!
//! ## Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`session`] | Connection state, active network, provider events |
//! | [`chains`] | Known networks and per-chain contract addresses |
//! | [`tokens`] | ERC-20 metadata with a per-chain cache |
//! | [`balance`] | Token balances, ordered by issue, and live `Transfer` watches |
//! | [`tx`] | Submission and receipt polling |
//! | [`vault`] | Pause state, ledger balances, deposit and withdraw |
//! | [`transfer`] | Direct token and native transfers |
//! | [`units`] | Decimal string parsing and display formatting |
//! | [`config`] | JSON and environment configuration |
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokenvault::prelude::*;
//!
//! let client = TokenVault::new(Some(wallet), &ClientConfig::from_env()?)?;
//! let state = client.connect().await?;
//! let usdc = client.session().chains().contracts_for(client.session().active_chain_id()).token("USDC");
//! if let (Some(account), Some(usdc)) = (state.account(), usdc) {
//!     let outcome = client.vault().deposit(usdc, "1.5").await?;
//!     println!("deposited in {}", outcome.deposit.hash);
//!     let balance = client.balances().get_balance(usdc, account).await?;
//!     println!("{} USDC left", balance.display);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod abi;
pub mod balance;
pub mod chains;
pub mod client;
pub mod config;
pub mod session;
pub mod tokens;
pub mod transfer;
pub mod tx;
pub mod units;
pub mod vault;

pub use tokenvault_error::{ErrorCode, Result, TokenVaultError};
pub use tokenvault_provider as provider;

pub use balance::{Balance, BalanceTracker, BalanceWatch};
pub use chains::{ChainDescriptor, ChainRegistry, ContractAddressSet};
pub use client::TokenVault;
pub use config::ClientConfig;
pub use session::{ConnectionStatus, LogNotification, Signer, WalletSession, WalletState};
pub use tokens::{TokenInfo, TokenRegistry};
pub use transfer::TransferClient;
pub use tx::{ContractCall, PendingTransaction, TransactionKind, TransactionStatus, TransactionTracker};
pub use vault::{DepositOutcome, VaultBalance, VaultClient};

/// Commonly used types
///
/// ```ignore
/// use tokenvault::prelude::*;
/// ```
pub mod prelude {
    pub use crate::units::{display_amount, format_units, parse_address, parse_units};
    pub use crate::{
        Balance, ClientConfig, ContractCall, DepositOutcome, PendingTransaction, TokenInfo, TokenVault,
        TokenVaultError, TransactionKind, TransactionStatus, WalletState,
    };
    pub use tokenvault_provider::{Eip1193Provider, ProviderEvent};
}

/// Crate version
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
