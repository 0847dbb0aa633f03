//! Vault contract client: pause state, per-user ledger balances, and the
//! approve-then-deposit and withdraw flows.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokenvault_error::{Result, TokenVaultError};
use tracing::{debug, info, warn};

use crate::abi::{call_contract, IERC20, ITokenVault};
use crate::balance::Balance;
use crate::session::WalletSession;
use crate::tokens::TokenRegistry;
use crate::tx::{ContractCall, PendingTransaction, TransactionKind, TransactionTracker};
use crate::units::parse_units;

/// A user's balance as recorded by the vault ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultBalance {
    /// Vault contract the balance is held in
    pub vault: Address,
    /// Token symbol
    pub symbol: String,
    /// The balance itself
    pub balance: Balance,
}

/// Both confirmed transactions of a deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositOutcome {
    /// `approve(vault, amount)` on the token
    pub approval: PendingTransaction,
    /// `deposit(token, amount)` on the vault
    pub deposit: PendingTransaction,
}

type VaultKey = (u64, Address, Address);

/// Client for the vault deployed on the active chain
#[derive(Debug)]
pub struct VaultClient {
    session: Arc<WalletSession>,
    tokens: Arc<TokenRegistry>,
    tracker: Arc<TransactionTracker>,
    balances: DashMap<VaultKey, VaultBalance>,
}

impl VaultClient {
    /// Client sharing the session's token registry and transaction tracker
    pub fn new(tokens: Arc<TokenRegistry>, tracker: Arc<TransactionTracker>) -> Self {
        let session = tracker.session().clone();
        Self { session, tokens, tracker, balances: DashMap::new() }
    }

    /// Vault address for `chain_id`
    pub fn vault_address(&self, chain_id: u64) -> Address {
        self.session.chains().contracts_for(chain_id).vault
    }

    /// Whether the vault is paused.
    ///
    /// A failed read is logged and reported as not paused; the contract
    /// still rejects writes while paused.
    pub async fn is_paused(&self) -> bool {
        let vault = self.vault_address(self.session.active_chain_id());
        let result = match self.session.reader() {
            Ok(reader) => call_contract(&reader, vault, ITokenVault::pausedCall {}).await.map_err(Into::into),
            Err(e) => Err(e),
        };
        match result {
            Ok(paused) => paused,
            Err(e) => {
                warn!(%vault, error = %e, "could not read vault pause state");
                false
            }
        }
    }

    /// `owner`'s ledger balance of `token`
    pub async fn get_user_balance(&self, owner: Address, token: Address) -> Result<VaultBalance> {
        let chain_id = self.session.active_chain_id();
        let vault = self.vault_address(chain_id);
        let info = self.tokens.get_token_info(token).await?;
        let reader = self.session.reader()?;
        let raw = call_contract(&reader, vault, ITokenVault::getUserBalanceCall { user: owner, token })
            .await
            .map_err(|e| e.into_read_error())?;

        let entry = VaultBalance {
            vault,
            symbol: info.symbol,
            balance: Balance::new(owner, token, raw, info.decimals),
        };
        if self.session.active_chain_id() == chain_id {
            self.balances.insert((chain_id, token, owner), entry.clone());
        }
        Ok(entry)
    }

    /// Ledger balances for several tokens, read concurrently. Tokens whose
    /// read fails are logged and left out.
    pub async fn get_all_balances(&self, owner: Address, tokens: &[Address]) -> Vec<VaultBalance> {
        let reads = tokens.iter().map(|&token| async move { (token, self.get_user_balance(owner, token).await) });
        join_all(reads)
            .await
            .into_iter()
            .filter_map(|(token, result)| match result {
                Ok(balance) => Some(balance),
                Err(e) => {
                    warn!(%token, %owner, error = %e, "vault balance unavailable");
                    None
                }
            })
            .collect()
    }

    /// Ledger balances for every supported token of the active chain
    pub async fn get_supported_balances(&self, owner: Address) -> Vec<VaultBalance> {
        let tokens = self.session.chains().contracts_for(self.session.active_chain_id()).token_addresses();
        self.get_all_balances(owner, &tokens).await
    }

    /// Last ledger balance read on the active chain
    pub fn vault_balance(&self, owner: Address, token: Address) -> Option<VaultBalance> {
        self.balances.get(&(self.session.active_chain_id(), token, owner)).map(|b| b.clone())
    }

    /// Approves the vault for `amount` of `token`, then deposits it.
    ///
    /// The deposit is only sent once the approval is confirmed. A rejected
    /// or reverted approval aborts the whole operation, and so does any
    /// change of account or chain between the two steps.
    pub async fn deposit(&self, token: Address, amount: &str) -> Result<DepositOutcome> {
        let signer = self.session.signer()?;
        if self.is_paused().await {
            return Err(TokenVaultError::VaultPaused);
        }
        let info = self.tokens.get_token_info(token).await?;
        let raw = parse_units(amount, info.decimals)?;
        if raw.is_zero() {
            return Err(TokenVaultError::InvalidAmount("amount must be greater than zero".into()));
        }
        let vault = self.vault_address(signer.chain_id);

        let approve = ContractCall::new(token, &IERC20::approveCall { spender: vault, amount: raw });
        let submitted = self.tracker.submit(&signer, &approve, TransactionKind::Approve, None).await?;
        let approval = self.tracker.wait_for_inclusion(submitted.hash).await?;
        debug!(hash = %approval.hash, "approval confirmed");

        self.session.ensure_current(&signer)?;
        let call = ContractCall::new(vault, &ITokenVault::depositCall { token, amount: raw });
        let deposit = self.tracker.send_and_confirm(&signer, &call, TransactionKind::Deposit, None).await?;
        info!(%token, amount, symbol = %info.symbol, hash = %deposit.hash, "deposit confirmed");

        self.refresh(signer.account, token).await;
        Ok(DepositOutcome { approval, deposit })
    }

    /// Withdraws `amount` of `token` from the vault
    pub async fn withdraw(&self, token: Address, amount: &str) -> Result<PendingTransaction> {
        let signer = self.session.signer()?;
        if self.is_paused().await {
            return Err(TokenVaultError::VaultPaused);
        }
        let info = self.tokens.get_token_info(token).await?;
        let raw = parse_units(amount, info.decimals)?;
        if raw.is_zero() {
            return Err(TokenVaultError::InvalidAmount("amount must be greater than zero".into()));
        }

        let call = ContractCall::new(self.vault_address(signer.chain_id), &ITokenVault::withdrawCall { token, amount: raw });
        let withdrawal = self.tracker.send_and_confirm(&signer, &call, TransactionKind::Withdraw, None).await?;
        info!(%token, amount, symbol = %info.symbol, hash = %withdrawal.hash, "withdrawal confirmed");

        self.refresh(signer.account, token).await;
        Ok(withdrawal)
    }

    async fn refresh(&self, owner: Address, token: Address) {
        if let Err(e) = self.get_user_balance(owner, token).await {
            debug!(%token, error = %e, "post-transaction balance refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ChainRegistry, SEPOLIA_VAULT};
    use crate::tx::TransactionStatus;
    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;
    use std::time::Duration;
    use tokenvault_testing::{MockProvider, MockReply, ACCOUNT, SEPOLIA, USDC};

    async fn client(mock: &Arc<MockProvider>) -> VaultClient {
        mock.on_call(USDC, IERC20::nameCall::SELECTOR, MockReply::string("USD Coin"))
            .on_call(USDC, IERC20::symbolCall::SELECTOR, MockReply::string("USDC"))
            .on_call(USDC, IERC20::decimalsCall::SELECTOR, MockReply::uint(6u8))
            .on_call(SEPOLIA_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::boolean(false))
            .on_call(SEPOLIA_VAULT, ITokenVault::getUserBalanceCall::SELECTOR, MockReply::uint(2_000_000u64))
            .auto_mine();
        let session = Arc::new(WalletSession::new(Some(mock.clone()), Arc::new(ChainRegistry::new())));
        session.connect().await.unwrap();
        let tokens = Arc::new(TokenRegistry::new(session.clone()));
        let tracker = Arc::new(TransactionTracker::with_timing(
            session,
            Duration::from_millis(10),
            Duration::from_secs(5),
        ));
        VaultClient::new(tokens, tracker)
    }

    #[tokio::test]
    async fn test_is_paused() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;
        assert!(!vault.is_paused().await);

        mock.on_call(SEPOLIA_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::boolean(true));
        assert!(vault.is_paused().await);

        // unreadable pause state counts as not paused
        mock.on_call(SEPOLIA_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::error(-32000, "boom"));
        assert!(!vault.is_paused().await);
    }

    #[tokio::test]
    async fn test_get_user_balance() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;

        let entry = vault.get_user_balance(ACCOUNT, USDC).await.unwrap();
        assert_eq!(entry.vault, SEPOLIA_VAULT);
        assert_eq!(entry.symbol, "USDC");
        assert_eq!(entry.balance.raw, U256::from(2_000_000u64));
        assert_eq!(entry.balance.display, "2.0000");
        assert_eq!(vault.vault_balance(ACCOUNT, USDC), Some(entry));
    }

    #[tokio::test]
    async fn test_get_all_balances_omits_failures() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;
        // ACCOUNT is not a token: its metadata lookup fails
        let balances = vault.get_all_balances(ACCOUNT, &[USDC, ACCOUNT]).await;
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].balance.token, USDC);
    }

    #[tokio::test]
    async fn test_deposit_approves_then_deposits() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;

        let outcome = vault.deposit(USDC, "1.5").await.unwrap();
        assert_eq!(outcome.approval.kind, TransactionKind::Approve);
        assert_eq!(outcome.approval.status, TransactionStatus::Confirmed);
        assert_eq!(outcome.deposit.kind, TransactionKind::Deposit);
        assert_eq!(outcome.deposit.status, TransactionStatus::Confirmed);

        let sent = mock.calls_to("eth_sendTransaction");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to(), Some(USDC));
        assert_eq!(sent[0].selector(), Some(IERC20::approveCall::SELECTOR));
        let approve = IERC20::approveCall::abi_decode(&sent[0].data().unwrap()).unwrap();
        assert_eq!(approve.spender, SEPOLIA_VAULT);
        assert_eq!(approve.amount, U256::from(1_500_000u64));

        assert_eq!(sent[1].to(), Some(SEPOLIA_VAULT));
        let deposit = ITokenVault::depositCall::abi_decode(&sent[1].data().unwrap()).unwrap();
        assert_eq!(deposit.token, USDC);
        assert_eq!(deposit.amount, U256::from(1_500_000u64));
    }

    #[tokio::test]
    async fn test_deposit_rejected_approval_sends_nothing_else() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;
        mock.enqueue("eth_sendTransaction", MockReply::rejected());

        let err = vault.deposit(USDC, "1").await.unwrap_err();
        assert_eq!(err, TokenVaultError::TransactionRejected);
        assert_eq!(mock.count("eth_sendTransaction"), 1);
    }

    #[tokio::test]
    async fn test_deposit_reverted_approval_aborts() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;
        mock.revert_on(USDC, IERC20::approveCall::SELECTOR);

        let err = vault.deposit(USDC, "1").await.unwrap_err();
        assert!(matches!(err, TokenVaultError::TransactionReverted { hash: Some(_) }));
        assert_eq!(mock.count("eth_sendTransaction"), 1);
    }

    #[tokio::test]
    async fn test_deposit_while_paused_never_prompts() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;
        mock.on_call(SEPOLIA_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::boolean(true));

        assert_eq!(vault.deposit(USDC, "1").await.unwrap_err(), TokenVaultError::VaultPaused);
        assert_eq!(vault.withdraw(USDC, "1").await.unwrap_err(), TokenVaultError::VaultPaused);
        assert_eq!(mock.count("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_deposit_rejects_bad_amounts() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;

        for amount in ["", "abc", "-1", "0", "1.1234567"] {
            let err = vault.deposit(USDC, amount).await.unwrap_err();
            assert!(matches!(err, TokenVaultError::InvalidAmount(_)), "{amount}: {err}");
        }
        assert_eq!(mock.count("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_deposit_requires_connection() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;
        vault.session.disconnect_wallet();

        assert_eq!(vault.deposit(USDC, "1").await.unwrap_err(), TokenVaultError::WalletNotConnected);
        assert_eq!(mock.count("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_withdraw() {
        let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
        let vault = client(&mock).await;

        let tx = vault.withdraw(USDC, "0.25").await.unwrap();
        assert_eq!(tx.kind, TransactionKind::Withdraw);
        assert_eq!(tx.status, TransactionStatus::Confirmed);

        let sent = mock.calls_to("eth_sendTransaction");
        assert_eq!(sent.len(), 1);
        let withdraw = ITokenVault::withdrawCall::abi_decode(&sent[0].data().unwrap()).unwrap();
        assert_eq!(withdraw.amount, U256::from(250_000u64));
    }
}
