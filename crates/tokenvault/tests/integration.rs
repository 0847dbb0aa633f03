//! End-to-end flows through the client facade against a scripted wallet
//!
//! Tests cover:
//! - Connect, token metadata and balance display
//! - Deposit ordering and abort paths
//! - Session changes while a flow is in flight
//! - Network switching and per-chain contracts
//! - Live balance watches

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use alloy::sol_types::SolCall;
use tokenvault::abi::{IERC20, ITokenVault};
use tokenvault::chains::{ANVIL_CHAIN_ID, ANVIL_USDC, ANVIL_VAULT, SEPOLIA_VAULT};
use tokenvault::prelude::*;
use tokenvault::ConnectionStatus;
use tokenvault_testing::{init_tracing, MockProvider, MockReply, ACCOUNT, OTHER_ACCOUNT, SEPOLIA, USDC};

fn fast_config() -> ClientConfig {
    ClientConfig { receipt_poll_interval_ms: 10, confirmation_timeout_secs: 5, ..Default::default() }
}

fn scripted_wallet() -> Arc<MockProvider> {
    init_tracing();
    let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
    mock.on_call(USDC, IERC20::nameCall::SELECTOR, MockReply::string("USD Coin"))
        .on_call(USDC, IERC20::symbolCall::SELECTOR, MockReply::string("USDC"))
        .on_call(USDC, IERC20::decimalsCall::SELECTOR, MockReply::uint(6u8))
        .on_call(USDC, IERC20::balanceOfCall::SELECTOR, MockReply::uint(1_500_000u64))
        .on_call(SEPOLIA_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::boolean(false))
        .on_call(SEPOLIA_VAULT, ITokenVault::getUserBalanceCall::SELECTOR, MockReply::uint(0u8))
        .auto_mine();
    mock
}

async fn connected(mock: &Arc<MockProvider>) -> TokenVault {
    let client = TokenVault::new(Some(mock.clone()), &fast_config()).unwrap();
    client.connect().await.unwrap();
    client
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Read Path
// ============================================================================

mod read_path {
    use super::*;

    #[tokio::test]
    async fn test_connect_then_read_usdc_balance() {
        let mock = scripted_wallet();
        let client = TokenVault::new(Some(mock.clone()), &fast_config()).unwrap();

        let state = client.connect().await.unwrap();
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert_eq!(state.account(), Some(ACCOUNT));
        assert!(state.is_supported_network());

        let usdc = client.session().chains().contracts_for(SEPOLIA).token("usdc").unwrap();
        assert_eq!(usdc, USDC);

        let info = client.tokens().get_token_info(usdc).await.unwrap();
        assert_eq!((info.name.as_str(), info.symbol.as_str(), info.decimals), ("USD Coin", "USDC", 6));

        let balance = client.balances().get_balance(usdc, ACCOUNT).await.unwrap();
        assert_eq!(balance.raw, U256::from(1_500_000u64));
        assert_eq!(balance.display, "1.5000");
    }

    #[tokio::test]
    async fn test_supported_vault_balances() {
        let mock = scripted_wallet();
        mock.on_call(SEPOLIA_VAULT, ITokenVault::getUserBalanceCall::SELECTOR, MockReply::uint(1_234_567_890u64));
        let client = connected(&mock).await;

        let balances = client.vault().get_supported_balances(ACCOUNT).await;
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].symbol, "USDC");
        assert_eq!(balances[0].balance.display, "1,234.56789");
    }
}

// ============================================================================
// Deposit Flow
// ============================================================================

mod deposit_flow {
    use super::*;

    #[tokio::test]
    async fn test_approval_confirmed_before_deposit_sent() {
        let mock = scripted_wallet();
        mock.receipt_after_polls(2);
        let client = connected(&mock).await;

        let outcome = client.vault().deposit(USDC, "1.5").await.unwrap();

        // approve, its receipt polls, then deposit
        let sequence: Vec<String> = mock
            .calls()
            .into_iter()
            .filter(|c| c.method == "eth_sendTransaction" || c.method == "eth_getTransactionReceipt")
            .map(|c| c.method)
            .collect();
        assert_eq!(sequence[0], "eth_sendTransaction");
        assert_eq!(sequence[1..4], ["eth_getTransactionReceipt"; 3]);
        assert_eq!(sequence[4], "eth_sendTransaction");

        assert_eq!(
            mock.sent_selectors(),
            vec![Some(IERC20::approveCall::SELECTOR), Some(ITokenVault::depositCall::SELECTOR)]
        );
        let tracked = client.transactions();
        assert_eq!(tracked.status(outcome.approval.hash), Some(TransactionStatus::Confirmed));
        assert_eq!(tracked.status(outcome.deposit.hash), Some(TransactionStatus::Confirmed));
        assert!(tracked.pending().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_approval_aborts() {
        let mock = scripted_wallet();
        mock.enqueue("eth_sendTransaction", MockReply::rejected());
        let client = connected(&mock).await;

        let err = client.vault().deposit(USDC, "1").await.unwrap_err();
        assert_eq!(err, TokenVaultError::TransactionRejected);
        assert!(err.is_user_rejection());
        assert_eq!(mock.sent_selectors().len(), 1);
    }

    #[tokio::test]
    async fn test_reverted_approval_aborts() {
        let mock = scripted_wallet();
        mock.revert_on(USDC, IERC20::approveCall::SELECTOR);
        let client = connected(&mock).await;

        let err = client.vault().deposit(USDC, "1").await.unwrap_err();
        let hash = err.transaction_hash().map(str::to_string);
        assert!(hash.is_some());
        assert_eq!(mock.sent_selectors(), vec![Some(IERC20::approveCall::SELECTOR)]);
    }

    #[tokio::test]
    async fn test_paused_vault_never_prompts() {
        let mock = scripted_wallet();
        mock.on_call(SEPOLIA_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::boolean(true));
        let client = connected(&mock).await;

        assert_eq!(client.vault().deposit(USDC, "1").await.unwrap_err(), TokenVaultError::VaultPaused);
        assert_eq!(mock.count("eth_sendTransaction"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_switch_between_approve_and_deposit() {
        let mock = scripted_wallet();
        mock.receipt_after_polls(3);
        let client = Arc::new(connected(&mock).await);

        let deposit = tokio::spawn({
            let client = client.clone();
            async move { client.vault().deposit(USDC, "2").await }
        });
        while mock.count("eth_sendTransaction") == 0 {
            tokio::task::yield_now().await;
        }

        mock.emit(ProviderEvent::AccountsChanged(vec![OTHER_ACCOUNT.to_string()]));
        settle().await;
        assert_eq!(client.session().state().account(), Some(OTHER_ACCOUNT));

        let err = deposit.await.unwrap().unwrap_err();
        assert_eq!(err, TokenVaultError::SessionChanged);
        assert_eq!(mock.sent_selectors(), vec![Some(IERC20::approveCall::SELECTOR)]);
    }
}

// ============================================================================
// Networks
// ============================================================================

mod networks {
    use super::*;

    #[tokio::test]
    async fn test_switch_to_unknown_chain_is_unsupported() {
        let mock = scripted_wallet();
        let client = connected(&mock).await;

        let err = client.session().switch_network(999_999).await.unwrap_err();
        assert_eq!(err, TokenVaultError::UnsupportedNetwork { chain_id: 999_999 });
        assert_eq!(mock.count("wallet_switchEthereumChain"), 0);
        assert_eq!(mock.count("wallet_addEthereumChain"), 0);
    }

    #[tokio::test]
    async fn test_switch_uses_that_chains_contracts() {
        let mock = scripted_wallet();
        let client = connected(&mock).await;

        mock.enqueue("wallet_switchEthereumChain", MockReply::error(4902, "Unrecognized chain ID"))
            .on("wallet_switchEthereumChain", MockReply::ok(serde_json::Value::Null))
            .on("wallet_addEthereumChain", MockReply::ok(serde_json::Value::Null))
            .on("eth_chainId", MockReply::quantity(ANVIL_CHAIN_ID));
        client.session().switch_network(ANVIL_CHAIN_ID).await.unwrap();
        assert_eq!(client.session().state().chain_id(), Some(ANVIL_CHAIN_ID));
        assert_eq!(mock.count("wallet_addEthereumChain"), 1);
        assert_eq!(mock.count("wallet_switchEthereumChain"), 2);

        mock.on_call(ANVIL_VAULT, ITokenVault::pausedCall::SELECTOR, MockReply::boolean(true));
        assert!(client.vault().is_paused().await);
        assert_eq!(client.vault().vault_address(ANVIL_CHAIN_ID), ANVIL_VAULT);
        assert_eq!(client.session().chains().contracts_for(ANVIL_CHAIN_ID).token("USDC"), Some(ANVIL_USDC));
    }

    #[tokio::test]
    async fn test_chain_change_clears_token_cache() {
        let mock = scripted_wallet();
        let client = connected(&mock).await;

        client.tokens().get_token_info(USDC).await.unwrap();
        assert!(client.tokens().cached(USDC).is_some());

        mock.emit(ProviderEvent::ChainChanged(format!("{ANVIL_CHAIN_ID:#x}")));
        settle().await;
        assert_eq!(client.session().active_chain_id(), ANVIL_CHAIN_ID);
        assert!(client.tokens().cached(USDC).is_none());
    }
}

// ============================================================================
// Balance Watch
// ============================================================================

mod balance_watch {
    use super::*;

    #[tokio::test]
    async fn test_incoming_transfer_refreshes_balance() {
        let mock = scripted_wallet();
        let client = connected(&mock).await;
        let mut updates = client.balances().updates();

        let watch = client.balances().watch(USDC, ACCOUNT).await.unwrap();
        mock.on_call(USDC, IERC20::balanceOfCall::SELECTOR, MockReply::uint(3_000_000u64));
        mock.emit_transfer(watch.subscription_id(), USDC, OTHER_ACCOUNT, ACCOUNT, U256::from(1_500_000u64));

        let update = tokio::time::timeout(Duration::from_secs(5), updates.recv()).await.unwrap().unwrap();
        assert_eq!(update.raw, U256::from(3_000_000u64));
        assert_eq!(update.display, "3.0000");

        watch.release().await;
        assert!(mock.active_subscriptions().is_empty());
        assert_eq!(mock.count("eth_unsubscribe"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_ends_watch() {
        let mock = scripted_wallet();
        let client = connected(&mock).await;

        let watch = client.balances().watch(USDC, ACCOUNT).await.unwrap();
        mock.emit(ProviderEvent::Disconnect { code: 4900, message: "disconnected".into() });
        for _ in 0..50 {
            if !watch.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!watch.is_active());
        assert!(mock.active_subscriptions().is_empty());
    }
}
