//! Contract interfaces

use alloy::primitives::Address;
use alloy::sol;
use alloy::sol_types::SolCall;
use tokenvault_provider::{ProviderError, TypedProvider};

sol! {
    /// ERC-20 token
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);

        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Custodial token vault
    interface ITokenVault {
        event Deposit(address indexed user, address indexed token, uint256 amount);
        event Withdrawal(address indexed user, address indexed token, uint256 amount);

        function getUserBalance(address user, address token) external view returns (uint256);
        function paused() external view returns (bool);
        function deposit(address token, uint256 amount) external;
        function withdraw(address token, uint256 amount) external;
    }
}

/// Read-only call of a typed contract function against the latest block
pub async fn call_contract<C: SolCall>(
    provider: &TypedProvider,
    to: Address,
    call: C,
) -> Result<C::Return, ProviderError> {
    let data = provider.call(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&data)
        .map_err(|e| ProviderError::malformed("eth_call", format!("{}: {e}", C::SIGNATURE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{b256, hex};
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_erc20_selectors() {
        assert_eq!(IERC20::transferCall::SELECTOR, hex!("a9059cbb"));
        assert_eq!(IERC20::approveCall::SELECTOR, hex!("095ea7b3"));
        assert_eq!(IERC20::balanceOfCall::SELECTOR, hex!("70a08231"));
        assert_eq!(IERC20::decimalsCall::SELECTOR, hex!("313ce567"));
        assert_eq!(IERC20::nameCall::SELECTOR, hex!("06fdde03"));
        assert_eq!(IERC20::symbolCall::SELECTOR, hex!("95d89b41"));
    }

    #[test]
    fn test_transfer_topic() {
        assert_eq!(
            IERC20::Transfer::SIGNATURE_HASH,
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_vault_paused_selector() {
        assert_eq!(ITokenVault::pausedCall::SELECTOR, hex!("5c975abb"));
    }
}

#[cfg(test)]
mod call_tests {
    use super::*;
    use alloy::primitives::U256;
    use std::sync::Arc;
    use tokenvault_testing::{MockProvider, MockReply, ACCOUNT, USDC};

    #[tokio::test]
    async fn test_call_contract_decodes() {
        let mock = Arc::new(MockProvider::new());
        mock.on_call(USDC, IERC20::balanceOfCall::SELECTOR, MockReply::uint(1_500_000u64));
        mock.on_call(USDC, IERC20::symbolCall::SELECTOR, MockReply::string("USDC"));
        let provider = TypedProvider::new(mock.clone());

        let raw = call_contract(&provider, USDC, IERC20::balanceOfCall { account: ACCOUNT }).await.unwrap();
        assert_eq!(raw, U256::from(1_500_000u64));
        let symbol = call_contract(&provider, USDC, IERC20::symbolCall {}).await.unwrap();
        assert_eq!(symbol, "USDC");

        let call = &mock.calls_to("eth_call")[0];
        assert_eq!(call.to(), Some(USDC));
        assert_eq!(call.params[1], serde_json::json!("latest"));
    }

    #[tokio::test]
    async fn test_call_contract_short_return_is_malformed() {
        let mock = Arc::new(MockProvider::new());
        mock.on_call(USDC, IERC20::decimalsCall::SELECTOR, MockReply::bytes([0u8; 4]));
        let provider = TypedProvider::new(mock);

        let err = call_contract(&provider, USDC, IERC20::decimalsCall {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }
}
