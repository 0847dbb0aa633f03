//! Direct token and native currency transfers.

use std::sync::Arc;

use alloy::primitives::Address;
use tokenvault_error::{Result, TokenVaultError};
use tracing::{debug, info};

use crate::abi::IERC20;
use crate::session::WalletSession;
use crate::tx::{ContractCall, PendingTransaction, TransactionKind, TransactionTracker};
use crate::units::{parse_units, NATIVE_DECIMALS};

/// Headroom applied to gas estimates, in percent
pub const GAS_BUFFER_PERCENT: u64 = 120;

/// Gas limit for an estimate: `estimate * 1.2`, rounded down and capped at
/// `u64::MAX`
pub fn buffered_gas(estimate: u64) -> u64 {
    let buffered = u128::from(estimate) * u128::from(GAS_BUFFER_PERCENT) / 100;
    u64::try_from(buffered).unwrap_or(u64::MAX)
}

/// Sends transfers from the connected account
#[derive(Debug)]
pub struct TransferClient {
    session: Arc<WalletSession>,
    tracker: Arc<TransactionTracker>,
}

impl TransferClient {
    /// Client submitting through `tracker`
    pub fn new(tracker: Arc<TransactionTracker>) -> Self {
        Self { session: tracker.session().clone(), tracker }
    }

    /// Transfers `amount` of `token` (with `decimals`) to `to`
    pub async fn transfer_token(
        &self,
        token: Address,
        to: Address,
        amount: &str,
        decimals: u8,
    ) -> Result<PendingTransaction> {
        let signer = self.session.signer()?;
        let raw = parse_units(amount, decimals)?;
        if raw.is_zero() {
            return Err(TokenVaultError::InvalidAmount("amount must be greater than zero".into()));
        }
        let call = ContractCall::new(token, &IERC20::transferCall { to, amount: raw });
        let tx = self.tracker.send_and_confirm(&signer, &call, TransactionKind::TransferToken, None).await?;
        info!(%token, %to, amount, hash = %tx.hash, "token transfer confirmed");
        Ok(tx)
    }

    /// Sends `amount` of the native currency to `to`
    pub async fn transfer_native(&self, to: Address, amount: &str) -> Result<PendingTransaction> {
        let signer = self.session.signer()?;
        let value = parse_units(amount, NATIVE_DECIMALS)?;
        if value.is_zero() {
            return Err(TokenVaultError::InvalidAmount("amount must be greater than zero".into()));
        }
        let call = ContractCall::native(to, value);
        let tx = self.tracker.send_and_confirm(&signer, &call, TransactionKind::TransferNative, None).await?;
        info!(%to, amount, hash = %tx.hash, "native transfer confirmed");
        Ok(tx)
    }

    /// Estimates `call`, then sends it with a 20% gas buffer.
    ///
    /// When the estimate fails nothing is sent.
    pub async fn transfer_with_gas_estimate(&self, call: ContractCall) -> Result<PendingTransaction> {
        let signer = self.session.signer()?;
        let estimate = self.tracker.estimate_gas(&signer, &call).await?;
        let gas = buffered_gas(estimate);
        debug!(estimate, gas, to = %call.to, "gas estimated");
        self.tracker.send_and_confirm(&signer, &call, TransactionKind::ContractCall, Some(gas)).await
    }
}
