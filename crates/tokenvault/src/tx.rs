//! Transaction submission and confirmation tracking.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokenvault_error::{Result, TokenVaultError};
use tokenvault_provider::{transaction_request, ProviderError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::session::{Signer, WalletSession};

/// What a transaction does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionKind {
    /// ERC-20 `approve` ahead of a vault deposit
    Approve,
    /// Vault `deposit`
    Deposit,
    /// Vault `withdraw`
    Withdraw,
    /// ERC-20 `transfer`
    TransferToken,
    /// Native value transfer
    TransferNative,
    /// Any other contract write
    ContractCall,
}

/// Confirmation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionStatus {
    /// Submitted, no receipt yet
    Pending,
    /// Receipt status `0x1`
    Confirmed,
    /// Receipt status `0x0`
    Reverted,
}

/// A submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    /// Transaction hash
    pub hash: B256,
    /// What it does
    pub kind: TransactionKind,
    /// Sender
    pub from: Address,
    /// Chain it was sent on
    pub chain_id: u64,
    /// Submission time
    pub submitted_at: DateTime<Utc>,
    /// Confirmation state
    pub status: TransactionStatus,
}

impl PendingTransaction {
    /// Whether a receipt has settled the transaction
    pub fn is_terminal(&self) -> bool {
        self.status != TransactionStatus::Pending
    }
}

/// A write ready to be sent: target, calldata and native value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Contract or recipient
    pub to: Address,
    /// Calldata
    pub data: Bytes,
    /// Native value
    pub value: U256,
}

impl ContractCall {
    /// Encodes a typed contract call
    pub fn new<C: SolCall>(to: Address, call: &C) -> Self {
        Self { to, data: call.abi_encode().into(), value: U256::ZERO }
    }

    /// Plain value transfer
    pub fn native(to: Address, value: U256) -> Self {
        Self { to, data: Bytes::new(), value }
    }

    /// Attaches native value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    fn request(&self, from: Address) -> TransactionRequest {
        transaction_request(Some(from), self.to, self.data.clone(), self.value)
    }
}

/// Submits transactions through the session's signer and tracks them
/// until their receipts settle.
pub struct TransactionTracker {
    session: Arc<WalletSession>,
    records: DashMap<B256, PendingTransaction>,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for TransactionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTracker")
            .field("records", &self.records.len())
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TransactionTracker {
    /// Tracker using the configured poll interval and timeout
    pub fn new(session: Arc<WalletSession>, config: &ClientConfig) -> Self {
        Self::with_timing(session, config.receipt_poll_interval(), config.confirmation_timeout())
    }

    /// Tracker with explicit timing
    pub fn with_timing(session: Arc<WalletSession>, poll_interval: Duration, timeout: Duration) -> Self {
        Self { session, records: DashMap::new(), poll_interval, timeout }
    }

    /// The session transactions are signed through
    pub fn session(&self) -> &Arc<WalletSession> {
        &self.session
    }

    /// Simulates `call`; a revert or any other failure is `EstimationFailed`
    pub async fn estimate_gas(&self, signer: &Signer, call: &ContractCall) -> Result<u64> {
        let tx = call.request(signer.account);
        signer.provider().estimate_gas(&tx).await.map_err(|e| {
            debug!(to = %call.to, error = %e, "gas estimation failed");
            match e {
                ProviderError::Rpc { message, .. } => TokenVaultError::EstimationFailed(message),
                other => TokenVaultError::EstimationFailed(other.to_string()),
            }
        })
    }

    /// Sends `call` as the signer's account and records it as pending
    pub async fn submit(
        &self,
        signer: &Signer,
        call: &ContractCall,
        kind: TransactionKind,
        gas: Option<u64>,
    ) -> Result<PendingTransaction> {
        self.session.ensure_current(signer)?;

        let mut tx = call.request(signer.account);
        if let Some(gas) = gas {
            tx = tx.with_gas_limit(gas);
        }

        let hash = match signer.provider().send_transaction(&tx).await {
            Ok(hash) => hash,
            Err(e) => {
                let err = e.into_write_error();
                if err.is_user_rejection() {
                    debug!(?kind, "transaction rejected by user");
                } else {
                    warn!(?kind, error = %err, "transaction submission failed");
                }
                return Err(err);
            }
        };

        let record = PendingTransaction {
            hash,
            kind,
            from: signer.account,
            chain_id: signer.chain_id,
            submitted_at: Utc::now(),
            status: TransactionStatus::Pending,
        };
        self.records.insert(hash, record.clone());
        info!(%hash, ?kind, "transaction submitted");
        Ok(record)
    }

    /// Polls for the receipt of a tracked transaction.
    ///
    /// Read failures while polling are logged and polling continues. On
    /// timeout the record stays `Pending`.
    pub async fn wait_for_inclusion(&self, hash: B256) -> Result<PendingTransaction> {
        if !self.records.contains_key(&hash) {
            return Err(TokenVaultError::UnknownTransaction { hash: hash.to_string() });
        }
        let reader = self.session.reader()?;
        let deadline = Instant::now() + self.timeout;

        loop {
            match reader.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    let status = if ReceiptResponse::status(&receipt) {
                        TransactionStatus::Confirmed
                    } else {
                        TransactionStatus::Reverted
                    };
                    let record = self.set_status(hash, status)?;
                    if status == TransactionStatus::Reverted {
                        warn!(%hash, kind = ?record.kind, "transaction reverted");
                        return Err(TokenVaultError::TransactionReverted { hash: Some(hash.to_string()) });
                    }
                    info!(%hash, kind = ?record.kind, block = ?ReceiptResponse::block_number(&receipt), "transaction confirmed");
                    return Ok(record);
                }
                Ok(None) => {}
                Err(e) => warn!(%hash, error = %e, "receipt lookup failed, retrying"),
            }

            if Instant::now() >= deadline {
                warn!(%hash, "no receipt before the confirmation deadline");
                return Err(TokenVaultError::ConfirmationTimeout {
                    hash: hash.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// [`submit`](Self::submit) followed by
    /// [`wait_for_inclusion`](Self::wait_for_inclusion)
    pub async fn send_and_confirm(
        &self,
        signer: &Signer,
        call: &ContractCall,
        kind: TransactionKind,
        gas: Option<u64>,
    ) -> Result<PendingTransaction> {
        let pending = self.submit(signer, call, kind, gas).await?;
        self.wait_for_inclusion(pending.hash).await
    }

    fn set_status(&self, hash: B256, status: TransactionStatus) -> Result<PendingTransaction> {
        let mut entry = self
            .records
            .get_mut(&hash)
            .ok_or_else(|| TokenVaultError::UnknownTransaction { hash: hash.to_string() })?;
        entry.status = status;
        Ok(entry.clone())
    }

    /// A tracked transaction
    pub fn get(&self, hash: B256) -> Option<PendingTransaction> {
        self.records.get(&hash).map(|r| r.clone())
    }

    /// Status of a tracked transaction
    pub fn status(&self, hash: B256) -> Option<TransactionStatus> {
        self.records.get(&hash).map(|r| r.status)
    }

    /// Transactions still awaiting a receipt, oldest first
    pub fn pending(&self) -> Vec<PendingTransaction> {
        let mut pending: Vec<_> =
            self.records.iter().filter(|r| !r.is_terminal()).map(|r| r.value().clone()).collect();
        pending.sort_by_key(|r| r.submitted_at);
        pending
    }

    /// Drops settled records, returning how many were removed
    pub fn prune_terminal(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| !r.is_terminal());
        before - self.records.len()
    }
}
