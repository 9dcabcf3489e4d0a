//! Settlement service collaborators
//!
//! The settlement contract is opaque to this crate. It is reached through two
//! async interfaces: one that places the encoded bid and returns a
//! transaction reference, and one that reports receipts for that reference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::abi::{AbiError, CallSignature};
use crate::encoder::EncodedAmount;
use crate::wallet::WalletAddress;

/// Opaque handle of an accepted settlement call (a transaction hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRef(String);

impl TransactionRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of an included transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    pub block_number: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The signer declined the request
    #[error("Request rejected by signer: {0}")]
    Rejected(String),

    /// JSON-RPC level error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Network failure or HTTP error status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Call data could not be built
    #[error("Encoding error: {0}")]
    Encoding(#[from] AbiError),

    /// Malformed response
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Places encoded bids with the settlement contract
#[async_trait]
pub trait SettlementService: Send + Sync {
    /// Submit one bid; no funds accompany the call
    async fn place_encrypted_bid(
        &self,
        bond_id: u64,
        encoded_amount: EncodedAmount,
    ) -> Result<TransactionRef, SettlementError>;
}

/// Reports on-chain inclusion of submitted transactions
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// Single lookup, `None` while not yet included
    async fn receipt(&self, tx_ref: &TransactionRef) -> Result<Option<Receipt>, SettlementError>;

    /// Current head block
    async fn block_number(&self) -> Result<u64, SettlementError>;

    /// Poll until a receipt exists
    async fn wait_for_receipt(
        &self,
        tx_ref: &TransactionRef,
        poll_interval: Duration,
    ) -> Result<Receipt, SettlementError> {
        loop {
            if let Some(receipt) = self.receipt(tx_ref).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Where and how bids are placed
///
/// Injected rather than embedded in the controller, so deployments and tests
/// can point at their own contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementTarget {
    pub contract: WalletAddress,
    pub call: CallSignature,
    pub decimals: u32,
}
