//! In-memory settlement doubles
//!
//! Used by the CLI's simulation mode and by tests. Everything is
//! deterministic: transaction hashes come from a counter and the chain head
//! advances by one block per `block_number` query.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::encoder::EncodedAmount;
use crate::settlement::{
    Receipt, ReceiptSource, SettlementError, SettlementService, TransactionRef,
};

/// How the mock settlement answers `place_encrypted_bid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementBehavior {
    Accept,
    /// Accept after a delay
    AcceptAfter(Duration),
    /// Signer declines
    Reject(String),
    /// Never answers
    Hang,
}

/// Mock settlement service recording every call
#[derive(Clone)]
pub struct MockSettlement {
    behavior: Arc<Mutex<PlacementBehavior>>,
    calls: Arc<Mutex<Vec<(u64, EncodedAmount)>>>,
    counter: Arc<AtomicU64>,
}

impl MockSettlement {
    /// Create a MockSettlement that accepts every bid
    pub fn new() -> Self {
        Self::with_behavior(PlacementBehavior::Accept)
    }

    pub fn with_behavior(behavior: PlacementBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            calls: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_behavior(&self, behavior: PlacementBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Every `(bond_id, encoded_amount)` received, in order
    pub fn calls(&self) -> Vec<(u64, EncodedAmount)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for MockSettlement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementService for MockSettlement {
    async fn place_encrypted_bid(
        &self,
        bond_id: u64,
        encoded_amount: EncodedAmount,
    ) -> Result<TransactionRef, SettlementError> {
        self.calls.lock().push((bond_id, encoded_amount));
        let behavior = self.behavior.lock().clone();

        match behavior {
            PlacementBehavior::Accept => {}
            PlacementBehavior::AcceptAfter(delay) => tokio::time::sleep(delay).await,
            PlacementBehavior::Reject(reason) => return Err(SettlementError::Rejected(reason)),
            PlacementBehavior::Hang => std::future::pending::<()>().await,
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransactionRef::new(format!("0x{:064x}", n)))
    }
}

/// How the mock chain treats submitted transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptBehavior {
    /// Included successfully after the given number of receipt polls
    Succeed { after_polls: usize },
    /// Included but reverted after the given number of receipt polls
    Revert { after_polls: usize },
    /// Receipt lookups fail
    Error,
    /// Never included
    Never,
}

/// Mock receipt source
#[derive(Clone)]
pub struct MockReceipts {
    behavior: Arc<Mutex<ReceiptBehavior>>,
    polls: Arc<AtomicUsize>,
    head: Arc<AtomicU64>,
    inclusion_block: u64,
}

impl MockReceipts {
    pub fn new(behavior: ReceiptBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            polls: Arc::new(AtomicUsize::new(0)),
            head: Arc::new(AtomicU64::new(100)),
            inclusion_block: 100,
        }
    }

    /// Included successfully on the first poll
    pub fn succeeding() -> Self {
        Self::new(ReceiptBehavior::Succeed { after_polls: 1 })
    }

    pub fn set_behavior(&self, behavior: ReceiptBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptSource for MockReceipts {
    async fn receipt(&self, _tx_ref: &TransactionRef) -> Result<Option<Receipt>, SettlementError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = *self.behavior.lock();

        let included = |success| Receipt {
            success,
            block_number: self.inclusion_block,
        };

        match behavior {
            ReceiptBehavior::Succeed { after_polls } => {
                Ok((polls >= after_polls).then(|| included(true)))
            }
            ReceiptBehavior::Revert { after_polls } => {
                Ok((polls >= after_polls).then(|| included(false)))
            }
            ReceiptBehavior::Error => Err(SettlementError::Transport("connection reset".to_string())),
            ReceiptBehavior::Never => Ok(None),
        }
    }

    async fn block_number(&self) -> Result<u64, SettlementError> {
        Ok(self.head.fetch_add(1, Ordering::SeqCst))
    }
}
