//! Transaction lifecycle tracking
//!
//! Follows one transaction reference from acceptance to a terminal outcome:
//!
//! ```text
//! Pending ──receipt(success)──▶ Confirming ──N blocks──▶ Confirmed
//!    │                              │
//!    └── reverted / lookup error / timeout ──▶ Failed
//! ```
//!
//! The tracker never decides inclusion itself, it only reads receipts and
//! the chain head. Stopping a tracker stops *watching*; the transaction is
//! unaffected and may still confirm.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::BidError;
use crate::notify::Notification;
use crate::settlement::{ReceiptSource, TransactionRef};

/// Observable phase of a tracked transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerPhase {
    /// Accepted, not yet included
    Pending,
    /// Included successfully, waiting for confirmations
    Confirming { block_number: u64 },
    Confirmed { block_number: u64 },
    Failed(BidError),
}

impl TrackerPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Delay between receipt / head polls
    pub poll_interval: Duration,
    /// Bound on the whole pending → terminal wait
    pub confirmation_timeout: Duration,
    /// Blocks required, counting the inclusion block
    pub required_confirmations: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(600),
            required_confirmations: 1,
        }
    }
}

/// Drives receipt polling for transaction references
#[derive(Clone)]
pub struct LifecycleTracker {
    receipts: Arc<dyn ReceiptSource>,
    config: TrackerConfig,
}

impl LifecycleTracker {
    pub fn new(receipts: Arc<dyn ReceiptSource>, config: TrackerConfig) -> Self {
        Self { receipts, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Follow `tx_ref` to a terminal phase, reporting every phase in order
    ///
    /// `on_phase` sees `Pending` first and the returned terminal phase last.
    pub async fn observe<F>(&self, tx_ref: &TransactionRef, mut on_phase: F) -> TrackerPhase
    where
        F: FnMut(TrackerPhase) + Send,
    {
        on_phase(TrackerPhase::Pending);

        let waited = self.config.confirmation_timeout;
        let outcome = match tokio::time::timeout(waited, self.follow(tx_ref, &mut on_phase)).await {
            Ok(phase) => phase,
            Err(_) => TrackerPhase::Failed(BidError::Timeout {
                stage: "on-chain confirmation",
                waited,
            }),
        };

        debug!(tx = %tx_ref, phase = ?outcome, "Tracking finished");
        on_phase(outcome.clone());
        outcome
    }

    async fn follow<F>(&self, tx_ref: &TransactionRef, on_phase: &mut F) -> TrackerPhase
    where
        F: FnMut(TrackerPhase) + Send,
    {
        let lookup_failed = |e: crate::settlement::SettlementError| {
            TrackerPhase::Failed(BidError::ExternalRejection(e.to_string()))
        };

        let receipt = match self
            .receipts
            .wait_for_receipt(tx_ref, self.config.poll_interval)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => return lookup_failed(e),
        };

        if !receipt.success {
            return TrackerPhase::Failed(BidError::TransactionReverted {
                tx_ref: tx_ref.to_string(),
                block_number: receipt.block_number,
            });
        }

        let block_number = receipt.block_number;
        info!(tx = %tx_ref, block_number, "Bid transaction included");
        on_phase(TrackerPhase::Confirming { block_number });

        if self.config.required_confirmations > 1 {
            loop {
                match self.receipts.block_number().await {
                    Ok(head)
                        if head.saturating_sub(block_number) + 1
                            >= self.config.required_confirmations =>
                    {
                        break
                    }
                    Ok(_) => {}
                    Err(e) => return lookup_failed(e),
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        TrackerPhase::Confirmed { block_number }
    }

    /// Spawn [`observe`](Self::observe) and expose its phases on a watch channel
    pub fn track(&self, tx_ref: TransactionRef) -> TrackerHandle {
        let (tx, rx) = watch::channel(TrackerPhase::Pending);
        let tracker = self.clone();
        let task_ref = tx_ref.clone();

        let task = tokio::spawn(async move {
            tracker
                .observe(&task_ref, |phase| {
                    tx.send_replace(phase);
                })
                .await;
        });

        TrackerHandle { tx_ref, rx, task }
    }
}

/// A running observation
pub struct TrackerHandle {
    tx_ref: TransactionRef,
    rx: watch::Receiver<TrackerPhase>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn tx_ref(&self) -> &TransactionRef {
        &self.tx_ref
    }

    pub fn phase(&self) -> TrackerPhase {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerPhase> {
        self.rx.clone()
    }

    /// Wait for a terminal phase
    pub async fn wait(&mut self) -> TrackerPhase {
        loop {
            let phase = self.rx.borrow_and_update().clone();
            if phase.is_terminal() || self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }

    /// Stop watching; the transaction itself is not affected
    pub fn stop(self) -> StoppedObservation {
        self.task.abort();
        StoppedObservation {
            tx_ref: self.tx_ref,
            last_phase: self.rx.borrow().clone(),
        }
    }
}

/// What was known when observation stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedObservation {
    pub tx_ref: TransactionRef,
    pub last_phase: TrackerPhase,
}

impl StoppedObservation {
    pub fn notification(&self, bond_id: &str) -> Notification {
        Notification::observation_stopped(bond_id, self.tx_ref.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReceipts, ReceiptBehavior};

    fn tracker(receipts: MockReceipts, required_confirmations: u64) -> LifecycleTracker {
        LifecycleTracker::new(
            Arc::new(receipts),
            TrackerConfig {
                poll_interval: Duration::from_millis(500),
                confirmation_timeout: Duration::from_secs(30),
                required_confirmations,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_in_order() {
        let t = tracker(MockReceipts::new(ReceiptBehavior::Succeed { after_polls: 3 }), 1);
        let mut seen = Vec::new();
        let outcome = t.observe(&TransactionRef::new("0x01"), |p| seen.push(p)).await;

        assert_eq!(outcome, TrackerPhase::Confirmed { block_number: 100 });
        assert_eq!(
            seen,
            vec![
                TrackerPhase::Pending,
                TrackerPhase::Confirming { block_number: 100 },
                TrackerPhase::Confirmed { block_number: 100 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_confirmations() {
        let receipts = MockReceipts::succeeding();
        let t = tracker(receipts.clone(), 3);
        let outcome = t.observe(&TransactionRef::new("0x01"), |_| {}).await;
        assert_eq!(outcome, TrackerPhase::Confirmed { block_number: 100 });
        // head reads 100, 101, 102: the third satisfies three confirmations
        assert_eq!(receipts.block_number().await.unwrap(), 103);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_receipt_fails() {
        let t = tracker(MockReceipts::new(ReceiptBehavior::Revert { after_polls: 1 }), 1);
        let outcome = t.observe(&TransactionRef::new("0x0bad"), |_| {}).await;
        assert_eq!(
            outcome,
            TrackerPhase::Failed(BidError::TransactionReverted {
                tx_ref: "0x0bad".into(),
                block_number: 100
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_error_fails() {
        let t = tracker(MockReceipts::new(ReceiptBehavior::Error), 1);
        let outcome = t.observe(&TransactionRef::new("0x01"), |_| {}).await;
        assert!(matches!(
            outcome,
            TrackerPhase::Failed(BidError::ExternalRejection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_never_included() {
        let t = tracker(MockReceipts::new(ReceiptBehavior::Never), 1);
        let outcome = t.observe(&TransactionRef::new("0x01"), |_| {}).await;
        assert_eq!(
            outcome,
            TrackerPhase::Failed(BidError::Timeout {
                stage: "on-chain confirmation",
                waited: Duration::from_secs(30)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_tracking() {
        let t = tracker(MockReceipts::new(ReceiptBehavior::Succeed { after_polls: 2 }), 1);
        let mut handle = t.track(TransactionRef::new("0x01"));
        assert_eq!(handle.wait().await, TrackerPhase::Confirmed { block_number: 100 });
        assert_eq!(handle.phase(), TrackerPhase::Confirmed { block_number: 100 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_not_cancellation() {
        let receipts = MockReceipts::new(ReceiptBehavior::Never);
        let t = tracker(receipts.clone(), 1);
        let handle = t.track(TransactionRef::new("0xfeed"));
        tokio::time::sleep(Duration::from_secs(2)).await;

        let stopped = handle.stop();
        assert_eq!(stopped.last_phase, TrackerPhase::Pending);
        assert_eq!(stopped.tx_ref.as_str(), "0xfeed");

        let polls = receipts.poll_count();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(receipts.poll_count(), polls);

        let notice = stopped.notification("1");
        assert!(notice.description.contains("may still be recorded"));
    }
}
