//! Structured logging for the bid lifecycle

use crate::encoder::EncodedAmount;
use crate::errors::BidError;
use crate::observability::SubmissionId;
use crate::settlement::TransactionRef;
use crate::validator::ValidatedAmount;

/// Structured logger bound to one bid card
#[derive(Debug, Clone)]
pub struct BidLogger {
    bond_id: String,
}

impl BidLogger {
    pub fn new(bond_id: impl Into<String>) -> Self {
        Self {
            bond_id: bond_id.into(),
        }
    }

    pub fn log_rejected(&self, error: &BidError) {
        tracing::info!(
            bond_id = %self.bond_id,
            category = error.category(),
            error = %error,
            "Bid rejected before submission"
        );
    }

    pub fn log_submitted(&self, id: &SubmissionId, amount: &ValidatedAmount, encoded: EncodedAmount) {
        tracing::info!(
            submission_id = %id,
            bond_id = %self.bond_id,
            amount = %amount,
            encoded = %encoded,
            "Submitting encrypted bid"
        );
    }

    pub fn log_accepted(&self, id: &SubmissionId, tx_ref: &TransactionRef, latency_ms: u64) {
        tracing::info!(
            submission_id = %id,
            bond_id = %self.bond_id,
            tx = %tx_ref,
            latency_ms = %latency_ms,
            "Bid accepted by settlement service"
        );
    }

    pub fn log_transition(&self, id: &SubmissionId, from: &str, to: &str) {
        tracing::debug!(
            submission_id = %id,
            bond_id = %self.bond_id,
            from = %from,
            to = %to,
            "Submission transition"
        );
    }

    pub fn log_ignored(&self, id: &SubmissionId, current: &str, event: &str) {
        tracing::debug!(
            submission_id = %id,
            bond_id = %self.bond_id,
            current = %current,
            event = %event,
            "Ignoring stale lifecycle event"
        );
    }

    pub fn log_confirmed(&self, id: &SubmissionId, tx_ref: Option<&TransactionRef>, latency_ms: u64) {
        tracing::info!(
            submission_id = %id,
            bond_id = %self.bond_id,
            tx = ?tx_ref.map(TransactionRef::as_str),
            latency_ms = %latency_ms,
            "Bid confirmed"
        );
    }

    pub fn log_failed(&self, id: &SubmissionId, error: &BidError, latency_ms: u64) {
        tracing::warn!(
            submission_id = %id,
            bond_id = %self.bond_id,
            category = error.category(),
            error = %error,
            latency_ms = %latency_ms,
            "Bid failed"
        );
    }

    pub fn log_detached(&self, id: &SubmissionId, tx_ref: Option<&TransactionRef>) {
        tracing::info!(
            submission_id = %id,
            bond_id = %self.bond_id,
            tx = ?tx_ref.map(TransactionRef::as_str),
            "Stopped tracking bid, transaction left untouched"
        );
    }
}
