//! Error types for bid submission
//!
//! One taxonomy covers the whole life of a bid attempt, from local input
//! checks to the asynchronous settlement outcome. Errors are:
//! - Distinguishable: every variant maps to its own user-facing message
//! - Classified: local vs. remote, with a stable metrics category
//! - Cheap to clone: a failed `Submission` keeps its error for observers

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::notify::{Notification, Severity};

/// Every way a single bid attempt can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BidError {
    /// No wallet session is connected
    ///
    /// Checked before anything else so the user is asked to connect
    /// instead of being shown an amount error.
    #[error("Wallet not connected")]
    WalletNotConnected,

    /// Bid amount is empty, not a number, or not positive
    #[error("Bid amount is missing or not a positive number")]
    MissingAmount,

    /// Bid amount is strictly below the bond's minimum
    #[error("Bid of {amount} is below the minimum bid of {minimum}")]
    BelowMinimum {
        /// Parsed bid amount
        amount: Decimal,
        /// Minimum as listed on the bond (currency formatted)
        minimum: String,
    },

    /// Amount has more fractional digits than the settlement precision
    #[error("Bid of {amount} cannot be represented with {decimals} decimal places")]
    PrecisionLoss { amount: String, decimals: u32 },

    /// Encoded amount does not fit the integer width of the settlement call
    #[error("Bid of {amount} overflows the settlement integer at {decimals} decimal places")]
    AmountOverflow { amount: String, decimals: u32 },

    /// Bond listing data cannot be used for a settlement call
    #[error("Bond {bond_id} is malformed: {reason}")]
    MalformedBond { bond_id: String, reason: String },

    /// Settlement service (or the wallet signing for it) refused the call
    #[error("Settlement service rejected the bid: {0}")]
    ExternalRejection(String),

    /// Transaction was included but reverted
    #[error("Bid transaction {tx_ref} reverted in block {block_number}")]
    TransactionReverted { tx_ref: String, block_number: u64 },

    /// A prior submission on the same bid card has not reached a terminal state
    #[error("A bid for bond {bond_id} is already in progress")]
    SubmissionInProgress { bond_id: String },

    /// No terminal outcome within the configured bound
    #[error("Timed out after {waited:?} waiting for {stage}")]
    Timeout { stage: &'static str, waited: Duration },
}

impl BidError {
    /// True for errors detected synchronously, before any external call
    pub fn is_local(&self) -> bool {
        match self {
            Self::WalletNotConnected
            | Self::MissingAmount
            | Self::BelowMinimum { .. }
            | Self::PrecisionLoss { .. }
            | Self::AmountOverflow { .. }
            | Self::MalformedBond { .. }
            | Self::SubmissionInProgress { .. } => true,

            Self::ExternalRejection(_) | Self::TransactionReverted { .. } | Self::Timeout { .. } => {
                false
            }
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::WalletNotConnected => "wallet",
            Self::MissingAmount => "missing_amount",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::PrecisionLoss { .. } => "precision",
            Self::AmountOverflow { .. } => "overflow",
            Self::MalformedBond { .. } => "bond_data",
            Self::ExternalRejection(_) => "rejected",
            Self::TransactionReverted { .. } => "reverted",
            Self::SubmissionInProgress { .. } => "in_progress",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// User-facing message for this failure
    ///
    /// `min_bid` is the bond's listed minimum, echoed back for amount errors.
    pub fn notification(&self, bond_id: &str, min_bid: &str) -> Notification {
        let (title, description) = match self {
            Self::WalletNotConnected => (
                "Wallet Not Connected",
                "Please connect your wallet to place a bid".to_string(),
            ),
            Self::MissingAmount => ("Invalid Bid", "Enter a bid amount".to_string()),
            Self::BelowMinimum { .. } => ("Invalid Bid", format!("Minimum bid is {}", min_bid)),
            Self::PrecisionLoss { decimals, .. } => (
                "Invalid Bid",
                format!("Bid amounts support at most {} decimal places", decimals),
            ),
            Self::AmountOverflow { .. } => (
                "Invalid Bid",
                "Bid amount is too large to be submitted".to_string(),
            ),
            Self::MalformedBond { .. } => (
                "Bond Unavailable",
                "This bond listing cannot accept bids right now".to_string(),
            ),
            Self::ExternalRejection(_) => (
                "Encrypted Bid Failed",
                "Failed to place encrypted bid. Please try again.".to_string(),
            ),
            Self::TransactionReverted { .. } => (
                "Encrypted Bid Failed",
                "Your bid transaction was reverted on-chain. Please try again.".to_string(),
            ),
            Self::SubmissionInProgress { .. } => (
                "Bid In Progress",
                "Your previous bid for this bond is still being processed".to_string(),
            ),
            Self::Timeout { stage, .. } => (
                "Bid Status Unknown",
                format!(
                    "Timed out waiting for {}. The transaction may still be recorded on-chain.",
                    stage
                ),
            ),
        };

        Notification::new(Severity::Destructive, title, description, bond_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BidError::BelowMinimum {
            amount: Decimal::from(99_999),
            minimum: "$100,000".to_string(),
        };
        assert_eq!(err.to_string(), "Bid of 99999 is below the minimum bid of $100,000");

        let err = BidError::Timeout {
            stage: "signature",
            waited: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Timed out after 5s waiting for signature");
    }

    #[test]
    fn test_local_vs_remote() {
        assert!(BidError::WalletNotConnected.is_local());
        assert!(BidError::MissingAmount.is_local());
        assert!(BidError::SubmissionInProgress { bond_id: "1".into() }.is_local());
        assert!(BidError::PrecisionLoss {
            amount: "0.1".into(),
            decimals: 0
        }
        .is_local());

        assert!(!BidError::ExternalRejection("declined".into()).is_local());
        assert!(!BidError::Timeout {
            stage: "receipt",
            waited: Duration::from_secs(1)
        }
        .is_local());
    }

    #[test]
    fn test_notifications_are_distinguishable() {
        let wallet = BidError::WalletNotConnected.notification("1", "$100,000");
        assert_eq!(wallet.title, "Wallet Not Connected");
        assert_eq!(wallet.severity, Severity::Destructive);

        let missing = BidError::MissingAmount.notification("1", "$100,000");
        assert_eq!(missing.title, "Invalid Bid");
        assert_eq!(missing.description, "Enter a bid amount");

        let below = BidError::BelowMinimum {
            amount: Decimal::from(99_999),
            minimum: "$100,000".to_string(),
        }
        .notification("1", "$100,000");
        assert_eq!(below.title, "Invalid Bid");
        assert_eq!(below.description, "Minimum bid is $100,000");
        assert_ne!(missing.description, below.description);

        let rejected = BidError::ExternalRejection("user declined".into()).notification("1", "$100,000");
        assert_eq!(rejected.title, "Encrypted Bid Failed");

        let reverted = BidError::TransactionReverted {
            tx_ref: "0xabc".into(),
            block_number: 7,
        }
        .notification("1", "$100,000");
        assert_ne!(reverted.description, rejected.description);
    }
}
