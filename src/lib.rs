//! Cipher Bond - sealed-bid corporate bond auction client
//!
//! Validates and encodes bids against bond listings, submits them to a
//! settlement contract and tracks each transaction to a terminal outcome.

pub mod abi;
pub mod bond;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod errors;
pub mod metrics;
pub mod mock;
pub mod notify;
pub mod observability;
pub mod rpc;
pub mod settlement;
pub mod structured_logging;
pub mod tracker;
pub mod validator;
pub mod wallet;

// Re-export commonly used types
pub use bond::{ActiveBond, BondCatalog, BondRecord, BondStatus};
pub use controller::{ControllerConfig, Submission, SubmissionController, SubmissionHandle, SubmissionStatus};
pub use encoder::{EncodedAmount, FixedPointEncoder};
pub use errors::BidError;
pub use notify::{Notification, Notifier, Severity};
pub use settlement::{ReceiptSource, SettlementService, SettlementTarget, TransactionRef};
pub use validator::{validate, ValidatedAmount};
pub use wallet::{WalletAddress, WalletSession};
