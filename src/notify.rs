//! User-facing notifications for terminal bid outcomes
//!
//! This crate decides the content and severity of a message; rendering it
//! (toast, terminal line, ...) belongs to whoever implements [`Notifier`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity of a notification, mirrors the toast variants of the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Destructive,
}

/// A single message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Bond the message is about
    pub bond_id: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        bond_id: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
            bond_id: bond_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Message for a bid that reached `confirmed`
    pub fn bid_confirmed(bond_id: &str) -> Self {
        Self::new(
            Severity::Success,
            "Bid Submitted Successfully",
            "Your encrypted bid has been recorded on the blockchain",
            bond_id,
        )
    }

    /// Message shown when the caller stops watching a transaction
    ///
    /// Stopping observation never cancels the transaction, so the copy must
    /// not suggest it did.
    pub fn observation_stopped(bond_id: &str, tx_ref: &str) -> Self {
        Self::new(
            Severity::Info,
            "Stopped Tracking Bid",
            format!(
                "No longer watching transaction {}. Your bid may still be recorded on-chain.",
                tx_ref
            ),
            bond_id,
        )
    }
}

/// Receives notifications produced by the submission flow
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Destructive => tracing::warn!(
                bond_id = %n.bond_id,
                title = %n.title,
                "{}",
                n.description
            ),
            Severity::Success | Severity::Info => tracing::info!(
                bond_id = %n.bond_id,
                title = %n.title,
                "{}",
                n.description
            ),
        }
    }
}

/// Forwards notifications to a channel, for a UI layer or for tests
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}
