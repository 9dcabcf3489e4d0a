//! Wallet session as seen by the bidding core
//!
//! The wallet connector UI owns the session; every bid card only reads it.
//! [`WalletConnector`] is the writing side, [`SharedWallet`] the cheap,
//! clonable reading side.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Read-only view of a wallet connection
pub trait WalletSession: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Connected account, `None` while disconnected
    fn address(&self) -> Option<WalletAddress>;
}

/// `0x`-prefixed 20 byte account address, stored lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(body) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
            bail!("Address must start with 0x: {}", s);
        };
        let bytes = hex::decode(body).map_err(|e| anyhow::anyhow!("Invalid address hex: {}", e))?;
        if bytes.len() != 20 {
            bail!("Invalid address length: expected 20 bytes, got {}", bytes.len());
        }
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<WalletAddress> for String {
    fn from(a: WalletAddress) -> String {
        a.0
    }
}

/// Fixed session, for the CLI and tests
#[derive(Debug, Clone, Default)]
pub struct StaticWallet {
    address: Option<WalletAddress>,
}

impl StaticWallet {
    pub fn connected(address: WalletAddress) -> Self {
        Self {
            address: Some(address),
        }
    }

    pub fn disconnected() -> Self {
        Self { address: None }
    }
}

impl WalletSession for StaticWallet {
    fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    fn address(&self) -> Option<WalletAddress> {
        self.address.clone()
    }
}

/// Writing side of a live session, held by the wallet connector
#[derive(Debug)]
pub struct WalletConnector {
    tx: watch::Sender<Option<WalletAddress>>,
}

/// Reading side of a live session, one clone per bid card
#[derive(Debug, Clone)]
pub struct SharedWallet {
    rx: watch::Receiver<Option<WalletAddress>>,
}

/// Create a disconnected live session
pub fn session() -> (WalletConnector, SharedWallet) {
    let (tx, rx) = watch::channel(None);
    (WalletConnector { tx }, SharedWallet { rx })
}

impl WalletConnector {
    pub fn connect(&self, address: WalletAddress) {
        tracing::info!(address = %address, "Wallet connected");
        self.tx.send_replace(Some(address));
    }

    pub fn disconnect(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("Wallet disconnected");
        }
    }

    pub fn subscribe(&self) -> SharedWallet {
        SharedWallet {
            rx: self.tx.subscribe(),
        }
    }
}

impl SharedWallet {
    /// Wait for the next connect/disconnect
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl WalletSession for SharedWallet {
    fn is_connected(&self) -> bool {
        self.rx.borrow().is_some()
    }

    fn address(&self) -> Option<WalletAddress> {
        self.rx.borrow().clone()
    }
}
