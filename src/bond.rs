//! Bond listings offered for sealed bidding
//!
//! A [`BondRecord`] is static listing data. Bids can only be built against an
//! [`ActiveBond`], which is obtainable solely from a record whose status is
//! `active`, so submitting against a closing or closed auction does not type
//! check.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;

use crate::errors::BidError;
use crate::validator::parse_decimal;

/// Auction status of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondStatus {
    Active,
    Closing,
    Closed,
}

impl BondStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Short notice shown on the bond card, if any
    pub fn card_notice(&self) -> Option<&'static str> {
        match self {
            Self::Active => Some("Your bid will be encrypted until auction closure"),
            Self::Closing => None,
            Self::Closed => Some("Auction closed - Results being processed"),
        }
    }
}

impl std::fmt::Display for BondStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of an auctionable bond
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondRecord {
    pub id: String,
    pub issuer: String,
    pub rating: String,
    pub maturity: String,
    /// Currency formatted minimum, e.g. `$100,000`
    pub min_bid: String,
    /// Informational only
    #[serde(rename = "yield")]
    pub yield_rate: String,
    pub status: BondStatus,
    /// Display string, no deadline is enforced from it
    pub time_remaining: String,
}

impl BondRecord {
    /// Numeric minimum bid with currency formatting stripped
    pub fn min_bid_amount(&self) -> Result<Decimal, BidError> {
        let stripped: String = self
            .min_bid
            .chars()
            .filter(|c| *c != '$' && *c != ',')
            .collect();

        parse_decimal(&stripped)
            .ok()
            .filter(|d| !d.is_sign_negative())
            .ok_or_else(|| self.malformed(format!("unreadable minimum bid '{}'", self.min_bid)))
    }

    /// Integer id used by the settlement call
    pub fn settlement_id(&self) -> Result<u64, BidError> {
        self.id
            .trim()
            .parse::<u64>()
            .map_err(|_| self.malformed("id is not an unsigned integer".to_string()))
    }

    /// Borrow this listing as biddable, only while the auction is active
    pub fn biddable(&self) -> Option<ActiveBond> {
        (self.status == BondStatus::Active).then(|| ActiveBond(self.clone()))
    }

    fn malformed(&self, reason: String) -> BidError {
        BidError::MalformedBond {
            bond_id: self.id.clone(),
            reason,
        }
    }
}

/// A bond whose auction is accepting bids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBond(BondRecord);

impl ActiveBond {
    pub fn record(&self) -> &BondRecord {
        &self.0
    }
}

impl Deref for ActiveBond {
    type Target = BondRecord;

    fn deref(&self) -> &BondRecord {
        &self.0
    }
}

impl TryFrom<BondRecord> for ActiveBond {
    type Error = BondRecord;

    fn try_from(record: BondRecord) -> std::result::Result<Self, BondRecord> {
        if record.status == BondStatus::Active {
            Ok(Self(record))
        } else {
            Err(record)
        }
    }
}

/// The set of listed bonds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondCatalog {
    #[serde(default)]
    pub bonds: Vec<BondRecord>,
}

impl BondCatalog {
    pub fn new(bonds: Vec<BondRecord>) -> Self {
        Self { bonds }
    }

    /// The listings shown on the marketplace landing page
    pub fn demo() -> Self {
        fn bond(
            id: &str,
            issuer: &str,
            maturity: &str,
            yield_rate: &str,
            min_bid: &str,
            status: BondStatus,
            time_remaining: &str,
            rating: &str,
        ) -> BondRecord {
            BondRecord {
                id: id.to_string(),
                issuer: issuer.to_string(),
                rating: rating.to_string(),
                maturity: maturity.to_string(),
                min_bid: min_bid.to_string(),
                yield_rate: yield_rate.to_string(),
                status,
                time_remaining: time_remaining.to_string(),
            }
        }

        Self::new(vec![
            bond("1", "TechCorp International", "Dec 2029", "4.75%", "$100,000", BondStatus::Active, "2d 14h", "AAA"),
            bond("2", "Global Manufacturing Ltd", "Mar 2031", "5.25%", "$250,000", BondStatus::Closing, "6h 23m", "AA+"),
            bond("3", "Energy Solutions Corp", "Sep 2027", "4.50%", "$150,000", BondStatus::Active, "1d 8h", "AA"),
            bond("4", "FinTech Innovations", "Jun 2030", "5.75%", "$500,000", BondStatus::Closed, "Ended", "A+"),
        ])
    }

    /// Load `[[bonds]]` tables from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bond catalog: {}", path.display()))?;
        let catalog: BondCatalog = toml::from_str(&content)
            .with_context(|| format!("Failed to parse bond catalog: {}", path.display()))?;
        catalog.check_unique_ids()?;
        Ok(catalog)
    }

    fn check_unique_ids(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for bond in &self.bonds {
            if !seen.insert(bond.id.as_str()) {
                anyhow::bail!("Duplicate bond id in catalog: {}", bond.id);
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&BondRecord> {
        self.bonds.iter().find(|b| b.id == id)
    }

    /// Listings currently accepting bids
    pub fn active(&self) -> impl Iterator<Item = ActiveBond> + '_ {
        self.bonds.iter().filter_map(BondRecord::biddable)
    }

    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }
}
