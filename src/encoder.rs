//! Fixed-point encoding of bid amounts
//!
//! The settlement call only takes integers, so a decimal bid is scaled by
//! `10^decimals`. Encoding never rounds: an amount with more fractional
//! digits than the precision supports is reported as `PrecisionLoss`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::BidError;
use crate::validator::{ValidatedAmount, MAX_FRACTION_DIGITS};

/// Precision of the reference settlement contract (wei-style 18 decimals)
pub const DEFAULT_DECIMALS: u32 = 18;

/// Largest supported precision; decoding must fit an exact decimal
pub const MAX_DECIMALS: u32 = MAX_FRACTION_DIGITS as u32;

/// Scaled integer bid value passed to the settlement call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodedAmount(u128);

impl EncodedAmount {
    pub fn from_raw(value: u128) -> Self {
        Self(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for EncodedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Decimal <-> fixed-point conversion at a configured precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointEncoder {
    decimals: u32,
}

impl FixedPointEncoder {
    /// Returns `None` when `decimals` exceeds [`MAX_DECIMALS`]
    pub fn new(decimals: u32) -> Option<Self> {
        (decimals <= MAX_DECIMALS).then_some(Self { decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Scale a validated amount to its integer representation
    pub fn encode(&self, amount: &ValidatedAmount) -> Result<EncodedAmount, BidError> {
        let value = amount.value().normalize();
        let scale = value.scale();
        if scale > self.decimals {
            return Err(BidError::PrecisionLoss {
                amount: value.to_string(),
                decimals: self.decimals,
            });
        }

        let overflow = || BidError::AmountOverflow {
            amount: value.to_string(),
            decimals: self.decimals,
        };

        // ValidatedAmount is strictly positive, so the mantissa is too
        let mantissa = u128::try_from(value.mantissa()).map_err(|_| overflow())?;
        let factor = 10u128
            .checked_pow(self.decimals - scale)
            .ok_or_else(overflow)?;

        mantissa
            .checked_mul(factor)
            .map(EncodedAmount)
            .ok_or_else(overflow)
    }

    /// Inverse of [`encode`](Self::encode), normalised
    pub fn decode(&self, encoded: EncodedAmount) -> Result<Decimal, BidError> {
        // Drop trailing zeros first so large whole amounts fit the 96-bit mantissa
        let (mut raw, mut scale) = (encoded.0, self.decimals);
        while scale > 0 && raw % 10 == 0 && raw != 0 {
            raw /= 10;
            scale -= 1;
        }

        let raw = i128::try_from(raw).map_err(|_| self.decode_overflow(encoded))?;
        Decimal::try_from_i128_with_scale(raw, scale)
            .map(|d| d.normalize())
            .map_err(|_| self.decode_overflow(encoded))
    }

    fn decode_overflow(&self, encoded: EncodedAmount) -> BidError {
        BidError::AmountOverflow {
            amount: encoded.to_string(),
            decimals: self.decimals,
        }
    }
}

impl Default for FixedPointEncoder {
    fn default() -> Self {
        Self {
            decimals: DEFAULT_DECIMALS,
        }
    }
}

/// Encode at an explicit precision
pub fn encode(amount: &ValidatedAmount, decimals: u32) -> Result<EncodedAmount, BidError> {
    let encoder = FixedPointEncoder::new(decimals).ok_or_else(|| BidError::PrecisionLoss {
        amount: amount.to_string(),
        decimals,
    })?;
    encoder.encode(amount)
}
