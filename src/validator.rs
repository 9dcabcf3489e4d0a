//! Bid validation
//!
//! Pure checks of a candidate bid against a bond listing and the wallet
//! session state. No I/O, no clocks, no shared state.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::bond::BondRecord;
use crate::errors::BidError;

/// Largest number of fractional digits an exact decimal can carry
pub const MAX_FRACTION_DIGITS: usize = 28;

/// Why a decimal literal could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecimalParseError {
    /// Not a plain decimal literal
    Invalid,
    /// More significant fractional digits than [`MAX_FRACTION_DIGITS`]
    TooPrecise,
    /// Integer part too large for an exact decimal
    TooLarge,
}

/// Parse a plain decimal literal (`[+-]digits[.digits]`) without rounding
///
/// Exponents, digit separators and surrounding text are rejected. The scale of
/// the literal is kept, so `"1250.50"` stays `1250.50`.
pub(crate) fn parse_decimal(text: &str) -> Result<Decimal, DecimalParseError> {
    let text = text.trim();
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty()
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(DecimalParseError::Invalid);
    }

    let frac_part = if frac_part.len() > MAX_FRACTION_DIGITS {
        let significant = frac_part.trim_end_matches('0');
        if significant.len() > MAX_FRACTION_DIGITS {
            return Err(DecimalParseError::TooPrecise);
        }
        significant
    } else {
        frac_part
    };

    let mut literal = String::with_capacity(body.len() + 2);
    if negative {
        literal.push('-');
    }
    literal.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        literal.push('.');
        literal.push_str(frac_part);
    }

    let value = Decimal::from_str(&literal).map_err(|_| DecimalParseError::TooLarge)?;

    // from_str rounds literals with more significant digits than fit the mantissa
    if value.scale() as usize != frac_part.len() {
        return Err(DecimalParseError::TooPrecise);
    }
    Ok(value)
}

/// A bid amount that passed validation: strictly positive and at or above
/// the bond's minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidatedAmount(Decimal);

impl ValidatedAmount {
    /// Wrap an amount without a bond check; only positivity is enforced
    pub fn new(amount: Decimal) -> Option<Self> {
        (amount > Decimal::ZERO).then_some(Self(amount))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for ValidatedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Parse a user-entered amount into a positive exact decimal
pub fn parse_amount(raw_amount: &str) -> Result<ValidatedAmount, BidError> {
    let amount = match parse_decimal(raw_amount) {
        Ok(amount) => amount,
        Err(DecimalParseError::Invalid) => return Err(BidError::MissingAmount),
        Err(DecimalParseError::TooPrecise) => {
            return Err(BidError::PrecisionLoss {
                amount: raw_amount.trim().to_string(),
                decimals: MAX_FRACTION_DIGITS as u32,
            })
        }
        Err(DecimalParseError::TooLarge) => {
            return Err(BidError::AmountOverflow {
                amount: raw_amount.trim().to_string(),
                decimals: 0,
            })
        }
    };

    ValidatedAmount::new(amount).ok_or(BidError::MissingAmount)
}

/// Check a raw bid against a bond
///
/// Order matters: the wallet is checked before the amount is even parsed,
/// so a disconnected user is always told to connect first.
pub fn validate(
    bond: &BondRecord,
    raw_amount: &str,
    wallet_connected: bool,
) -> Result<ValidatedAmount, BidError> {
    if !wallet_connected {
        return Err(BidError::WalletNotConnected);
    }

    let amount = parse_amount(raw_amount)?;

    let minimum = bond.min_bid_amount()?;
    if amount.value() < minimum {
        return Err(BidError::BelowMinimum {
            amount: amount.value(),
            minimum: bond.min_bid.clone(),
        });
    }

    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::BondCatalog;
    use proptest::prelude::*;

    fn techcorp() -> BondRecord {
        BondCatalog::demo().get("1").unwrap().clone()
    }

    #[test]
    fn test_below_minimum() {
        let err = validate(&techcorp(), "99999", true).unwrap_err();
        assert_eq!(
            err,
            BidError::BelowMinimum {
                amount: Decimal::from(99_999),
                minimum: "$100,000".to_string(),
            }
        );
    }

    #[test]
    fn test_valid_bid_returns_amount_unchanged() {
        let amount = validate(&techcorp(), "150000", true).unwrap();
        assert_eq!(amount.value(), Decimal::from(150_000));

        let amount = validate(&techcorp(), " 100000.50 ", true).unwrap();
        assert_eq!(amount.to_string(), "100000.50");
    }

    #[test]
    fn test_exact_minimum_is_accepted() {
        assert!(validate(&techcorp(), "100000", true).is_ok());
        assert!(validate(&techcorp(), "100000.000", true).is_ok());
    }

    #[test]
    fn test_wallet_checked_first() {
        assert_eq!(
            validate(&techcorp(), "150000", false),
            Err(BidError::WalletNotConnected)
        );
        assert_eq!(validate(&techcorp(), "", false), Err(BidError::WalletNotConnected));
        assert_eq!(validate(&techcorp(), "abc", false), Err(BidError::WalletNotConnected));
    }

    #[test]
    fn test_missing_or_non_positive_amounts() {
        for raw in ["", "   ", "abc", "12abc", "1e6", "1,000", ".", "-", "0", "-150000", "0.000"] {
            assert_eq!(
                validate(&techcorp(), raw, true),
                Err(BidError::MissingAmount),
                "input {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_unrepresentable_literals() {
        let long_fraction = format!("150000.{}", "1".repeat(30));
        assert!(matches!(
            validate(&techcorp(), &long_fraction, true),
            Err(BidError::PrecisionLoss { .. })
        ));

        let huge = "9".repeat(40);
        assert!(matches!(
            validate(&techcorp(), &huge, true),
            Err(BidError::AmountOverflow { .. })
        ));
    }

    #[test]
    fn test_trailing_zeros_beyond_max_fraction_are_dropped() {
        let padded = format!("150000.5{}", "0".repeat(40));
        let amount = validate(&techcorp(), &padded, true).unwrap();
        assert_eq!(amount.value().normalize().to_string(), "150000.5");
    }

    #[test]
    fn test_malformed_bond_minimum() {
        let mut bond = techcorp();
        bond.min_bid = "TBD".to_string();
        assert!(matches!(
            validate(&bond, "150000", true),
            Err(BidError::MalformedBond { .. })
        ));
    }

    #[test]
    fn test_parse_decimal_forms() {
        assert_eq!(parse_decimal(".5").unwrap().to_string(), "0.5");
        assert_eq!(parse_decimal("5.").unwrap(), Decimal::from(5));
        assert_eq!(parse_decimal("+7").unwrap(), Decimal::from(7));
        assert_eq!(parse_decimal("1_000"), Err(DecimalParseError::Invalid));
    }

    proptest! {
        #[test]
        fn prop_below_minimum_is_rejected(amount in 1u64..100_000u64) {
            let result = validate(&techcorp(), &amount.to_string(), true);
            let is_below_minimum = matches!(result, Err(BidError::BelowMinimum { .. }));
            prop_assert!(is_below_minimum);
        }

        #[test]
        fn prop_non_numeric_is_missing(raw in "[a-zA-Z ]{0,12}") {
            prop_assert_eq!(validate(&techcorp(), &raw, true), Err(BidError::MissingAmount));
        }

        #[test]
        fn prop_disconnected_wallet_always_wins(raw in "\\PC{0,16}") {
            prop_assert_eq!(validate(&techcorp(), &raw, false), Err(BidError::WalletNotConnected));
        }

        #[test]
        fn prop_at_or_above_minimum_passes(amount in 100_000u64..10_000_000_000u64) {
            let validated = validate(&techcorp(), &amount.to_string(), true).unwrap();
            prop_assert_eq!(validated.value(), Decimal::from(amount));
        }
    }
}
