//! Call data for the settlement contract
//!
//! Only what the bid call needs: a function signature with unsigned integer
//! parameters, its 4-byte selector, and one 32-byte big-endian word per
//! argument.

use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Invalid call signature '{0}'")]
    InvalidSignature(String),

    #[error("Unsupported parameter type '{0}', only uintN is supported")]
    UnsupportedType(String),

    #[error("Expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("Argument {index} ({value}) does not fit in uint{bits}")]
    ArgumentOverflow { index: usize, value: u128, bits: u32 },
}

/// Parsed `name(uintN,...)` function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
    name: String,
    param_bits: Vec<u32>,
}

impl CallSignature {
    pub fn parse(signature: &str) -> Result<Self, AbiError> {
        let invalid = || AbiError::InvalidSignature(signature.to_string());

        let compact: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
        let (name, rest) = compact.split_once('(').ok_or_else(invalid)?;
        let params = rest.strip_suffix(')').ok_or_else(invalid)?;

        let valid_ident = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_ident {
            return Err(invalid());
        }

        let param_bits = if params.is_empty() {
            Vec::new()
        } else {
            params.split(',').map(parse_uint_bits).collect::<Result<_, _>>()?
        };

        Ok(Self {
            name: name.to_string(),
            param_bits,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.param_bits.len()
    }

    /// Declared width of parameter `index`, in bits
    pub fn param_bits(&self, index: usize) -> Option<u32> {
        self.param_bits.get(index).copied()
    }

    /// Canonical form used for hashing, e.g. `placeEncryptedBid(uint256,uint256)`
    pub fn canonical(&self) -> String {
        let params: Vec<String> = self.param_bits.iter().map(|b| format!("uint{}", b)).collect();
        format!("{}({})", self.name, params.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        let digest = Keccak256::digest(self.canonical().as_bytes());
        [digest[0], digest[1], digest[2], digest[3]]
    }

    /// Check argument count and widths without building call data
    pub fn check_args(&self, args: &[u128]) -> Result<(), AbiError> {
        if args.len() != self.param_bits.len() {
            return Err(AbiError::ArgumentCount {
                expected: self.param_bits.len(),
                got: args.len(),
            });
        }

        for (index, (&value, &bits)) in args.iter().zip(&self.param_bits).enumerate() {
            if bits < 128 && value >> bits != 0 {
                return Err(AbiError::ArgumentOverflow { index, value, bits });
            }
        }
        Ok(())
    }

    /// Selector followed by the arguments as 32-byte words
    pub fn encode_call(&self, args: &[u128]) -> Result<Vec<u8>, AbiError> {
        self.check_args(args)?;

        let mut data = Vec::with_capacity(4 + 32 * args.len());
        data.extend_from_slice(&self.selector());

        for &value in args {
            let mut word = [0u8; 32];
            word[16..].copy_from_slice(&value.to_be_bytes());
            data.extend_from_slice(&word);
        }

        Ok(data)
    }
}

fn parse_uint_bits(ty: &str) -> Result<u32, AbiError> {
    let unsupported = || AbiError::UnsupportedType(ty.to_string());
    let width = ty.strip_prefix("uint").ok_or_else(unsupported)?;
    if width.is_empty() {
        return Ok(256);
    }
    let bits: u32 = width.parse().map_err(|_| unsupported())?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(unsupported());
    }
    Ok(bits)
}

/// `0x`-prefixed lowercase hex
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}
