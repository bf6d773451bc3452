//! Wallet address parsing and canonical form
//!
//! Addresses are 20-byte values written as `0x` + 40 hex digits. Input is
//! accepted in any case; the canonical form is the EIP-55 mixed-case
//! checksum encoding, so two spellings of the same address always compare
//! equal once parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::keccak256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid wallet address: {0}")]
pub struct InvalidAddress(pub String);

/// A canonical (EIP-55 checksummed) wallet address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse `0x` followed by exactly 40 hex digits, in any case
    pub fn parse(input: &str) -> Result<Self, InvalidAddress> {
        let hex_part = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .ok_or_else(|| InvalidAddress("address must start with 0x".to_string()))?;

        if hex_part.len() != 40 {
            return Err(InvalidAddress(format!(
                "expected 40 hex digits, got {}",
                hex_part.len()
            )));
        }
        if !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidAddress("address contains non-hex characters".to_string()));
        }

        Ok(Self(to_checksum(&hex_part.to_ascii_lowercase())))
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(to_checksum(&hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used as a default display name, e.g. `0x5aAe…eAed`
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

/// Apply EIP-55 casing to 40 lowercase hex digits, returning the `0x`-prefixed result
fn to_checksum(lower_hex: &str) -> String {
    let hash = keccak256(lower_hex.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");

    for (i, c) in lower_hex.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }

    out
}

impl FromStr for WalletAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eip55_vectors() {
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let parsed = WalletAddress::parse(&expected.to_lowercase()).unwrap();
            assert_eq!(parsed.as_str(), expected);
        }
    }

    #[test]
    fn test_case_variants_are_equal() {
        let a = WalletAddress::parse("0xABCDEF0000000000000000000000000000000001").unwrap();
        let b = WalletAddress::parse("0xabcdef0000000000000000000000000000000001").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(WalletAddress::parse("abcdef0000000000000000000000000000000001").is_err());
        assert!(WalletAddress::parse("0xabc").is_err());
        assert!(WalletAddress::parse("0xZZcdef0000000000000000000000000000000001").is_err());
        assert!(WalletAddress::parse("0xabcdef00000000000000000000000000000000012").is_err());
        assert!(WalletAddress::parse("GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7").is_err());
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let address: WalletAddress =
            serde_json::from_str("\"0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed\"").unwrap();
        assert_eq!(
            serde_json::to_string(&address).unwrap(),
            "\"0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed\""
        );
        assert!(serde_json::from_str::<WalletAddress>("\"0x12\"").is_err());
    }
}
