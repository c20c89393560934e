//! Account addresses
//!
//! An address is `<prefix>_` followed by 60 characters of a custom base-32
//! alphabet: 52 for the public key (padded with four leading zero bits to 260
//! bits) and 8 for a 5-byte Blake2b checksum of the key. The checksum is
//! encoded in reversed byte order, on both the encoding and the decoding side.

use crate::crypto::blake2b_40;
use crate::types::{PublicKey, KEY_SIZE};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

const BODY_CHARS: usize = 52;
const CHECKSUM_CHARS: usize = 8;
const CHECKSUM_SIZE: usize = 5;
const ENCODED_CHARS: usize = BODY_CHARS + CHECKSUM_CHARS;

static DECODE_TABLE: Lazy<[Option<u8>; 128]> = Lazy::new(|| {
    let mut table = [None; 128];
    for (value, &c) in ALPHABET.iter().enumerate() {
        table[c as usize] = Some(value as u8);
    }
    table
});

/// Address prefix; both spellings name the same account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressPrefix {
    /// `nano_`
    #[default]
    Nano,
    /// Legacy `xrb_`
    Xrb,
}

impl AddressPrefix {
    /// Prefix text without the underscore
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressPrefix::Nano => "nano",
            AddressPrefix::Xrb => "xrb",
        }
    }
}

/// Human-readable form of a public key
#[derive(Debug, Clone, Copy, Eq)]
pub struct Address {
    public_key: PublicKey,
    prefix: AddressPrefix,
}

impl Address {
    /// Address of `public_key` with the `nano_` prefix
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            prefix: AddressPrefix::Nano,
        }
    }

    /// Same account rendered with another prefix
    pub fn with_prefix(self, prefix: AddressPrefix) -> Self {
        Self { prefix, ..self }
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Get the prefix this address was written with
    pub fn prefix(&self) -> AddressPrefix {
        self.prefix
    }

    /// Whether `s` has the shape of an address (no checksum check)
    pub fn matches_pattern(s: &str) -> bool {
        split_prefix(s).is_ok()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state);
    }
}

impl From<PublicKey> for Address {
    fn from(public_key: PublicKey) -> Self {
        Self::new(public_key)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = [0u8; BODY_CHARS];
        encode_base32(&self.public_key.0, &mut body);
        let mut checksum = [0u8; CHECKSUM_CHARS];
        encode_base32(&checksum_of(&self.public_key), &mut checksum);

        // alphabet output is always ASCII
        let body = std::str::from_utf8(&body).map_err(|_| fmt::Error)?;
        let checksum = std::str::from_utf8(&checksum).map_err(|_| fmt::Error)?;
        write!(f, "{}_{}{}", self.prefix.as_str(), body, checksum)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, encoded) = split_prefix(s)?;
        let (body, checksum) = encoded.as_bytes().split_at(BODY_CHARS);

        let key_bits: [u8; KEY_SIZE] = decode_base32(body)?;
        let embedded: [u8; CHECKSUM_SIZE] = decode_base32(checksum)?;
        let public_key = PublicKey(key_bits);

        if embedded != checksum_of(&public_key) {
            return Err(Error::checksum_mismatch(s));
        }

        Ok(Self { public_key, prefix })
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode a public key as `nano_` address text
pub fn encode(public_key: &PublicKey) -> String {
    Address::new(*public_key).to_string()
}

/// Decode address text back to its public key
pub fn decode(address: &str) -> Result<PublicKey> {
    Address::from_str(address).map(|address| address.public_key)
}

/// Checksum as carried in the address: the 5-byte digest, reversed
fn checksum_of(public_key: &PublicKey) -> [u8; CHECKSUM_SIZE] {
    let mut checksum = blake2b_40(public_key.as_bytes());
    checksum.reverse();
    checksum
}

/// Validate `^(nano|xrb)_[13][alphabet]{59}$` and split off the prefix
fn split_prefix(s: &str) -> Result<(AddressPrefix, &str)> {
    let (prefix, encoded) = if let Some(rest) = s.strip_prefix("nano_") {
        (AddressPrefix::Nano, rest)
    } else if let Some(rest) = s.strip_prefix("xrb_") {
        (AddressPrefix::Xrb, rest)
    } else {
        return Err(Error::invalid_address("expected nano_ or xrb_ prefix"));
    };

    if encoded.len() != ENCODED_CHARS {
        return Err(Error::invalid_address(format!(
            "expected {} characters after the prefix, got {}",
            ENCODED_CHARS,
            encoded.len()
        )));
    }

    // four padding bits: the first character only carries one key bit
    if !matches!(encoded.as_bytes()[0], b'1' | b'3') {
        return Err(Error::invalid_address("first character must be 1 or 3"));
    }

    if let Some(c) = encoded.bytes().find(|c| !ALPHABET.contains(c)) {
        return Err(Error::invalid_address(format!(
            "character {:?} is not in the address alphabet",
            c as char
        )));
    }

    Ok((prefix, encoded))
}

/// Write `bytes` as 5-bit groups, most significant first, left-padded with
/// zero bits to fill `out`
fn encode_base32(bytes: &[u8], out: &mut [u8]) {
    let total_bits = out.len() * 5;
    let padding = total_bits - bytes.len() * 8;

    for (i, slot) in out.iter_mut().enumerate() {
        let mut value = 0u8;
        for bit in i * 5..i * 5 + 5 {
            value <<= 1;
            if bit >= padding {
                let data_bit = bit - padding;
                value |= (bytes[data_bit / 8] >> (7 - data_bit % 8)) & 1;
            }
        }
        *slot = ALPHABET[value as usize];
    }
}

/// Inverse of [`encode_base32`]; padding bits are dropped
fn decode_base32<const N: usize>(chars: &[u8]) -> Result<[u8; N]> {
    let total_bits = chars.len() * 5;
    let padding = total_bits - N * 8;
    let mut out = [0u8; N];

    for (i, &c) in chars.iter().enumerate() {
        let value = DECODE_TABLE
            .get(c as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Error::invalid_address(format!("invalid character {:?}", c as char)))?;
        for j in 0..5 {
            let bit = i * 5 + j;
            if bit < padding {
                continue;
            }
            let data_bit = bit - padding;
            out[data_bit / 8] |= ((value >> (4 - j)) & 1) << (7 - data_bit % 8);
        }
    }

    Ok(out)
}
