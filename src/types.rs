//! Core types for the block client
//!
//! Fixed-size byte values used throughout the crate with validation, hex
//! encoding, and JSON serialization in the node's text formats.

use crate::utils::{bytes_to_hex_upper, hex_to_array, validate_hex_string};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of seeds, keys and block hashes in bytes
pub const KEY_SIZE: usize = 32;

/// Length of a signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Length of a work nonce in bytes
pub const WORK_SIZE: usize = 8;

/// 32-byte secret from which every key pair of a wallet is derived
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; KEY_SIZE]);

impl Seed {
    /// Create a seed from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Parse a seed from 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex_to_array("seed", s)?))
    }

    /// Reveal the seed as uppercase hex
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.0)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// 32-byte Ed25519 private key
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(pub(crate) [u8; KEY_SIZE]);

impl PrivateKey {
    /// Create a private key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Parse a private key from 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex_to_array("private key", s)?))
    }

    /// Reveal the key as uppercase hex
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// 32-byte Ed25519 public key, the identity behind an address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; KEY_SIZE]);

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Parse from 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex_to_array("public key", s)?))
    }

    /// Convert to uppercase hex
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 32-byte block hash; all zeroes marks "no predecessor"
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockHash(pub [u8; KEY_SIZE]);

impl BlockHash {
    /// The zero hash, used as `previous` of an account's first block
    pub const ZERO: Self = Self([0u8; KEY_SIZE]);

    /// Create a block hash from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Check for the zero sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; KEY_SIZE]
    }

    /// Parse from 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex_to_array("block hash", s)?))
    }

    /// Convert to uppercase hex
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 64-byte Ed25519 signature over a block hash
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create a signature from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Parse from 128 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != SIGNATURE_SIZE * 2 {
            return Err(Error::malformed_signature(format!(
                "expected {} hex characters, got {}",
                SIGNATURE_SIZE * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::malformed_signature(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Convert to uppercase hex
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// Account balance in raw units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(pub u128);

impl Balance {
    /// Zero balance
    pub const ZERO: Self = Self(0);

    /// Create a balance of `raw` units
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Get the raw amount
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Big-endian 16-byte encoding used in block hashing
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Add an incoming amount
    pub fn checked_add(self, amount: Balance) -> Result<Balance> {
        self.0
            .checked_add(amount.0)
            .map(Balance)
            .ok_or_else(|| Error::invalid_balance("balance exceeds 128 bits"))
    }

    /// Subtract an outgoing amount
    pub fn checked_sub(self, amount: Balance) -> Result<Balance> {
        self.0
            .checked_sub(amount.0)
            .map(Balance)
            .ok_or(Error::InsufficientBalance {
                available: self.0,
                required: amount.0,
            })
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Balance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_balance(format!(
                "expected decimal raw amount, got {:?}",
                s
            )));
        }
        s.parse::<u128>()
            .map(Balance)
            .map_err(|e| Error::invalid_balance(e.to_string()))
    }
}

impl Serialize for Balance {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Balance::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Proof-of-work nonce (8 bytes)
///
/// The text form is the big-endian hex of the value; the hashed form is the
/// little-endian byte order, i.e. the text bytes reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WorkNonce(pub u64);

impl WorkNonce {
    /// Create a new nonce
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Bytes fed to the work hash
    pub fn to_le_bytes(self) -> [u8; WORK_SIZE] {
        self.0.to_le_bytes()
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse from 16 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        validate_hex_string("work", s, Some(WORK_SIZE * 2))?;
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::invalid_hex("work", e.to_string()))
    }
}

impl fmt::Display for WorkNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for WorkNonce {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for WorkNonce {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for WorkNonce {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        WorkNonce::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Work difficulty threshold; a work value must be at least this large
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Difficulty(pub u64);

impl Difficulty {
    /// Network threshold for send and change blocks
    pub const SEND: Self = Self(0xffff_fff8_0000_0000);

    /// Network threshold for open and receive blocks
    pub const RECEIVE: Self = Self(0xffff_fe00_0000_0000);

    /// Create a new difficulty
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the threshold value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check whether a work value satisfies this threshold
    pub fn is_met_by(self, work_value: u64) -> bool {
        work_value >= self.0
    }

    /// Expected number of random candidates until one meets the threshold
    pub fn expected_attempts(self) -> f64 {
        let span = (u64::MAX - self.0) as f64 + 1.0;
        2f64.powi(64) / span
    }

    /// How many times harder this threshold is than `base`
    pub fn multiplier(self, base: Difficulty) -> f64 {
        let base_span = (u64::MAX - base.0) as f64 + 1.0;
        let span = (u64::MAX - self.0) as f64 + 1.0;
        base_span / span
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_hex_string("difficulty", s, Some(16))
            .map_err(|e| Error::invalid_difficulty(e.to_string()))?;
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::invalid_difficulty(e.to_string()))
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Difficulty::from_str(&s).map_err(serde::de::Error::custom)
    }
}
