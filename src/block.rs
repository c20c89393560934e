//! State blocks
//!
//! The single modern block kind, its canonical byte layout and hash, and
//! block-level signing and verification. Text fields are validated once when a
//! block is built or parsed; afterwards only the signature and work can change.

use crate::address::Address;
use crate::crypto::{blake2b_256, sign_message, verify_message, KeyPair};
use crate::types::{Balance, BlockHash, PrivateKey, PublicKey, Signature, WorkNonce, KEY_SIZE};
use crate::utils::bytes_to_hex_upper;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker identifying state blocks in the hashed preamble
pub const STATE_BLOCK_MARKER: u8 = 6;

/// Hashed preamble: zero bytes ending in the state block marker
pub const PREAMBLE: [u8; KEY_SIZE] = {
    let mut preamble = [0u8; KEY_SIZE];
    preamble[KEY_SIZE - 1] = STATE_BLOCK_MARKER;
    preamble
};

/// Length of [`StateBlock::canonical_bytes`]
pub const CANONICAL_SIZE: usize = KEY_SIZE * 5 + 16;

/// What the `link` field refers to, decided by its shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// Recipient of funds leaving this account
    Send(PublicKey),
    /// Hash of the send block being received
    Receive(BlockHash),
    /// No link; representative change only
    Change,
}

impl Link {
    /// Classify link text
    ///
    /// Address-shaped text is a send (its checksum must hold), 64 zero
    /// characters are a change, any other 64 hex characters are a receive.
    pub fn parse(s: &str) -> Result<Self> {
        if Address::matches_pattern(s) {
            let address: Address = s.parse()?;
            return Ok(Link::Send(*address.public_key()));
        }

        if s.len() == KEY_SIZE * 2 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            if s.chars().all(|c| c == '0') {
                return Ok(Link::Change);
            }
            return BlockHash::from_hex(s)
                .map(Link::Receive)
                .map_err(|_| Error::invalid_link(s));
        }

        Err(Error::invalid_link(s))
    }

    /// The 32 bytes this link contributes to the block hash
    pub fn payload(&self) -> [u8; KEY_SIZE] {
        match self {
            Link::Send(public_key) => public_key.0,
            Link::Receive(hash) => hash.0,
            Link::Change => [0u8; KEY_SIZE],
        }
    }

    /// Payload as uppercase hex, the node's `link` field
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.payload())
    }

    /// Payload rendered as an address, the node's `link_as_account` field
    pub fn as_account(&self) -> Address {
        Address::new(PublicKey(self.payload()))
    }
}

impl FromStr for Link {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Send(public_key) => write!(f, "{}", Address::new(*public_key)),
            Link::Receive(hash) => write!(f, "{}", hash),
            Link::Change => write!(f, "{}", "0".repeat(KEY_SIZE * 2)),
        }
    }
}

/// Role of a block, as annotated for the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSubtype {
    /// First block of an account (always a receive)
    Open,
    /// Receive into an opened account
    Receive,
    /// Send to another account
    Send,
    /// Representative change
    Change,
}

impl BlockSubtype {
    /// Subtype name as the node expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockSubtype::Open => "open",
            BlockSubtype::Receive => "receive",
            BlockSubtype::Send => "send",
            BlockSubtype::Change => "change",
        }
    }

    /// Whether blocks of this subtype use the lower receive work threshold
    pub fn is_receive_tier(&self) -> bool {
        matches!(self, BlockSubtype::Open | BlockSubtype::Receive)
    }
}

impl fmt::Display for BlockSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BlockJson", into = "BlockJson")]
pub struct StateBlock {
    account: Address,
    previous: BlockHash,
    representative: Address,
    balance: Balance,
    link: Link,
    signature: Option<Signature>,
    work: Option<WorkNonce>,
}

impl StateBlock {
    /// Build an unsigned block without work
    pub fn new(
        account: Address,
        previous: BlockHash,
        representative: Address,
        balance: Balance,
        link: Link,
    ) -> Self {
        Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature: None,
            work: None,
        }
    }

    /// Build an unsigned block from its text fields
    pub fn parse(
        account: &str,
        previous: &str,
        representative: &str,
        balance: &str,
        link: &str,
    ) -> Result<Self> {
        Ok(Self::new(
            account.parse()?,
            BlockHash::from_hex(previous)?,
            representative.parse()?,
            balance.parse()?,
            Link::parse(link)?,
        ))
    }

    /// Account owning the chain this block belongs to
    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Hash of the preceding block, zero for the first block
    pub fn previous(&self) -> &BlockHash {
        &self.previous
    }

    /// Representative chosen by the account
    pub fn representative(&self) -> &Address {
        &self.representative
    }

    /// Balance after this block
    pub fn balance(&self) -> Balance {
        self.balance
    }

    /// Link field
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Signature, once signed
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Work nonce, once generated
    pub fn work(&self) -> Option<WorkNonce> {
        self.work
    }

    /// Whether this is the first block of its account
    pub fn is_first(&self) -> bool {
        self.previous.is_zero()
    }

    /// Subtype implied by the link and position in the chain
    pub fn subtype(&self) -> BlockSubtype {
        match self.link {
            Link::Send(_) => BlockSubtype::Send,
            Link::Receive(_) if self.is_first() => BlockSubtype::Open,
            Link::Receive(_) => BlockSubtype::Receive,
            Link::Change => BlockSubtype::Change,
        }
    }

    /// Whether signature and work are both present
    pub fn is_complete(&self) -> bool {
        self.signature.is_some() && self.work.is_some()
    }

    /// Fixed-layout bytes the block hash is computed over
    pub fn canonical_bytes(&self) -> [u8; CANONICAL_SIZE] {
        let mut bytes = [0u8; CANONICAL_SIZE];
        let fields: [&[u8]; 6] = [
            &PREAMBLE,
            self.account.public_key().as_bytes(),
            self.previous.as_bytes(),
            self.representative.public_key().as_bytes(),
            &self.balance.to_be_bytes(),
            &self.link.payload(),
        ];

        let mut offset = 0;
        for field in fields {
            bytes[offset..offset + field.len()].copy_from_slice(field);
            offset += field.len();
        }
        bytes
    }

    /// Block hash; what gets signed and how the node identifies the block
    pub fn hash(&self) -> BlockHash {
        BlockHash(blake2b_256(&[&self.canonical_bytes()]))
    }

    /// Store a signature
    pub fn set_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }

    /// Store a work nonce
    pub fn set_work(&mut self, work: WorkNonce) {
        self.work = Some(work);
    }

    /// Sign with the account's own key pair and store the signature
    pub fn sign_with(&mut self, keys: &KeyPair) -> Result<Signature> {
        if keys.public_key() != self.account.public_key() {
            return Err(Error::invalid_state(format!(
                "key pair does not belong to {}",
                self.account
            )));
        }
        let signature = sign(self, keys.private_key());
        self.signature = Some(signature);
        Ok(signature)
    }

    /// Whether the stored signature was made by the block's account
    pub fn has_valid_signature(&self) -> bool {
        match &self.signature {
            Some(signature) => {
                verify_message(self.account.public_key(), self.hash().as_bytes(), signature)
            }
            None => false,
        }
    }
}

/// Sign the hash of `block`
pub fn sign(block: &StateBlock, private_key: &PrivateKey) -> Signature {
    sign_message(private_key, block.hash().as_bytes())
}

/// Check a hex signature over `block` against the key behind `address`
///
/// Undecodable addresses and malformed signatures are errors; a signature that
/// simply does not match is `Ok(false)`.
pub fn verify(block: &StateBlock, signature: &str, address: &str) -> Result<bool> {
    let address: Address = address.parse()?;
    let signature = Signature::from_hex(signature)?;
    Ok(verify_message(
        address.public_key(),
        block.hash().as_bytes(),
        &signature,
    ))
}

/// Node `json_block` representation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockJson {
    #[serde(rename = "type")]
    kind: String,
    account: String,
    previous: String,
    representative: String,
    balance: String,
    link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_as_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    work: Option<String>,
}

impl From<StateBlock> for BlockJson {
    fn from(block: StateBlock) -> Self {
        Self {
            kind: "state".to_string(),
            account: block.account.to_string(),
            previous: block.previous.to_hex(),
            representative: block.representative.to_string(),
            balance: block.balance.to_string(),
            // a send link is written as an address so it parses back as a send
            link: block.link.to_string(),
            link_as_account: Some(block.link.as_account().to_string()),
            signature: block.signature.map(|s| s.to_hex()),
            work: block.work.map(|w| w.to_hex()),
        }
    }
}

impl TryFrom<BlockJson> for StateBlock {
    type Error = Error;

    fn try_from(json: BlockJson) -> Result<Self> {
        if json.kind != "state" {
            return Err(Error::invalid_state(format!(
                "unsupported block type {:?}",
                json.kind
            )));
        }

        let mut block = StateBlock::parse(
            &json.account,
            &json.previous,
            &json.representative,
            &json.balance,
            &json.link,
        )?;
        if let Some(signature) = json.signature {
            block.set_signature(Signature::from_hex(&signature)?);
        }
        if let Some(work) = json.work {
            block.set_work(WorkNonce::from_hex(&work)?);
        }
        Ok(block)
    }
}
