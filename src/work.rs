//! Proof of work
//!
//! A nonce is valid for a block when `Blake2b-64(nonce_le ‖ root)`, read as a
//! little-endian integer, reaches the difficulty threshold. The root is the
//! account's public key for an account's first block and the previous block
//! hash otherwise.
//!
//! Searching is a random candidate loop. Loops check the deadline and the shared
//! cancellation token between batches, so a search never overruns its
//! deadline by more than one batch.

use crate::block::{BlockSubtype, StateBlock};
use crate::crypto::work_hash;
use crate::entropy::{os_entropy, EntropySource};
use crate::types::{Difficulty, WorkNonce, KEY_SIZE};
use crate::utils::{bytes_to_hex_upper, hex_to_array};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Candidates tried between two deadline/cancellation checks
pub const SEARCH_BATCH_SIZE: u64 = 4096;

/// Value the work nonce is bound to
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkRoot(pub [u8; KEY_SIZE]);

impl WorkRoot {
    /// Root of `block`: account key for a first block, previous hash otherwise
    pub fn of(block: &StateBlock) -> Self {
        if block.is_first() {
            Self(block.account().public_key().0)
        } else {
            Self(block.previous().0)
        }
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Parse from 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex_to_array("work root", s)?))
    }

    /// Convert to uppercase hex
    pub fn to_hex(&self) -> String {
        bytes_to_hex_upper(&self.0)
    }
}

impl fmt::Debug for WorkRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkRoot({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for WorkRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Work value of `nonce` against `root`
#[inline]
pub fn work_value(nonce: WorkNonce, root: &WorkRoot) -> u64 {
    work_hash(&nonce.to_le_bytes(), root.as_bytes())
}

/// Check `nonce` against `root`
pub fn validate_root(root: &WorkRoot, nonce: WorkNonce, difficulty: Difficulty) -> bool {
    difficulty.is_met_by(work_value(nonce, root))
}

/// Check `nonce` against the work root of `block`
pub fn validate(block: &StateBlock, nonce: WorkNonce, difficulty: Difficulty) -> bool {
    validate_root(&WorkRoot::of(block), nonce, difficulty)
}

/// Difficulty tier per block role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkThresholds {
    /// Threshold for send and change blocks
    #[serde(default = "default_send")]
    pub send: Difficulty,
    /// Threshold for open and receive blocks
    #[serde(default = "default_receive")]
    pub receive: Difficulty,
}

fn default_send() -> Difficulty {
    Difficulty::SEND
}

fn default_receive() -> Difficulty {
    Difficulty::RECEIVE
}

impl Default for WorkThresholds {
    fn default() -> Self {
        Self {
            send: default_send(),
            receive: default_receive(),
        }
    }
}

impl WorkThresholds {
    /// Threshold for a block of `subtype`
    pub fn for_subtype(&self, subtype: BlockSubtype) -> Difficulty {
        if subtype.is_receive_tier() {
            self.receive
        } else {
            self.send
        }
    }
}

/// A nonce that met its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkResult {
    /// The nonce
    pub nonce: WorkNonce,
    /// Threshold it was validated against
    pub difficulty: Difficulty,
    /// Its work value
    pub value: u64,
    /// Candidates tried by the search that found it
    pub attempts: u64,
}

/// How a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A valid nonce was found
    Found(WorkResult),
    /// The deadline passed first
    TimedOut {
        /// Candidates tried
        attempts: u64,
    },
    /// The cancellation token fired first
    Cancelled {
        /// Candidates tried
        attempts: u64,
    },
}

impl SearchOutcome {
    /// Candidates tried, whatever the outcome
    pub fn attempts(&self) -> u64 {
        match self {
            SearchOutcome::Found(result) => result.attempts,
            SearchOutcome::TimedOut { attempts } | SearchOutcome::Cancelled { attempts } => {
                *attempts
            }
        }
    }

    /// The found work, if any
    pub fn found(self) -> Option<WorkResult> {
        match self {
            SearchOutcome::Found(result) => Some(result),
            _ => None,
        }
    }
}

/// Deadline and stop signal shared by every loop of one search
#[derive(Debug, Clone)]
pub struct SearchControl {
    deadline: Instant,
    cancellation: CancellationToken,
}

impl SearchControl {
    /// Search until `deadline` or until `cancellation` fires
    pub fn new(deadline: Instant, cancellation: CancellationToken) -> Self {
        Self {
            deadline,
            cancellation,
        }
    }

    /// Search for at most `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout, CancellationToken::new())
    }

    /// Get the deadline
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Get the cancellation token
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Whether the search was stopped, by a find or by the caller
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Stop every loop sharing this control
    pub fn signal_found(&self) {
        self.cancellation.cancel();
    }
}

/// Try random nonces against `root` until one meets `difficulty`
///
/// `hashes` is incremented once per batch (and once for the final partial
/// batch) so that several loops can report a combined rate. A find cancels the
/// shared token.
pub fn search_loop<E: EntropySource + ?Sized>(
    root: &WorkRoot,
    difficulty: Difficulty,
    control: &SearchControl,
    source: &mut E,
    hashes: &AtomicU64,
) -> SearchOutcome {
    let mut attempts = 0u64;

    loop {
        if control.is_cancelled() {
            return SearchOutcome::Cancelled { attempts };
        }
        if control.is_expired() {
            return SearchOutcome::TimedOut { attempts };
        }

        for tried in 1..=SEARCH_BATCH_SIZE {
            let nonce = WorkNonce::new(source.next_u64());
            let value = work_value(nonce, root);
            if difficulty.is_met_by(value) {
                attempts += tried;
                hashes.fetch_add(tried, Ordering::Relaxed);
                control.signal_found();
                return SearchOutcome::Found(WorkResult {
                    nonce,
                    difficulty,
                    value,
                    attempts,
                });
            }
        }

        attempts += SEARCH_BATCH_SIZE;
        hashes.fetch_add(SEARCH_BATCH_SIZE, Ordering::Relaxed);
    }
}

/// Single-threaded search for work on `block`, drawing from the OS entropy
pub fn search(block: &StateBlock, difficulty: Difficulty, deadline: Instant) -> SearchOutcome {
    let control = SearchControl::new(deadline, CancellationToken::new());
    let hashes = AtomicU64::new(0);
    search_loop(
        &WorkRoot::of(block),
        difficulty,
        &control,
        &mut os_entropy(),
        &hashes,
    )
}
