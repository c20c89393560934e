//! Nano Block Client
//!
//! Client-side building blocks for a Nano-style account-chain ledger:
//! - Deterministic key derivation from a seed and account index
//! - Address encoding and decoding with checksum verification
//! - State block hashing, signing and verification
//! - Proof-of-work validation and multi-threaded or node-delegated generation
//! - Publishing finished blocks to a node over JSON-RPC

pub mod address;
pub mod block;
pub mod client;
pub mod config;
pub mod crypto;
pub mod entropy;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;
pub mod wallet;
pub mod work;
pub mod worker;

pub use address::Address;
pub use block::{BlockSubtype, Link, StateBlock};
pub use config::Config;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use types::*;
pub use wallet::{Account, AccountState, BlockPublisher};
pub use work::{SearchOutcome, WorkResult, WorkThresholds};

/// Application information
pub const APP_NAME: &str = "nano-block-client";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
