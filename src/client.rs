//! Node client
//!
//! [`NodeClient`] is the boundary a finished block crosses; [`RpcClient`]
//! implements it over the node's JSON-RPC and adds the read-only calls the
//! wallet layer needs (account state, remote work generation, version).

use crate::address::Address;
use crate::block::{BlockSubtype, StateBlock};
use crate::types::{Balance, BlockHash, Difficulty, WorkNonce};
use crate::utils::ExponentialBackoff;
use crate::work::WorkRoot;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Node reply used to tell "unopened" apart from real failures
const ACCOUNT_NOT_FOUND: &str = "Account not found";

/// Receives finished blocks
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Hand a signed block with valid work to the node
    async fn submit(&self, block: &StateBlock, subtype: BlockSubtype) -> Result<SubmitResponse>;
}

/// Node acknowledgement of a submitted block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Hash the node computed for the block
    pub hash: BlockHash,
}

/// Current state of an opened account, as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    /// Hash of the latest block
    pub frontier: BlockHash,
    /// Balance after the latest block
    pub balance: Balance,
    /// Representative set by the latest block
    pub representative: Address,
    /// Number of blocks in the chain
    #[serde(deserialize_with = "de_u64_string")]
    pub block_count: u64,
}

/// Node version information
#[derive(Debug, Clone, Deserialize)]
pub struct NodeVersion {
    #[serde(default)]
    pub rpc_version: String,
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub node_vendor: String,
    #[serde(default)]
    pub network: String,
}

/// Facts about one block, as reported by the node
#[derive(Debug, Clone, Deserialize)]
pub struct BlockInfo {
    /// Account whose chain contains the block
    pub block_account: Address,
    /// Amount moved by the block
    pub amount: Balance,
    /// Role of a state block (`send`, `receive`, ...)
    #[serde(default)]
    pub subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkGenerateResponse {
    work: WorkNonce,
    #[serde(default)]
    difficulty: Option<Difficulty>,
}

fn de_u64_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_retries: 5,
        }
    }
}

/// JSON-RPC client for a node
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: Url,
    backoff_config: BackoffConfig,
}

impl RpcClient {
    /// Create a client for the RPC endpoint at `url`
    pub fn new(url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| Error::config(format!("Invalid node URL: {}", e)))?;

        let client = ClientBuilder::new().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            backoff_config: BackoffConfig::default(),
        })
    }

    /// Set custom backoff configuration
    pub fn with_backoff_config(mut self, config: BackoffConfig) -> Self {
        self.backoff_config = config;
        self
    }

    /// Get the endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Query the node's version
    #[instrument(skip(self))]
    pub async fn version(&self) -> Result<NodeVersion> {
        let version: NodeVersion = self.call(&json!({ "action": "version" })).await?;
        info!(
            "Connected to {} (rpc {}, protocol {}, network {})",
            version.node_vendor, version.rpc_version, version.protocol_version, version.network
        );
        Ok(version)
    }

    /// Query an account's current state; `None` when it has no blocks yet
    #[instrument(skip_all, fields(account = %account))]
    pub async fn account_info(&self, account: &Address) -> Result<Option<AccountInfo>> {
        let request = json!({
            "action": "account_info",
            "account": account.to_string(),
            "representative": "true",
        });

        match self.call(&request).await {
            Ok(info) => Ok(Some(info)),
            Err(Error::Node { message }) if message == ACCOUNT_NOT_FOUND => {
                debug!("Account {} is not opened yet", account);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a block by hash
    #[instrument(skip_all, fields(hash = %hash))]
    pub async fn block_info(&self, hash: &BlockHash) -> Result<BlockInfo> {
        let request = json!({
            "action": "block_info",
            "json_block": "true",
            "hash": hash.to_hex(),
        });
        self.call(&request).await
    }

    /// Send blocks waiting to be received by `account`, with their amounts
    #[instrument(skip_all, fields(account = %account))]
    pub async fn receivable(
        &self,
        account: &Address,
        count: usize,
    ) -> Result<Vec<(BlockHash, Balance)>> {
        let request = json!({
            "action": "receivable",
            "account": account.to_string(),
            "count": count.to_string(),
            "threshold": "1",
        });

        let response: Value = self.call(&request).await?;
        // an account with nothing receivable gets an empty string instead of a map
        let Some(blocks) = response.get("blocks").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };

        blocks
            .iter()
            .map(|(hash, amount)| -> Result<(BlockHash, Balance)> {
                let amount = amount
                    .as_str()
                    .ok_or_else(|| Error::node(format!("non-string amount for {}", hash)))?;
                Ok((BlockHash::from_hex(hash)?, amount.parse()?))
            })
            .collect()
    }

    /// Ask the node to generate work for `root`
    ///
    /// The returned nonce is not checked here.
    #[instrument(skip_all, fields(root = %root, difficulty = %difficulty))]
    pub async fn work_generate(
        &self,
        root: &WorkRoot,
        difficulty: Difficulty,
    ) -> Result<WorkNonce> {
        let request = json!({
            "action": "work_generate",
            "hash": root.to_hex(),
            "difficulty": difficulty.to_hex(),
        });

        let response: WorkGenerateResponse = self.call(&request).await?;
        debug!(
            "Node generated work {} (reported difficulty {:?})",
            response.work,
            response.difficulty.map(|d| d.to_hex())
        );
        Ok(response.work)
    }

    /// Tell the node to stop generating work for `root`
    #[instrument(skip_all, fields(root = %root))]
    pub async fn work_cancel(&self, root: &WorkRoot) -> Result<()> {
        let request = json!({
            "action": "work_cancel",
            "hash": root.to_hex(),
        });
        let _: Value = self.call(&request).await?;
        Ok(())
    }

    /// Publish a block
    #[instrument(skip_all, fields(hash = %block.hash(), subtype = %subtype))]
    pub async fn process(&self, block: &StateBlock, subtype: BlockSubtype) -> Result<BlockHash> {
        let request = json!({
            "action": "process",
            "json_block": "true",
            "subtype": subtype.as_str(),
            "block": serde_json::to_value(block)?,
        });

        let response: SubmitResponse = self.call(&request).await?;
        info!("Node accepted block {}", response.hash);
        Ok(response.hash)
    }

    /// Send one RPC request and decode the reply
    ///
    /// A reply carrying an `error` member becomes [`Error::Node`].
    async fn call<T: DeserializeOwned>(&self, request: &Value) -> Result<T> {
        let body = self.post_with_retry(request).await?;
        let value: Value = serde_json::from_str(&body)?;

        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(Error::node(message));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// POST request with exponential backoff retry
    async fn post_with_retry(&self, request: &Value) -> Result<String> {
        let mut backoff = ExponentialBackoff::new(
            self.backoff_config.initial_delay,
            self.backoff_config.max_delay,
            self.backoff_config.multiplier,
        );

        loop {
            let attempt = backoff.attempt() as usize;
            match self.client.post(self.url.clone()).json(request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    if !is_retryable_status(status) {
                        return Err(Error::node(format!("HTTP {}", status)));
                    }
                    if attempt >= self.backoff_config.max_retries {
                        return Err(Error::network(format!(
                            "HTTP {} after {} attempts",
                            status,
                            attempt + 1
                        )));
                    }
                }
                Err(e) => {
                    let error = Error::from(e);
                    if !error.is_retryable() || attempt >= self.backoff_config.max_retries {
                        return Err(error);
                    }
                }
            }

            let delay = backoff.next_delay();
            warn!(
                "RPC request failed, retrying in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                self.backoff_config.max_retries
            );
            sleep(delay).await;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl NodeClient for RpcClient {
    async fn submit(&self, block: &StateBlock, subtype: BlockSubtype) -> Result<SubmitResponse> {
        let hash = self.process(block, subtype).await?;
        Ok(SubmitResponse { hash })
    }
}
