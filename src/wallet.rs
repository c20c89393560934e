//! Account orchestration
//!
//! Sequences the lower layers: derive an account, build the next block of its
//! chain, sign it, attach work of the right tier, check both locally and hand
//! the block to the node. Nothing here is stateful beyond what the caller
//! passes in.

use crate::address::Address;
use crate::block::{Link, StateBlock};
use crate::client::{AccountInfo, NodeClient, SubmitResponse};
use crate::crypto::{derive, KeyPair};
use crate::types::{Balance, BlockHash, Seed};
use crate::work::{self, SearchOutcome, WorkRoot, WorkThresholds};
use crate::worker::WorkWorker;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Keys and address of one account
#[derive(Debug, Clone)]
pub struct Account {
    keys: KeyPair,
    address: Address,
}

/// What the next block of an opened account builds on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    /// Hash of the latest block
    pub frontier: BlockHash,
    /// Balance after the latest block
    pub balance: Balance,
    /// Current representative
    pub representative: Address,
}

impl From<AccountInfo> for AccountState {
    fn from(info: AccountInfo) -> Self {
        Self {
            frontier: info.frontier,
            balance: info.balance,
            representative: info.representative,
        }
    }
}

impl Account {
    /// Derive the account at `index` of `seed`
    pub fn derive(seed: &Seed, index: u64) -> Result<Self> {
        Ok(Self::from_keys(derive(seed, index)?))
    }

    /// Wrap an existing key pair
    pub fn from_keys(keys: KeyPair) -> Self {
        let address = Address::new(*keys.public_key());
        Self { keys, address }
    }

    /// Get the key pair
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Get the address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Block receiving `amount` from the send block `source`
    ///
    /// Without `state` this is the account's open block, which needs an
    /// explicit representative. Otherwise `representative` defaults to the
    /// current one.
    pub fn receive_block(
        &self,
        state: Option<&AccountState>,
        source: BlockHash,
        amount: Balance,
        representative: Option<Address>,
    ) -> Result<StateBlock> {
        if source.is_zero() {
            return Err(Error::invalid_link(source.to_hex()));
        }

        let (previous, balance, representative) = match state {
            None => {
                let representative = representative.ok_or_else(|| {
                    Error::invalid_state("opening an account requires a representative")
                })?;
                (BlockHash::ZERO, amount, representative)
            }
            Some(state) => (
                state.frontier,
                state.balance.checked_add(amount)?,
                representative.unwrap_or(state.representative),
            ),
        };

        Ok(StateBlock::new(
            self.address,
            previous,
            representative,
            balance,
            Link::Receive(source),
        ))
    }

    /// Block sending `amount` to `destination`
    pub fn send_block(
        &self,
        state: &AccountState,
        destination: &Address,
        amount: Balance,
    ) -> Result<StateBlock> {
        Ok(StateBlock::new(
            self.address,
            state.frontier,
            state.representative,
            state.balance.checked_sub(amount)?,
            Link::Send(*destination.public_key()),
        ))
    }

    /// Block changing the representative to `representative`
    pub fn change_block(&self, state: &AccountState, representative: Address) -> StateBlock {
        StateBlock::new(
            self.address,
            state.frontier,
            representative,
            state.balance,
            Link::Change,
        )
    }
}

/// Settings for finalizing blocks
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Difficulty per block role
    pub thresholds: WorkThresholds,
    /// Longest time spent generating work for one block
    pub work_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            thresholds: WorkThresholds::default(),
            work_timeout: Duration::from_secs(120),
        }
    }
}

/// Signs, attaches work to and publishes blocks
pub struct BlockPublisher {
    client: Arc<dyn NodeClient>,
    worker: Box<dyn WorkWorker>,
    config: PublisherConfig,
    shutdown: CancellationToken,
}

impl BlockPublisher {
    /// Create a publisher
    pub fn new(
        client: Arc<dyn NodeClient>,
        worker: Box<dyn WorkWorker>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            client,
            worker,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that aborts running work searches when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Get the work worker
    pub fn worker(&self) -> &dyn WorkWorker {
        self.worker.as_ref()
    }

    /// Sign `block` with `keys` and attach work of its tier
    ///
    /// The result is checked locally: a block leaving this function verifies
    /// under its account and carries work valid for its subtype.
    #[instrument(skip_all, fields(account = %block.account(), subtype = %block.subtype()))]
    pub async fn finalize(&self, mut block: StateBlock, keys: &KeyPair) -> Result<StateBlock> {
        let subtype = block.subtype();
        let difficulty = self.config.thresholds.for_subtype(subtype);

        block.sign_with(keys)?;

        let root = WorkRoot::of(&block);
        let deadline = Instant::now() + self.config.work_timeout;
        let outcome = self
            .worker
            .generate(root, difficulty, deadline, self.shutdown.child_token())
            .await?;

        let nonce = match outcome {
            SearchOutcome::Found(result) => result.nonce,
            SearchOutcome::TimedOut { attempts } => {
                warn!("No work after {:?} ({} attempts)", self.config.work_timeout, attempts);
                return Err(Error::WorkTimeout { attempts });
            }
            SearchOutcome::Cancelled { .. } => {
                return Err(Error::cancelled("work generation"));
            }
        };

        if !work::validate(&block, nonce, difficulty) {
            return Err(Error::worker(
                self.worker.worker_type(),
                format!("work {} does not meet {}", nonce, difficulty),
            ));
        }
        block.set_work(nonce);

        if !block.has_valid_signature() {
            return Err(Error::invalid_state("block signature does not verify"));
        }

        info!("Finalized {} block {}", subtype, block.hash());
        Ok(block)
    }

    /// Submit a finalized block
    ///
    /// Incomplete blocks, bad signatures and insufficient work are rejected
    /// before anything is sent.
    #[instrument(skip_all, fields(hash = %block.hash()))]
    pub async fn publish(&self, block: &StateBlock) -> Result<SubmitResponse> {
        let subtype = block.subtype();
        let work = block
            .work()
            .ok_or_else(|| Error::invalid_state("block has no work"))?;
        if !block.has_valid_signature() {
            return Err(Error::invalid_state("block is unsigned or signed by another key"));
        }
        if !work::validate(block, work, self.config.thresholds.for_subtype(subtype)) {
            return Err(Error::invalid_state(format!(
                "work {} is below the {} threshold",
                work, subtype
            )));
        }

        let response = match self.client.submit(block, subtype).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    category = e.category(),
                    retryable = e.is_retryable(),
                    "Submitting {} block failed: {}",
                    subtype,
                    e
                );
                return Err(e);
            }
        };
        if response.hash != block.hash() {
            return Err(Error::node(format!(
                "node reported hash {} for block {}",
                response.hash,
                block.hash()
            )));
        }

        info!("Published {} block {}", subtype, response.hash);
        Ok(response)
    }

    /// Finalize then publish
    pub async fn finalize_and_publish(
        &self,
        block: StateBlock,
        keys: &KeyPair,
    ) -> Result<(StateBlock, SubmitResponse)> {
        let block = self.finalize(block, keys).await?;
        let response = self.publish(&block).await?;
        Ok((block, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockSubtype;
    use crate::types::{Difficulty, Signature, WorkNonce};
    use crate::worker::CpuWorker;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const SOURCE: &str = "A170D51B94E00371ACE76E35AC81DC9405D5D04D4CEBC399AEACE07AE05DD293";
    const REPRESENTATIVE: &str =
        "nano_3rrf6cus8pye6o1kzi5n6wwjof8bjb7ff4xcgesi3njxid6x64pms6onw1f9";

    #[derive(Default)]
    struct RecordingNode {
        submitted: Mutex<Vec<(StateBlock, BlockSubtype)>>,
    }

    #[async_trait]
    impl NodeClient for RecordingNode {
        async fn submit(
            &self,
            block: &StateBlock,
            subtype: BlockSubtype,
        ) -> Result<SubmitResponse> {
            self.submitted.lock().push((block.clone(), subtype));
            Ok(SubmitResponse { hash: block.hash() })
        }
    }

    struct RejectingNode;

    #[async_trait]
    impl NodeClient for RejectingNode {
        async fn submit(&self, _: &StateBlock, _: BlockSubtype) -> Result<SubmitResponse> {
            Err(Error::node("Fork"))
        }
    }

    fn account() -> Account {
        Account::derive(&Seed::from_bytes([0u8; 32]), 0).unwrap()
    }

    fn easy_config() -> PublisherConfig {
        PublisherConfig {
            thresholds: WorkThresholds {
                send: Difficulty::new(0xfc00_0000_0000_0000),
                receive: Difficulty::new(0xf000_0000_0000_0000),
            },
            work_timeout: Duration::from_secs(30),
        }
    }

    fn state() -> AccountState {
        AccountState {
            frontier: BlockHash::from_hex(SOURCE).unwrap(),
            balance: Balance::new(1000),
            representative: REPRESENTATIVE.parse().unwrap(),
        }
    }

    #[test]
    fn test_account_derive() {
        let account = account();
        assert_eq!(
            account.address().to_string(),
            "nano_3i1aq1cchnmbn9x5rsbap8b15akfh7wj7pwskuzi7ahz8oq6cobd99d4r3b7"
        );
        assert_matches!(
            Account::derive(&Seed::from_bytes([0u8; 32]), 1 << 32),
            Err(Error::IndexOutOfRange { .. })
        );
    }

    #[test]
    fn test_open_block() {
        let representative: Address = REPRESENTATIVE.parse().unwrap();
        let source = BlockHash::from_hex(SOURCE).unwrap();

        let block = account()
            .receive_block(None, source, Balance::new(10u128.pow(30)), Some(representative))
            .unwrap();
        assert_eq!(block.subtype(), BlockSubtype::Open);
        assert_eq!(
            block.hash().to_hex(),
            "D8F678EBE97FCC9EEF4FAF73C93DD4937D09072504A721C81079F8C2D5710C6D"
        );

        assert_matches!(
            account().receive_block(None, source, Balance::new(1), None),
            Err(Error::InvalidState { .. })
        );
        assert_matches!(
            account().receive_block(None, BlockHash::ZERO, Balance::new(1), Some(representative)),
            Err(Error::InvalidLinkFormat { .. })
        );
    }

    #[test]
    fn test_receive_send_change_blocks() {
        let account = account();
        let state = state();
        let source = BlockHash::from_hex(SOURCE).unwrap();

        let receive = account
            .receive_block(Some(&state), source, Balance::new(5), None)
            .unwrap();
        assert_eq!(receive.subtype(), BlockSubtype::Receive);
        assert_eq!(receive.balance(), Balance::new(1005));
        assert_eq!(receive.representative(), &state.representative);

        let destination: Address = REPRESENTATIVE.parse().unwrap();
        let send = account.send_block(&state, &destination, Balance::new(400)).unwrap();
        assert_eq!(send.subtype(), BlockSubtype::Send);
        assert_eq!(send.balance(), Balance::new(600));
        assert_eq!(send.link(), &Link::Send(*destination.public_key()));

        assert_matches!(
            account.send_block(&state, &destination, Balance::new(1001)),
            Err(Error::InsufficientBalance { available: 1000, required: 1001 })
        );

        let change = account.change_block(&state, *account.address());
        assert_eq!(change.subtype(), BlockSubtype::Change);
        assert_eq!(change.balance(), state.balance);
        assert_eq!(change.link().payload(), [0u8; 32]);
    }

    #[test]
    fn test_receive_overflow() {
        let state = AccountState {
            balance: Balance::new(u128::MAX),
            ..state()
        };
        let source = BlockHash::from_hex(SOURCE).unwrap();
        assert_matches!(
            account().receive_block(Some(&state), source, Balance::new(1), None),
            Err(Error::InvalidBalance { .. })
        );
    }

    #[tokio::test]
    async fn test_finalize_and_publish() {
        let node = Arc::new(RecordingNode::default());
        let publisher =
            BlockPublisher::new(node.clone(), Box::new(CpuWorker::new(2)), easy_config());
        let account = account();

        let block = account
            .receive_block(
                None,
                BlockHash::from_hex(SOURCE).unwrap(),
                Balance::new(10),
                Some(REPRESENTATIVE.parse().unwrap()),
            )
            .unwrap();

        let (block, response) = publisher
            .finalize_and_publish(block, account.keys())
            .await
            .unwrap();

        assert!(block.is_complete());
        assert!(block.has_valid_signature());
        assert!(work::validate(&block, block.work().unwrap(), easy_config().thresholds.receive));
        assert_eq!(response.hash, block.hash());

        let submitted = node.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1, BlockSubtype::Open);
    }

    #[tokio::test]
    async fn test_finalize_times_out() {
        let config = PublisherConfig {
            thresholds: WorkThresholds {
                send: Difficulty::new(u64::MAX),
                receive: Difficulty::new(u64::MAX),
            },
            work_timeout: Duration::from_millis(100),
        };
        let publisher = BlockPublisher::new(
            Arc::new(RecordingNode::default()),
            Box::new(CpuWorker::new(1)),
            config,
        );
        let account = account();
        let block = account.change_block(&state(), *account.address());

        assert_matches!(
            publisher.finalize(block, account.keys()).await,
            Err(Error::WorkTimeout { .. })
        );
    }

    #[tokio::test]
    async fn test_finalize_cancelled_by_shutdown() {
        let publisher = BlockPublisher::new(
            Arc::new(RecordingNode::default()),
            Box::new(CpuWorker::new(1)),
            PublisherConfig::default(),
        );
        publisher.shutdown_token().cancel();

        let account = account();
        let block = account.change_block(&state(), *account.address());
        assert_matches!(
            publisher.finalize(block, account.keys()).await,
            Err(Error::Cancelled { .. })
        );
    }

    #[tokio::test]
    async fn test_finalize_rejects_foreign_keys() {
        let publisher = BlockPublisher::new(
            Arc::new(RecordingNode::default()),
            Box::new(CpuWorker::new(1)),
            easy_config(),
        );
        let other = Account::derive(&Seed::from_bytes([0u8; 32]), 1).unwrap();
        let block = account().change_block(&state(), *other.address());

        assert_matches!(
            publisher.finalize(block, other.keys()).await,
            Err(Error::InvalidState { .. })
        );
    }

    #[tokio::test]
    async fn test_publish_rejects_incomplete_blocks() {
        let node = Arc::new(RecordingNode::default());
        let publisher =
            BlockPublisher::new(node.clone(), Box::new(CpuWorker::new(1)), easy_config());
        let account = account();

        let mut block = account.change_block(&state(), *account.address());
        assert_matches!(publisher.publish(&block).await, Err(Error::InvalidState { .. }));

        block.set_work(WorkNonce::new(1));
        block.set_signature(Signature([0u8; 64]));
        assert_matches!(publisher.publish(&block).await, Err(Error::InvalidState { .. }));

        block.sign_with(account.keys()).unwrap();
        // tier check: search for a nonce that is valid for nothing
        let root = WorkRoot::of(&block);
        let weak = (0u64..)
            .map(WorkNonce::new)
            .find(|n| work::work_value(*n, &root) < 0x1000_0000_0000_0000)
            .unwrap();
        block.set_work(weak);
        assert_matches!(publisher.publish(&block).await, Err(Error::InvalidState { .. }));

        assert!(node.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_node_rejection_is_returned() {
        let publisher = BlockPublisher::new(
            Arc::new(RejectingNode),
            Box::new(CpuWorker::new(1)),
            easy_config(),
        );
        let account = account();
        let block = account
            .receive_block(
                None,
                BlockHash::from_hex(SOURCE).unwrap(),
                Balance::new(1),
                Some(REPRESENTATIVE.parse().unwrap()),
            )
            .unwrap();

        let err = publisher
            .finalize_and_publish(block, account.keys())
            .await
            .unwrap_err();
        assert_matches!(err, Error::Node { ref message } if message == "Fork");
        assert!(!err.is_retryable());
        assert_eq!(err.category(), "node");
    }
}
