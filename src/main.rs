//! Nano Block Client - command line harness
//!
//! Each action flag runs one sequence against the library and exits.

use anyhow::{bail, Context};
use nano_block_client::{
    client::RpcClient,
    config::Config,
    entropy::os_entropy,
    logging::init_logging,
    wallet::{Account, AccountState, BlockPublisher},
    work::{self, WorkRoot},
    worker::WorkerFactory,
    Balance, BlockHash, Difficulty, Seed, WorkNonce, APP_DESCRIPTION, APP_NAME, APP_VERSION,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().await.context("Invalid configuration")?;
    let _log_guard = init_logging(
        config.log_level,
        config.log_format,
        config.log_file.as_deref(),
    )?;

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    if config.generate_seed {
        generate_and_print_seed()?;
        return Ok(());
    }

    if config.derive {
        let account = account_from_config(&config)?;
        print_account(&account);
        return Ok(());
    }

    let client = Arc::new(
        RpcClient::new(&config.node_url, config.http_timeout_duration())?
            .with_backoff_config(config.backoff()),
    );

    if config.info {
        print_info();
        let version = client.version().await?;
        println!(
            "node: {} (rpc {}, protocol {}, network {})",
            version.node_vendor, version.rpc_version, version.protocol_version, version.network
        );
        return Ok(());
    }

    info!("Starting {} v{} ({})", APP_NAME, APP_VERSION, config);

    if let Some(root) = &config.work_root {
        return run_work(&config, client, root).await;
    }

    if let Some(hash) = &config.receive {
        let source = BlockHash::from_hex(hash)?;
        let amount = sent_amount(&client, &source).await?;
        return receive(&config, client, source, amount).await;
    }

    if config.receive_pending {
        let account = account_from_config(&config)?;
        let (source, amount) = wait_for_receivable(&config, &client, &account).await?;
        return receive(&config, client, source, amount).await;
    }

    show_account(&config, &client).await
}

/// Generate or check work for an explicit root
async fn run_work(config: &Config, client: Arc<RpcClient>, root: &str) -> anyhow::Result<()> {
    let root = WorkRoot::from_hex(root)?;
    let thresholds = config.thresholds()?;

    if let Some(nonce) = &config.validate_work {
        let nonce = WorkNonce::from_hex(nonce)?;
        let value = work::work_value(nonce, &root);
        println!("value:   {:016x}", value);
        println!("send:    {}", verdict(thresholds.send, value));
        println!("receive: {}", verdict(thresholds.receive, value));
        return Ok(());
    }

    let worker = WorkerFactory::from_config(config, client);
    let cancellation = cancel_on_ctrl_c();
    let deadline = Instant::now() + config.work_timeout()?;

    let outcome = worker
        .generate(root, thresholds.send, deadline, cancellation)
        .await?;
    match outcome.found() {
        Some(result) => {
            println!("work:  {}", result.nonce);
            println!("value: {:016x}", result.value);
            Ok(())
        }
        None => bail!("No work found ({} attempts)", outcome.attempts()),
    }
}

fn verdict(difficulty: Difficulty, value: u64) -> String {
    let mark = if difficulty.is_met_by(value) { "valid" } else { "invalid" };
    format!("{} (threshold {})", mark, difficulty)
}

/// Amount moved by the send block `source`
async fn sent_amount(client: &RpcClient, source: &BlockHash) -> anyhow::Result<Balance> {
    let info = client.block_info(source).await?;
    match info.subtype.as_deref() {
        Some("send") => Ok(info.amount),
        other => bail!("Block {} is not a send block (subtype {:?})", source, other),
    }
}

/// Poll until something is waiting to be received
async fn wait_for_receivable(
    config: &Config,
    client: &RpcClient,
    account: &Account,
) -> anyhow::Result<(BlockHash, Balance)> {
    let interval = config.poll_interval()?;
    println!("Waiting for funds to {}", account.address());

    loop {
        let pending = client.receivable(account.address(), 1).await?;
        if let Some(first) = pending.into_iter().next() {
            info!("Found receivable block {} ({} raw)", first.0, first.1);
            return Ok(first);
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => bail!("Interrupted while waiting for funds"),
        }
    }
}

/// Open or extend the configured account with the send block `source`
async fn receive(
    config: &Config,
    client: Arc<RpcClient>,
    source: BlockHash,
    amount: Balance,
) -> anyhow::Result<()> {
    let account = account_from_config(config)?;
    let state = client
        .account_info(account.address())
        .await?
        .map(AccountState::from);

    let representative = match (&state, config.representative()?) {
        (None, None) => bail!("Opening an account needs --representative"),
        (_, representative) => representative,
    };

    let block = account.receive_block(state.as_ref(), source, amount, representative)?;

    let worker = WorkerFactory::from_config(config, client.clone());
    let publisher = BlockPublisher::new(client, worker, config.publisher_config()?);
    let shutdown = publisher.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping work generation");
            shutdown.cancel();
        }
    });

    let (block, response) = publisher
        .finalize_and_publish(block, account.keys())
        .await?;

    println!("published: {}", response.hash);
    println!("balance:   {}", block.balance());
    Ok(())
}

/// Print the configured account and its state on the node
async fn show_account(config: &Config, client: &RpcClient) -> anyhow::Result<()> {
    let account = account_from_config(config)
        .context("Nothing to do; pass an action flag or --seed (see --help)")?;
    print_account(&account);

    match client.account_info(account.address()).await? {
        Some(info) => {
            println!("frontier:       {}", info.frontier);
            println!("balance:        {}", info.balance);
            println!("representative: {}", info.representative);
            println!("blocks:         {}", info.block_count);
        }
        None => println!("account is not opened yet"),
    }
    Ok(())
}

fn account_from_config(config: &Config) -> anyhow::Result<Account> {
    let seed = config
        .seed()?
        .context("A seed is required (--seed or NANO_SEED)")?;
    Ok(Account::derive(&seed, config.index)?)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    token
}

/// Print basic program information
fn print_info() {
    println!("{} v{}", APP_NAME, APP_VERSION);
    println!("{}", APP_DESCRIPTION);
}

/// Generate and print a new seed with its first account
fn generate_and_print_seed() -> anyhow::Result<()> {
    let seed = Seed::generate(&mut os_entropy());
    let account = Account::derive(&seed, 0)?;
    println!("seed:    {}", seed.to_hex());
    println!("address: {}", account.address());
    println!();
    println!("IMPORTANT: Keep your seed secure!");
    println!("Pass it with --seed or the NANO_SEED environment variable.");
    Ok(())
}

fn print_account(account: &Account) {
    println!("address:    {}", account.address());
    println!("public key: {}", account.keys().public_key());
}

/// Print current configuration
fn print_configuration(config: &Config) -> anyhow::Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}
