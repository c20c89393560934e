//! Configuration management for the block client
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON) with validation and defaults. Values
//! derived from it (thresholds, backoff, publisher settings) are handed to the
//! components explicitly.

use crate::address::Address;
use crate::client::BackoffConfig;
use crate::types::{Difficulty, Seed};
use crate::wallet::PublisherConfig;
use crate::work::WorkThresholds;
use crate::{Error, Result, APP_NAME};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Work generation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerType {
    /// Multi-threaded local search
    Cpu,
    /// Delegate to the node's `work_generate`
    Remote,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerType::Cpu => write!(f, "cpu"),
            WorkerType::Remote => write!(f, "remote"),
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line text
    Plain,
    /// Multi-line human-readable text
    Pretty,
    /// One JSON object per event
    Json,
}

/// Complete configuration for the block client
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "nano-block-client",
    version = env!("CARGO_PKG_VERSION"),
    about = "Account-chain block client",
    long_about = "Derives accounts, builds and signs state blocks, generates proof of work and publishes blocks to a node"
)]
pub struct Config {
    /// Query the node's version and exit
    #[arg(long)]
    #[serde(skip)]
    pub info: bool,

    /// Generate a new random seed and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_seed: bool,

    /// Print the key pair and address for --seed/--index and exit
    #[arg(long)]
    #[serde(skip)]
    pub derive: bool,

    /// Generate work for this root (64 hex characters) and exit
    #[arg(long, value_name = "ROOT")]
    #[serde(skip)]
    pub work_root: Option<String>,

    /// With --work-root, check this nonce instead of generating one
    #[arg(long, value_name = "NONCE", requires = "work_root")]
    #[serde(skip)]
    pub validate_work: Option<String>,

    /// Receive the send block with this hash into the --seed/--index account
    #[arg(long, value_name = "HASH")]
    #[serde(skip)]
    pub receive: Option<String>,

    /// Wait for an incoming send to the --seed/--index account and receive it
    #[arg(long, conflicts_with = "receive")]
    #[serde(skip)]
    pub receive_pending: bool,

    /// Polling interval while waiting for an incoming send (e.g. "5s")
    #[arg(long, default_value = "5s")]
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Node RPC endpoint
    #[arg(short = 'n', long, default_value = "http://127.0.0.1:7076")]
    #[serde(default = "default_node_url")]
    pub node_url: String,

    /// Default HTTP timeout in milliseconds
    #[arg(long, default_value = "30000")]
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Maximum retry attempts for HTTP requests
    #[arg(long, default_value = "5")]
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base retry delay in milliseconds
    #[arg(long, default_value = "100")]
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Maximum retry delay in milliseconds
    #[arg(long, default_value = "5000")]
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,

    /// Work generation worker type
    #[arg(short = 'w', long, default_value = "cpu")]
    #[serde(default = "default_worker")]
    pub worker: WorkerType,

    /// Number of search threads for the CPU worker (0 = one per core)
    #[arg(short = 'c', long, default_value = "0")]
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Give up on work generation after this long (e.g. "90s", "2m")
    #[arg(long, default_value = "2m")]
    #[serde(default = "default_work_timeout")]
    pub work_timeout: String,

    /// Work threshold for send and change blocks
    #[arg(long, default_value = "fffffff800000000")]
    #[serde(default = "default_send_difficulty")]
    pub send_difficulty: String,

    /// Work threshold for open and receive blocks
    #[arg(long, default_value = "fffffe0000000000")]
    #[serde(default = "default_receive_difficulty")]
    pub receive_difficulty: String,

    /// Representative for newly opened accounts
    #[arg(short = 'r', long)]
    #[serde(default)]
    pub representative: Option<String>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, default_value = "plain")]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Wallet seed (64 hex characters)
    #[arg(long, env = "NANO_SEED", hide_env_values = true)]
    #[serde(default, skip_serializing)]
    pub seed: Option<String>,

    /// Account index within the seed
    #[arg(short = 'i', long, default_value = "0")]
    #[serde(default)]
    pub index: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            info: false,
            generate_seed: false,
            derive: false,
            work_root: None,
            validate_work: None,
            receive: None,
            receive_pending: false,
            poll_interval: default_poll_interval(),
            print_config: false,
            config_file: None,
            node_url: default_node_url(),
            http_timeout: default_http_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            max_retry_delay: default_max_retry_delay(),
            worker: default_worker(),
            thread_count: default_thread_count(),
            work_timeout: default_work_timeout(),
            send_difficulty: default_send_difficulty(),
            receive_difficulty: default_receive_difficulty(),
            representative: None,
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_file: None,
            seed: None,
            index: 0,
        }
    }
}

impl Config {
    /// Parse the command line, merge the config file if any, and validate
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config
    ///
    /// Values given on the command line win; file values replace CLI values
    /// that are still at their defaults.
    pub fn merge_with_file(mut self, file: Self) -> Self {
        let defaults = Self::default();

        fn prefer<T: PartialEq>(cli: T, default: &T, file: T) -> T {
            if &cli == default {
                file
            } else {
                cli
            }
        }

        self.node_url = prefer(self.node_url, &defaults.node_url, file.node_url);
        self.http_timeout = prefer(self.http_timeout, &defaults.http_timeout, file.http_timeout);
        self.max_retries = prefer(self.max_retries, &defaults.max_retries, file.max_retries);
        self.retry_delay = prefer(self.retry_delay, &defaults.retry_delay, file.retry_delay);
        self.max_retry_delay = prefer(
            self.max_retry_delay,
            &defaults.max_retry_delay,
            file.max_retry_delay,
        );
        self.worker = prefer(self.worker, &defaults.worker, file.worker);
        self.thread_count = prefer(self.thread_count, &defaults.thread_count, file.thread_count);
        self.work_timeout = prefer(self.work_timeout, &defaults.work_timeout, file.work_timeout);
        self.poll_interval = prefer(
            self.poll_interval,
            &defaults.poll_interval,
            file.poll_interval,
        );
        self.send_difficulty = prefer(
            self.send_difficulty,
            &defaults.send_difficulty,
            file.send_difficulty,
        );
        self.receive_difficulty = prefer(
            self.receive_difficulty,
            &defaults.receive_difficulty,
            file.receive_difficulty,
        );
        self.log_level = prefer(self.log_level, &defaults.log_level, file.log_level);
        self.log_format = prefer(self.log_format, &defaults.log_format, file.log_format);
        self.index = prefer(self.index, &defaults.index, file.index);

        if self.representative.is_none() {
            self.representative = file.representative;
        }
        if self.log_file.is_none() {
            self.log_file = file.log_file;
        }
        if self.seed.is_none() {
            self.seed = file.seed;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.node_url)
            .map_err(|e| Error::config(format!("Invalid node URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Node URL must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.http_timeout == 0 {
            return Err(Error::config("HTTP timeout must be greater than 0"));
        }

        if self.retry_delay > self.max_retry_delay {
            return Err(Error::config(
                "Retry delay must not exceed the maximum retry delay",
            ));
        }

        if self.work_timeout()?.is_zero() {
            return Err(Error::config("Work timeout must be greater than 0"));
        }

        if self.poll_interval()?.is_zero() {
            return Err(Error::config("Poll interval must be greater than 0"));
        }

        self.thresholds()?;
        self.seed()?;
        self.representative()?;

        Ok(())
    }

    /// Get HTTP timeout duration
    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    /// Get parsed work timeout
    pub fn work_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.work_timeout)
            .map_err(|e| Error::config(format!("Invalid work timeout: {}", e)))
    }

    /// Get parsed polling interval
    pub fn poll_interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.poll_interval)
            .map_err(|e| Error::config(format!("Invalid poll interval: {}", e)))
    }

    /// Get the difficulty tiers
    pub fn thresholds(&self) -> Result<WorkThresholds> {
        Ok(WorkThresholds {
            send: self.send_difficulty.parse::<Difficulty>()?,
            receive: self.receive_difficulty.parse::<Difficulty>()?,
        })
    }

    /// Get the RPC retry policy
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.retry_delay),
            max_delay: Duration::from_millis(self.max_retry_delay),
            multiplier: 2.0,
            max_retries: self.max_retries,
        }
    }

    /// Get the settings for finalizing blocks
    pub fn publisher_config(&self) -> Result<PublisherConfig> {
        Ok(PublisherConfig {
            thresholds: self.thresholds()?,
            work_timeout: self.work_timeout()?,
        })
    }

    /// Get the parsed seed, if configured
    pub fn seed(&self) -> Result<Option<Seed>> {
        self.seed.as_deref().map(Seed::from_hex).transpose()
    }

    /// Get the parsed default representative, if configured
    pub fn representative(&self) -> Result<Option<Address>> {
        self.representative
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()
    }

    /// Parse a config from command-line style arguments (first item is the
    /// program name)
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| Error::config(e.to_string()))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node={} worker={} threads={} work_timeout={}",
            APP_NAME, self.node_url, self.worker, self.thread_count, self.work_timeout
        )
    }
}

// Default value functions for serde
fn default_node_url() -> String { "http://127.0.0.1:7076".to_string() }
fn default_http_timeout() -> u64 { 30000 }
fn default_max_retries() -> usize { 5 }
fn default_retry_delay() -> u64 { 100 }
fn default_max_retry_delay() -> u64 { 5000 }
fn default_worker() -> WorkerType { WorkerType::Cpu }
fn default_thread_count() -> usize { 0 }
fn default_work_timeout() -> String { "2m".to_string() }
fn default_poll_interval() -> String { "5s".to_string() }
fn default_send_difficulty() -> String { Difficulty::SEND.to_hex() }
fn default_receive_difficulty() -> String { Difficulty::RECEIVE.to_hex() }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Plain }

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SEED: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_config_defaults() {
        let config = Config::from_args(["nano-block-client"]).unwrap();

        assert_eq!(config.worker, WorkerType::Cpu);
        assert_eq!(config.thread_count, 0);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Plain);
        assert_eq!(config.node_url, Config::default().node_url);
        assert_eq!(config.work_timeout().unwrap(), Duration::from_secs(120));
        assert_eq!(config.thresholds().unwrap(), WorkThresholds::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_receive_flags_conflict() {
        assert!(Config::from_args([
            "nano-block-client",
            "--receive",
            SEED,
            "--receive-pending",
        ])
        .is_err());
    }

    #[test]
    fn test_validate_work_requires_root() {
        assert!(Config::from_args(["nano-block-client", "--validate-work", "00"]).is_err());
        assert!(Config::from_args([
            "nano-block-client",
            "--work-root",
            SEED,
            "--validate-work",
            "2bf29ef00786a6bc",
        ])
        .is_ok());
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = r#"
node_url: "https://node.example.com/rpc"
worker: remote
thread_count: 4
work_timeout: 45s
send_difficulty: ffffffc000000000
representative: nano_3rrf6cus8pye6o1kzi5n6wwjof8bjb7ff4xcgesi3njxid6x64pms6onw1f9
log_format: json
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.node_url, "https://node.example.com/rpc");
        assert_eq!(config.worker, WorkerType::Remote);
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.work_timeout().unwrap(), Duration::from_secs(45));
        assert_eq!(config.thresholds().unwrap().send, Difficulty::new(0xffff_ffc0_0000_0000));
        assert_eq!(config.thresholds().unwrap().receive, Difficulty::RECEIVE);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.representative().unwrap().is_some());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_from_json() {
        let mut temp_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(temp_file, r#"{{"max_retries": 9, "log_level": "debug"}}"#).unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.max_retries, 9);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.worker, WorkerType::Cpu);
    }

    #[test]
    fn test_merge_prefers_explicit_cli_values() {
        let cli = Config::from_args(["nano-block-client", "--thread-count", "2"]).unwrap();
        let file = Config {
            thread_count: 8,
            worker: WorkerType::Remote,
            seed: Some(SEED.to_string()),
            ..Config::default()
        };

        let merged = cli.merge_with_file(file);
        assert_eq!(merged.thread_count, 2);
        assert_eq!(merged.worker, WorkerType::Remote);
        assert_eq!(merged.seed.as_deref(), Some(SEED));
    }

    #[test]
    fn test_validation_errors() {
        let bad_url = Config {
            node_url: "ftp://node".to_string(),
            ..Config::default()
        };
        assert_matches!(bad_url.validate(), Err(Error::Config { .. }));

        let bad_timeout = Config {
            work_timeout: "soon".to_string(),
            ..Config::default()
        };
        assert_matches!(bad_timeout.validate(), Err(Error::Config { .. }));

        let bad_difficulty = Config {
            send_difficulty: "fff".to_string(),
            ..Config::default()
        };
        assert_matches!(bad_difficulty.validate(), Err(Error::InvalidDifficulty { .. }));

        let bad_seed = Config {
            seed: Some("abc".to_string()),
            ..Config::default()
        };
        assert_matches!(bad_seed.validate(), Err(Error::InvalidHex { .. }));

        let bad_representative = Config {
            representative: Some("nano_1".to_string()),
            ..Config::default()
        };
        assert_matches!(bad_representative.validate(), Err(Error::InvalidAddressFormat { .. }));
    }

    #[test]
    fn test_seed_is_not_serialized() {
        let config = Config {
            seed: Some(SEED.to_string()),
            ..Config::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains(SEED));
        assert!(yaml.contains("node_url"));
    }

    #[test]
    fn test_backoff_from_config() {
        let config = Config {
            retry_delay: 50,
            max_retry_delay: 1000,
            max_retries: 3,
            ..Config::default()
        };
        let backoff = config.backoff();
        assert_eq!(backoff.initial_delay, Duration::from_millis(50));
        assert_eq!(backoff.max_delay, Duration::from_secs(1));
        assert_eq!(backoff.max_retries, 3);
    }
}
