//! Work generation workers
//!
//! A worker turns a work root and a threshold into a [`SearchOutcome`]. The
//! CPU worker searches locally on blocking threads; the remote worker asks the
//! node and checks the answer.

use crate::client::RpcClient;
use crate::config::{Config, WorkerType};
use crate::types::Difficulty;
use crate::work::{SearchOutcome, WorkRoot};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub mod cpu;
pub mod remote;

pub use cpu::CpuWorker;
pub use remote::RemoteWorker;

/// Work statistics for a worker
#[derive(Debug, Clone, Default)]
pub struct WorkStats {
    /// Total candidates hashed
    pub total_hashes: u64,
    /// Number of searches that found work
    pub solutions_found: u64,
    /// Number of searches started
    pub searches: u64,
    /// Time spent searching
    pub search_time: Duration,
    /// Average hash rate (hashes per second)
    pub average_hash_rate: f64,
}

impl WorkStats {
    /// Account for one finished search
    pub fn record_search(&mut self, hashes: u64, elapsed: Duration, found: bool) {
        self.searches += 1;
        self.total_hashes += hashes;
        self.search_time += elapsed;
        if found {
            self.solutions_found += 1;
        }
        self.average_hash_rate = compute_hash_rate(self.total_hashes, self.search_time);
    }
}

/// Work generation worker
#[async_trait]
pub trait WorkWorker: Send + Sync {
    /// Get the worker type name for logging
    fn worker_type(&self) -> &'static str;

    /// Search for a nonce meeting `difficulty` on `root`
    ///
    /// Stops at `deadline` with [`SearchOutcome::TimedOut`] and on
    /// `cancellation` with [`SearchOutcome::Cancelled`]. Errors are reserved
    /// for failures of the worker itself.
    async fn generate(
        &self,
        root: WorkRoot,
        difficulty: Difficulty,
        deadline: Instant,
        cancellation: CancellationToken,
    ) -> Result<SearchOutcome>;

    /// Get accumulated statistics
    fn stats(&self) -> WorkStats {
        WorkStats::default()
    }
}

/// Worker factory for creating the configured work worker
pub struct WorkerFactory;

impl WorkerFactory {
    /// Create a CPU worker; zero threads means one per core
    pub fn create_cpu_worker(thread_count: usize) -> Box<dyn WorkWorker> {
        Box::new(CpuWorker::new(thread_count))
    }

    /// Create a worker delegating to the node
    pub fn create_remote_worker(client: Arc<RpcClient>) -> Box<dyn WorkWorker> {
        Box::new(RemoteWorker::new(client))
    }

    /// Create the worker selected in `config`
    pub fn from_config(config: &Config, client: Arc<RpcClient>) -> Box<dyn WorkWorker> {
        match config.worker {
            WorkerType::Cpu => Self::create_cpu_worker(config.thread_count),
            WorkerType::Remote => Self::create_remote_worker(client),
        }
    }
}

/// Utility function to compute hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Create a tracing span for work generation
pub fn work_span(worker_type: &str, root: &WorkRoot, difficulty: Difficulty) -> Span {
    tracing::info_span!(
        "work",
        worker_type = worker_type,
        root = %root,
        difficulty = %difficulty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_stats() {
        let mut stats = WorkStats::default();

        stats.record_search(1000, Duration::from_secs(10), true);
        assert_eq!(stats.total_hashes, 1000);
        assert_eq!(stats.solutions_found, 1);
        assert_eq!(stats.average_hash_rate, 100.0);

        stats.record_search(500, Duration::from_secs(5), false);
        assert_eq!(stats.searches, 2);
        assert_eq!(stats.solutions_found, 1);
        assert_eq!(stats.average_hash_rate, 100.0);
    }

    #[test]
    fn test_compute_hash_rate() {
        assert_eq!(compute_hash_rate(1000, Duration::from_secs(10)), 100.0);
        assert_eq!(compute_hash_rate(0, Duration::from_secs(10)), 0.0);
        assert_eq!(compute_hash_rate(1000, Duration::from_secs(0)), 0.0);
    }

    #[tokio::test]
    async fn test_worker_factory() {
        let client = Arc::new(
            RpcClient::new("http://localhost:7076", Duration::from_secs(1)).unwrap(),
        );

        let mut config = Config::default();
        assert_eq!(WorkerFactory::from_config(&config, client.clone()).worker_type(), "cpu");

        config.worker = WorkerType::Remote;
        assert_eq!(WorkerFactory::from_config(&config, client).worker_type(), "remote");
    }
}
