//! CPU work worker
//!
//! Runs one random search loop per thread on tokio's blocking pool. All loops
//! share the deadline and a child of the caller's cancellation token; the
//! first loop to find work cancels the child, which stops its siblings without
//! touching the caller's token.

use super::{compute_hash_rate, work_span, WorkStats, WorkWorker};
use crate::entropy::os_entropy;
use crate::types::Difficulty;
use crate::utils::{format_duration, format_hash_rate};
use crate::work::{search_loop, SearchControl, SearchOutcome, WorkRoot};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

/// CPU work worker using multiple threads
pub struct CpuWorker {
    thread_count: usize,
    stats: Mutex<WorkStats>,
}

impl CpuWorker {
    /// Create a new CPU worker with specified thread count
    pub fn new(thread_count: usize) -> Self {
        let thread_count = if thread_count == 0 {
            num_cpus::get()
        } else {
            thread_count
        };

        debug!("Creating CPU worker with {} threads", thread_count);

        Self {
            thread_count,
            stats: Mutex::new(WorkStats::default()),
        }
    }

    /// Get the number of search threads
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

#[async_trait]
impl WorkWorker for CpuWorker {
    fn worker_type(&self) -> &'static str {
        "cpu"
    }

    async fn generate(
        &self,
        root: WorkRoot,
        difficulty: Difficulty,
        deadline: Instant,
        cancellation: CancellationToken,
    ) -> Result<SearchOutcome> {
        let span = work_span(self.worker_type(), &root, difficulty);

        async move {
            info!(
                "Searching with {} threads (expected {:.0} attempts)",
                self.thread_count,
                difficulty.expected_attempts()
            );

            let started = Instant::now();
            let control = SearchControl::new(deadline, cancellation.child_token());
            let hashes = Arc::new(AtomicU64::new(0));

            let handles: Vec<_> = (0..self.thread_count)
                .map(|thread_id| {
                    let control = control.clone();
                    let hashes = Arc::clone(&hashes);
                    task::spawn_blocking(move || {
                        let outcome =
                            search_loop(&root, difficulty, &control, &mut os_entropy(), &hashes);
                        debug!(
                            "Thread {} stopped after {} attempts",
                            thread_id,
                            outcome.attempts()
                        );
                        outcome
                    })
                })
                .collect();

            // every thread is joined before the outcome is decided
            let mut found = None;
            for joined in join_all(handles).await {
                let outcome = joined.map_err(|e| Error::worker("cpu", e.to_string()))?;
                if let (None, SearchOutcome::Found(result)) = (&found, outcome) {
                    found = Some(result);
                }
            }

            let elapsed = started.elapsed();
            let total = hashes.load(Ordering::Relaxed);
            self.stats.lock().record_search(total, elapsed, found.is_some());

            let outcome = match found {
                Some(mut result) => {
                    result.attempts = total;
                    info!(
                        "Found work {} in {} ({})",
                        result.nonce,
                        format_duration(elapsed),
                        format_hash_rate(compute_hash_rate(total, elapsed))
                    );
                    SearchOutcome::Found(result)
                }
                None if cancellation.is_cancelled() => {
                    info!("Work search cancelled after {} attempts", total);
                    SearchOutcome::Cancelled { attempts: total }
                }
                None => {
                    info!(
                        "Work search timed out after {} attempts in {}",
                        total,
                        format_duration(elapsed)
                    );
                    SearchOutcome::TimedOut { attempts: total }
                }
            };
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    fn stats(&self) -> WorkStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::validate_root;
    use assert_matches::assert_matches;
    use std::time::Duration;

    const ROOT: &str = "718CC2121C3E641059BC1C2CFC45666C99E8AE922F7A807B7D07B62C995D79E2";

    #[test]
    fn test_cpu_worker_creation() {
        let worker = CpuWorker::new(2);
        assert_eq!(worker.thread_count(), 2);
        assert_eq!(worker.worker_type(), "cpu");
        assert!(CpuWorker::new(0).thread_count() >= 1);
    }

    #[tokio::test]
    async fn test_cpu_worker_finds_easy_work() {
        let worker = CpuWorker::new(4);
        let root = WorkRoot::from_hex(ROOT).unwrap();
        let difficulty = Difficulty::new(0xff00_0000_0000_0000);
        let cancellation = CancellationToken::new();

        let outcome = worker
            .generate(
                root,
                difficulty,
                Instant::now() + Duration::from_secs(30),
                cancellation.clone(),
            )
            .await
            .unwrap();

        let result = outcome.found().unwrap();
        assert!(validate_root(&root, result.nonce, difficulty));
        assert_eq!(result.difficulty, difficulty);
        // the caller's token is left alone
        assert!(!cancellation.is_cancelled());

        let stats = worker.stats();
        assert_eq!(stats.searches, 1);
        assert_eq!(stats.solutions_found, 1);
        assert_eq!(stats.total_hashes, result.attempts);
    }

    #[tokio::test]
    async fn test_cpu_worker_times_out() {
        let worker = CpuWorker::new(2);
        let outcome = worker
            .generate(
                WorkRoot::from_hex(ROOT).unwrap(),
                Difficulty::new(u64::MAX),
                Instant::now() + Duration::from_millis(100),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_matches!(outcome, SearchOutcome::TimedOut { .. });
        assert_eq!(worker.stats().solutions_found, 0);
    }

    #[tokio::test]
    async fn test_cpu_worker_cancellation() {
        let worker = CpuWorker::new(2);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = worker
            .generate(
                WorkRoot::from_hex(ROOT).unwrap(),
                Difficulty::new(u64::MAX),
                Instant::now() + Duration::from_secs(30),
                cancellation,
            )
            .await
            .unwrap();

        assert_eq!(outcome, SearchOutcome::Cancelled { attempts: 0 });
    }
}
