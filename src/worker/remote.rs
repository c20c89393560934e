//! Remote work worker
//!
//! Delegates generation to the node's `work_generate` and accepts the answer
//! only after checking it against the requested threshold locally.

use super::{work_span, WorkStats, WorkWorker};
use crate::client::RpcClient;
use crate::types::Difficulty;
use crate::work::{work_value, SearchOutcome, WorkResult, WorkRoot};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

/// Worker that asks the node for work
pub struct RemoteWorker {
    client: Arc<RpcClient>,
    stats: Mutex<WorkStats>,
}

impl RemoteWorker {
    /// Create a worker using `client`
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            stats: Mutex::new(WorkStats::default()),
        }
    }

    /// Ask the node to drop an abandoned request
    async fn cancel_remote(&self, root: &WorkRoot) {
        if let Err(e) = self.client.work_cancel(root).await {
            warn!("Failed to cancel remote work: {}", e);
        }
    }
}

#[async_trait]
impl WorkWorker for RemoteWorker {
    fn worker_type(&self) -> &'static str {
        "remote"
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
            let started = Instant::now();
            let request = self.client.work_generate(&root, difficulty);

            let nonce = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!("Remote work request cancelled");
                    self.cancel_remote(&root).await;
                    return Ok(SearchOutcome::Cancelled { attempts: 0 });
                }
                generated = tokio::time::timeout_at(deadline.into(), request) => match generated {
                    Ok(nonce) => nonce?,
                    Err(_) => {
                        info!("Remote work request timed out");
                        self.cancel_remote(&root).await;
                        return Ok(SearchOutcome::TimedOut { attempts: 0 });
                    }
                },
            };

            let value = work_value(nonce, &root);
            if !difficulty.is_met_by(value) {
                return Err(Error::worker(
                    "remote",
                    format!(
                        "node returned work {} with value {:016x} below threshold {}",
                        nonce, value, difficulty
                    ),
                ));
            }

            self.stats.lock().record_search(0, started.elapsed(), true);
            info!("Node generated valid work {}", nonce);
            Ok(SearchOutcome::Found(WorkResult {
                nonce,
                difficulty,
                value,
                attempts: 0,
            }))
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
    use crate::client::tests::serve;
    use crate::client::BackoffConfig;
    use crate::types::WorkNonce;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;

    const ROOT: &str = "718CC2121C3E641059BC1C2CFC45666C99E8AE922F7A807B7D07B62C995D79E2";

    fn no_retries() -> BackoffConfig {
        BackoffConfig {
            max_retries: 0,
            ..BackoffConfig::default()
        }
    }

    fn worker_for(url: &str, timeout: Duration) -> RemoteWorker {
        let client = RpcClient::new(url, timeout)
            .unwrap()
            .with_backoff_config(no_retries());
        RemoteWorker::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_accepts_valid_remote_work() {
        let reply = json!({ "work": "2bf29ef00786a6bc" }).to_string();
        let (url, server) = serve(vec![(200, reply)]).await;
        let worker = worker_for(&url, Duration::from_secs(5));

        let outcome = worker
            .generate(
                WorkRoot::from_hex(ROOT).unwrap(),
                Difficulty::RECEIVE,
                Instant::now() + Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let result = outcome.found().unwrap();
        assert_eq!(result.nonce, WorkNonce::new(0x2bf2_9ef0_0786_a6bc));
        assert_eq!(result.value, 0xffff_ffd2_1c39_33f4);
        assert_eq!(worker.stats().solutions_found, 1);

        let requests = server.await.unwrap();
        assert_eq!(requests[0]["action"], "work_generate");
    }

    #[tokio::test]
    async fn test_rejects_insufficient_remote_work() {
        let reply = json!({ "work": "2bf29ef00786a6bc" }).to_string();
        let (url, _server) = serve(vec![(200, reply)]).await;
        let worker = worker_for(&url, Duration::from_secs(5));

        let result = worker
            .generate(
                WorkRoot::from_hex(ROOT).unwrap(),
                Difficulty::SEND,
                Instant::now() + Duration::from_secs(10),
                CancellationToken::new(),
            )
            .await;

        assert_matches!(result, Err(Error::Worker { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let (url, server) = serve(vec![(200, json!({ "success": "" }).to_string())]).await;
        let worker = worker_for(&url, Duration::from_secs(5));
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = worker
            .generate(
                WorkRoot::from_hex(ROOT).unwrap(),
                Difficulty::SEND,
                Instant::now() + Duration::from_secs(10),
                cancellation,
            )
            .await
            .unwrap();

        assert_eq!(outcome, SearchOutcome::Cancelled { attempts: 0 });
        let requests = server.await.unwrap();
        assert_eq!(requests[0]["action"], "work_cancel");
    }

    #[tokio::test]
    async fn test_times_out_on_silent_node() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let worker = worker_for(&url, Duration::from_millis(300));

        let outcome = worker
            .generate(
                WorkRoot::from_hex(ROOT).unwrap(),
                Difficulty::SEND,
                Instant::now() + Duration::from_millis(100),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_matches!(outcome, SearchOutcome::TimedOut { .. });
        drop(listener);
    }
}
