//! Raft snapshot client.
//!
//! Save streams `GET /v1/sys/storage/raft/snapshot` into a local file (via
//! `.part` + rename); restore posts a local file to the snapshot or
//! snapshot-force endpoint. Both rediscover the leader per call, follow
//! 307/308 redirects on the next attempt, honor `Retry-After`, and run under
//! the retry engine inside a [`DeadlineScope`].

mod attempt;
mod error;
mod leader;

pub use attempt::{resolve_redirect, AttemptOutcome};
pub use error::ClusterError;
pub use leader::{discover_leader, parse_leader_body, LeaderInfo, PATH_LEADER};

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::control::DeadlineScope;
use crate::http::{self, HttpRequest, Method, RequestBody, ResponseSink, TlsSettings};
use crate::retry::{self, RetryPolicy};
use crate::secret::Secret;
use crate::storage;

/// Used when no cluster address is configured.
pub const DEFAULT_CLUSTER_ADDR: &str = "http://127.0.0.1:8200";
pub const PATH_SNAPSHOT: &str = "/v1/sys/storage/raft/snapshot";
pub const PATH_SNAPSHOT_FORCE: &str = "/v1/sys/storage/raft/snapshot-force";
/// Ceiling for one whole save or restore, retries included.
pub const OPERATION_DEADLINE: Duration = Duration::from_secs(10 * 60);
/// Ceiling for a single HTTP round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Connection settings shared by every cluster call.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Sent as `X-Vault-Namespace` when set.
    pub namespace: Option<String>,
    pub tls: TlsSettings,
    pub operation_deadline: Duration,
    pub request_timeout: Duration,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            tls: TlsSettings::default(),
            operation_deadline: OPERATION_DEADLINE,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// One snapshot transfer. `token` is redacted in `Debug`.
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub cluster_address: String,
    pub token: Secret,
    pub local_path: PathBuf,
    /// Restore only: use the snapshot-force endpoint.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Download,
    Upload,
}

/// Configured address, or [`DEFAULT_CLUSTER_ADDR`] when blank.
pub fn cluster_address(configured: &str) -> String {
    let addr = configured.trim();
    if addr.is_empty() {
        DEFAULT_CLUSTER_ADDR.to_string()
    } else {
        addr.to_string()
    }
}

pub struct RaftClient {
    retry: RetryPolicy,
    settings: ClusterSettings,
}

impl RaftClient {
    pub fn new(retry: RetryPolicy, settings: ClusterSettings) -> Self {
        Self { retry, settings }
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Download a snapshot to `req.local_path`, creating its parent directory.
    pub async fn save(&self, cancel: &CancellationToken, req: &SnapshotRequest) -> Result<(), ClusterError> {
        storage::ensure_parent_dir(&req.local_path).map_err(|source| ClusterError::Io {
            context: format!("create parent directory of {}", req.local_path.display()),
            source,
        })?;
        self.transfer("save", Direction::Download, PATH_SNAPSHOT, cancel, req)
            .await
    }

    /// Upload `req.local_path` to the cluster; 200 and 204 both succeed.
    pub async fn restore(&self, cancel: &CancellationToken, req: &SnapshotRequest) -> Result<(), ClusterError> {
        std::fs::metadata(&req.local_path).map_err(|source| ClusterError::Io {
            context: format!("stat {}", req.local_path.display()),
            source,
        })?;
        let path = if req.force {
            PATH_SNAPSHOT_FORCE
        } else {
            PATH_SNAPSHOT
        };
        self.transfer("restore", Direction::Upload, path, cancel, req)
            .await
    }

    async fn transfer(
        &self,
        action: &'static str,
        direction: Direction,
        path: &str,
        cancel: &CancellationToken,
        req: &SnapshotRequest,
    ) -> Result<(), ClusterError> {
        let started = Instant::now();
        let scope = DeadlineScope::new(cancel, self.settings.operation_deadline);
        let token = scope.token();
        let address = cluster_address(&req.cluster_address);
        let leader = discover_leader(token, &address, &self.settings).await;
        let target = Mutex::new(format!(
            "{}{}",
            leader.leader_address.trim_end_matches('/'),
            path
        ));
        tracing::info!(
            action,
            leader = %leader.leader_address,
            local = %req.local_path.display(),
            force = req.force,
            "snapshot transfer starting"
        );

        let result = retry::execute(token, &self.retry, ClusterError::is_retryable, |n| {
            let target = &target;
            async move {
                let url = target.lock().await.clone();
                let outcome = self.attempt(token, &url, direction, req).await;
                settle(token, target, outcome, action, n).await
            }
        })
        .await;

        let result = match result {
            Err(ClusterError::Cancelled) if scope.expired() => {
                Err(ClusterError::DeadlineExceeded(scope.budget()))
            }
            other => other,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(action, elapsed_ms, "snapshot transfer complete"),
            Err(e) => tracing::error!(action, elapsed_ms, error = %e, "snapshot transfer failed"),
        }
        result
    }

    async fn attempt(
        &self,
        cancel: &CancellationToken,
        url: &str,
        direction: Direction,
        req: &SnapshotRequest,
    ) -> AttemptOutcome {
        let method = match direction {
            Direction::Download => Method::Get,
            Direction::Upload => Method::Post,
        };
        let mut http_req = HttpRequest::new(method, url)
            .timeout(self.settings.request_timeout)
            .tls(self.settings.tls.clone());
        if !req.token.is_empty() {
            http_req = http_req.header("X-Vault-Token", req.token.expose());
        }
        if let Some(ns) = &self.settings.namespace {
            http_req = http_req.header("X-Vault-Namespace", ns.clone());
        }
        let ok: &[u32] = match direction {
            Direction::Download => {
                http_req = http_req.sink(ResponseSink::File(req.local_path.clone()));
                &[200]
            }
            Direction::Upload => {
                http_req = http_req
                    .header("Content-Type", "application/octet-stream")
                    .body(RequestBody::File(req.local_path.clone()));
                &[200, 204]
            }
        };
        match http::send(http_req, cancel).await {
            Ok(resp) => {
                if let Some(bytes) = resp.file_bytes {
                    tracing::debug!(bytes, local = %req.local_path.display(), "snapshot written");
                }
                AttemptOutcome::from_response(url, &resp, ok)
            }
            Err(e) => AttemptOutcome::from_transport(e),
        }
    }
}

/// Turn an attempt outcome into the retry loop's result, applying side
/// effects first: a redirect retargets the next attempt, and a retryable
/// failure with `Retry-After` waits before the engine's own backoff.
async fn settle(
    cancel: &CancellationToken,
    target: &Mutex<String>,
    outcome: AttemptOutcome,
    action: &'static str,
    attempt: u32,
) -> Result<(), ClusterError> {
    match outcome {
        AttemptOutcome::Success => Ok(()),
        AttemptOutcome::Redirect { status, location } => {
            tracing::info!(action, attempt, status, location = %location, "following leader redirect");
            *target.lock().await = location.clone();
            Err(ClusterError::Redirect { status, location })
        }
        AttemptOutcome::RetryableFailure { error, retry_after } => {
            tracing::warn!(action, attempt, error = %error, "attempt failed");
            if let Some(wait) = retry_after.filter(|d| !d.is_zero()) {
                tracing::debug!(action, attempt, wait_ms = wait.as_millis() as u64, "honoring Retry-After");
                retry::sleep_or_cancel(cancel, wait).await?;
            }
            Err(error)
        }
        AttemptOutcome::FatalFailure(error) => Err(error),
    }
}
