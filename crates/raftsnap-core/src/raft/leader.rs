//! Leader discovery via `GET /v1/sys/leader`.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::ClusterSettings;
use crate::http::{self, HttpRequest, Method};

pub const PATH_LEADER: &str = "/v1/sys/leader";

/// Address the snapshot calls should target for this operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderInfo {
    pub leader_address: String,
}

/// Both response conventions: `{"leader_address": ..}` and
/// `{"data": {"leader_address": ..}}`.
#[derive(Debug, Deserialize)]
struct LeaderStatus {
    #[serde(default)]
    leader_address: Option<String>,
    #[serde(default)]
    data: Option<LeaderData>,
}

#[derive(Debug, Deserialize)]
struct LeaderData {
    #[serde(default)]
    leader_address: Option<String>,
}

/// Leader address from a leader-status body; the flat shape wins.
pub fn parse_leader_body(body: &[u8]) -> Option<String> {
    let status: LeaderStatus = serde_json::from_slice(body).ok()?;
    let non_empty = |s: Option<String>| s.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
    non_empty(status.leader_address).or_else(|| non_empty(status.data.and_then(|d| d.leader_address)))
}

/// Query the leader of the cluster at `address`. Any failure falls back to
/// `address` itself; discovery never fails the operation.
pub async fn discover_leader(
    cancel: &CancellationToken,
    address: &str,
    settings: &ClusterSettings,
) -> LeaderInfo {
    let url = format!("{}{}", address.trim_end_matches('/'), PATH_LEADER);
    let mut req = HttpRequest::new(Method::Get, &url)
        .timeout(settings.request_timeout)
        .tls(settings.tls.clone());
    if let Some(ns) = &settings.namespace {
        req = req.header("X-Vault-Namespace", ns.clone());
    }
    let found = match http::send(req, cancel).await {
        Ok(resp) if resp.status == 200 => parse_leader_body(&resp.body),
        Ok(resp) => {
            tracing::debug!(status = resp.status, "leader query returned non-200");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "leader query failed");
            None
        }
    };
    let leader_address = match found {
        Some(a) => a,
        None => {
            tracing::debug!(address, "no leader reported; using configured address");
            address.to_string()
        }
    };
    LeaderInfo { leader_address }
}
