//! Kubernetes service-account login: trade the pod's JWT for a cluster token.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{AuthError, AuthProvider};
use crate::http::{self, HttpRequest, Method, RequestBody};
use crate::raft::ClusterSettings;
use crate::secret::Secret;

pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct KubernetesLogin {
    pub address: String,
    pub role: String,
    pub jwt_path: PathBuf,
    pub mount: String,
    pub audience: Option<String>,
    pub settings: ClusterSettings,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    #[serde(default)]
    client_token: String,
}

impl KubernetesLogin {
    fn login_url(&self) -> String {
        format!(
            "{}/v1/auth/{}/login",
            self.address.trim_end_matches('/'),
            self.mount.trim_matches('/')
        )
    }

    fn login_body(&self, jwt: &str) -> Vec<u8> {
        let mut body = serde_json::json!({ "role": self.role, "jwt": jwt });
        if let Some(aud) = self.audience.as_deref().filter(|a| !a.is_empty()) {
            body["audience"] = serde_json::Value::from(aud);
        }
        body.to_string().into_bytes()
    }
}

/// Client token from a login response body.
fn parse_login(body: &[u8]) -> Result<Secret, AuthError> {
    let resp: LoginResponse = serde_json::from_slice(body)?;
    let token = Secret::new(resp.auth.map(|a| a.client_token).unwrap_or_default());
    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    Ok(token)
}

#[async_trait]
impl AuthProvider for KubernetesLogin {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<Secret, AuthError> {
        let jwt = tokio::fs::read_to_string(&self.jwt_path)
            .await
            .map_err(|source| AuthError::Jwt {
                path: self.jwt_path.clone(),
                source,
            })?;
        let mut req = HttpRequest::new(Method::Post, self.login_url())
            .header("Content-Type", "application/json")
            .body(RequestBody::Bytes(self.login_body(jwt.trim())))
            .timeout(LOGIN_TIMEOUT)
            .tls(self.settings.tls.clone());
        if let Some(ns) = &self.settings.namespace {
            req = req.header("X-Vault-Namespace", ns.clone());
        }
        let resp = http::send(req, cancel).await?;
        if resp.status != 200 {
            return Err(AuthError::Login {
                status: resp.status,
                message: resp.body_snippet(),
            });
        }
        let token = parse_login(&resp.body)?;
        tracing::info!(role = %self.role, mount = %self.mount, "vault kubernetes login succeeded");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(audience: Option<&str>) -> KubernetesLogin {
        KubernetesLogin {
            address: "https://vault:8200/".into(),
            role: "snapshotter".into(),
            jwt_path: PathBuf::from("/tmp/jwt"),
            mount: "/k8s-prod/".into(),
            audience: audience.map(String::from),
            settings: ClusterSettings::default(),
        }
    }

    #[test]
    fn login_url_normalizes_slashes() {
        assert_eq!(login(None).login_url(), "https://vault:8200/v1/auth/k8s-prod/login");
    }

    #[test]
    fn login_body_includes_audience_only_when_set() {
        let v: serde_json::Value = serde_json::from_slice(&login(None).login_body("jwt-1")).unwrap();
        assert_eq!(v["role"], "snapshotter");
        assert_eq!(v["jwt"], "jwt-1");
        assert!(v.get("audience").is_none());
        let v: serde_json::Value = serde_json::from_slice(&login(Some("vault")).login_body("jwt-1")).unwrap();
        assert_eq!(v["audience"], "vault");
    }

    #[test]
    fn parse_login_extracts_client_token() {
        let token = parse_login(br#"{"auth":{"client_token":"hvs.xyz","policies":["backup"]}}"#).unwrap();
        assert_eq!(token.expose(), "hvs.xyz");
    }

    #[test]
    fn parse_login_rejects_missing_token() {
        assert!(matches!(parse_login(br#"{"auth":null}"#), Err(AuthError::EmptyToken)));
        assert!(matches!(parse_login(br#"{"auth":{"client_token":""}}"#), Err(AuthError::EmptyToken)));
        assert!(matches!(parse_login(b"not json"), Err(AuthError::Decode(_))));
    }
}
