//! Credential selection and bearer-token acquisition for the blob service.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::BlobError;
use super::AzureConfig;
use crate::http::{self, HttpRequest, Method, RequestBody};
use crate::secret::Secret;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const IMDS_API_VERSION: &str = "2018-02-01";
const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);
/// Refresh a cached token this long before it expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// How requests to the blob service are authorized.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    /// Shared access signature appended to every URL (stored without `?`).
    Sas(Secret),
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: Secret,
        authority_host: String,
    },
    /// Federated token file exchanged as a client assertion. The file is
    /// re-read on every refresh because the kubelet rotates it.
    WorkloadIdentity {
        tenant_id: String,
        client_id: String,
        token_file: PathBuf,
        authority_host: String,
    },
    /// Instance metadata endpoint; `client_id` selects a user-assigned identity.
    ManagedIdentity {
        client_id: Option<String>,
        endpoint: String,
    },
}

/// How an upload is checked after it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// HEAD the blob: size and `sha256` metadata.
    Head,
    /// List by exact name: size only.
    List,
}

impl Credential {
    /// SAS first, then a complete service principal, then workload identity,
    /// then managed identity.
    pub fn select(cfg: &AzureConfig) -> Credential {
        let sas = cfg.sas_token.expose().trim().trim_start_matches('?');
        if !sas.is_empty() {
            return Credential::Sas(Secret::new(sas));
        }
        let client_id = cfg.client_id.trim();
        let tenant_id = cfg.tenant_id.trim();
        let authority_host = || {
            non_empty(cfg.authority_host.as_deref())
                .unwrap_or(DEFAULT_AUTHORITY_HOST)
                .trim_end_matches('/')
                .to_string()
        };
        if !client_id.is_empty() && !tenant_id.is_empty() {
            if !cfg.client_secret.is_empty() {
                return Credential::ServicePrincipal {
                    tenant_id: tenant_id.to_string(),
                    client_id: client_id.to_string(),
                    client_secret: cfg.client_secret.clone(),
                    authority_host: authority_host(),
                };
            }
            if let Some(file) = cfg.federated_token_file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
                return Credential::WorkloadIdentity {
                    tenant_id: tenant_id.to_string(),
                    client_id: client_id.to_string(),
                    token_file: file.clone(),
                    authority_host: authority_host(),
                };
            }
        }
        Credential::ManagedIdentity {
            client_id: non_empty(Some(client_id)).map(str::to_string),
            endpoint: non_empty(cfg.imds_endpoint.as_deref())
                .unwrap_or(DEFAULT_IMDS_ENDPOINT)
                .to_string(),
        }
    }

    pub fn validation(&self) -> Validation {
        match self {
            Credential::Sas(_) => Validation::Head,
            _ => Validation::List,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Sas(_) => "sas",
            Credential::ServicePrincipal { .. } => "service_principal",
            Credential::WorkloadIdentity { .. } => "workload_identity",
            Credential::ManagedIdentity { .. } => "managed_identity",
        }
    }

    /// Token endpoint request, or `None` when no bearer token is used.
    fn token_request(&self) -> Result<Option<HttpRequest>, BlobError> {
        let req = match self {
            Credential::Sas(_) => return Ok(None),
            Credential::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
                authority_host,
            } => client_credentials(authority_host, tenant_id, client_id, &[("client_secret", client_secret.expose())]),
            Credential::WorkloadIdentity {
                tenant_id,
                client_id,
                token_file,
                authority_host,
            } => {
                let assertion = read_assertion(token_file)?;
                client_credentials(
                    authority_host,
                    tenant_id,
                    client_id,
                    &[
                        ("client_assertion_type", JWT_BEARER_ASSERTION),
                        ("client_assertion", assertion.expose()),
                    ],
                )
            }
            Credential::ManagedIdentity { client_id, endpoint } => {
                let mut query = url::form_urlencoded::Serializer::new(String::new());
                query
                    .append_pair("api-version", IMDS_API_VERSION)
                    .append_pair("resource", STORAGE_RESOURCE);
                if let Some(id) = client_id {
                    query.append_pair("client_id", id);
                }
                HttpRequest::new(Method::Get, format!("{}?{}", endpoint, query.finish()))
                    .header("Metadata", "true")
            }
        };
        Ok(Some(req.timeout(TOKEN_TIMEOUT)))
    }
}

/// Form-encoded `client_credentials` grant against `{authority}/{tenant}/oauth2/v2.0/token`.
fn client_credentials(authority_host: &str, tenant_id: &str, client_id: &str, proof: &[(&str, &str)]) -> HttpRequest {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("grant_type", "client_credentials")
        .append_pair("client_id", client_id);
    for (k, v) in proof {
        form.append_pair(k, v);
    }
    form.append_pair("scope", STORAGE_SCOPE);
    HttpRequest::new(
        Method::Post,
        format!("{}/{}/oauth2/v2.0/token", authority_host, tenant_id),
    )
    .header("Content-Type", "application/x-www-form-urlencoded")
    .body(RequestBody::Bytes(form.finish().into_bytes()))
}

fn read_assertion(path: &Path) -> Result<Secret, BlobError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| BlobError::Credential(format!("read federated token {}: {}", path.display(), e)))?;
    let assertion = Secret::new(raw.trim());
    if assertion.is_empty() {
        return Err(BlobError::Credential(format!(
            "federated token file {} is empty",
            path.display()
        )));
    }
    Ok(assertion)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds; the identity endpoint sends it as a string.
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

fn parse_token(body: &[u8]) -> Result<(Secret, Duration), BlobError> {
    let resp: TokenResponse = serde_json::from_slice(body).map_err(|e| BlobError::Decode {
        what: "token response",
        message: e.to_string(),
    })?;
    let token = Secret::new(resp.access_token);
    if token.is_empty() {
        return Err(BlobError::Credential("empty access_token".into()));
    }
    let secs = match resp.expires_in {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(3600);
    Ok((token, Duration::from_secs(secs)))
}

struct CachedToken {
    token: Secret,
    refresh_at: Instant,
}

/// Bearer token source with a cache refreshed ahead of expiry.
pub struct TokenSource {
    credential: Credential,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            cached: Mutex::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Current bearer token, or `None` for SAS (the URL carries the grant).
    pub async fn bearer(&self, cancel: &CancellationToken) -> Result<Option<Secret>, BlobError> {
        if matches!(self.credential, Credential::Sas(_)) {
            return Ok(None);
        }
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.refresh_at {
                return Ok(Some(c.token.clone()));
            }
        }
        let Some(req) = self.credential.token_request()? else {
            return Ok(None);
        };
        let resp = http::send(req, cancel).await?;
        if resp.status != 200 {
            return Err(BlobError::TokenEndpoint {
                credential: self.credential.kind(),
                status: resp.status,
                message: resp.body_snippet(),
            });
        }
        let (token, lifetime) = parse_token(&resp.body)?;
        tracing::debug!(
            credential = self.credential.kind(),
            expires_in_s = lifetime.as_secs(),
            "storage token acquired"
        );
        *cached = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });
        Ok(Some(token))
    }
}
