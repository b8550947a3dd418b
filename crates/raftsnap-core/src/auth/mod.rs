//! Cluster token acquisition.

mod kubernetes;
mod token;

pub use kubernetes::{KubernetesLogin, LOGIN_TIMEOUT};
pub use token::StaticToken;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::http::TransportError;
use crate::raft::ClusterSettings;
use crate::secret::Secret;

pub const DEFAULT_K8S_MOUNT: &str = "kubernetes";
pub const DEFAULT_K8S_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// How the process obtains its cluster token. Built once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMethod {
    Token(Secret),
    Kubernetes {
        role: String,
        jwt_path: PathBuf,
        mount: String,
        audience: Option<String>,
    },
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Token(_) => "token",
            AuthMethod::Kubernetes { .. } => "kubernetes",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no vault token configured")]
    NoToken,
    #[error("read service account token {}: {source}", .path.display())]
    Jwt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("vault login failed with status {status}: {message}")]
    Login { status: u32, message: String },
    #[error("vault login request: {0}")]
    Transport(TransportError),
    #[error("decode vault login response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("vault login returned an empty client token")]
    EmptyToken,
    #[error("operation cancelled")]
    Cancelled,
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => AuthError::Cancelled,
            other => AuthError::Transport(other),
        }
    }
}

/// Source of a cluster token.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<Secret, AuthError>;
}

/// Provider for `method`, talking to the cluster at `address` when it needs to log in.
pub fn provider_for(method: &AuthMethod, address: &str, settings: &ClusterSettings) -> Box<dyn AuthProvider> {
    match method {
        AuthMethod::Token(token) => Box::new(StaticToken::new(token.clone())),
        AuthMethod::Kubernetes {
            role,
            jwt_path,
            mount,
            audience,
        } => Box::new(KubernetesLogin {
            address: address.to_string(),
            role: role.clone(),
            jwt_path: jwt_path.clone(),
            mount: mount.clone(),
            audience: audience.clone(),
            settings: settings.clone(),
        }),
    }
}
