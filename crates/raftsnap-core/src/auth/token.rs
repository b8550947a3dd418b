use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AuthError, AuthProvider};
use crate::secret::Secret;

/// A token supplied up front (`VAULT_TOKEN`).
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: Secret,
}

impl StaticToken {
    pub fn new(token: Secret) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn acquire(&self, _cancel: &CancellationToken) -> Result<Secret, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NoToken);
        }
        Ok(self.token.clone())
    }
}
