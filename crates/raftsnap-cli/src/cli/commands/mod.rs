//! CLI command handlers. Each command is in its own file.

mod backup;
mod checksum;
mod restore;

pub use backup::run_backup;
pub use checksum::run_checksum;
pub use restore::run_restore;

use anyhow::Result;
use raftsnap_core::auth::{self, AuthProvider};
use raftsnap_core::config::Config;
use raftsnap_core::provider::{ProviderRegistry, StorageProvider};
use raftsnap_core::raft::{self, RaftClient};
use raftsnap_core::transfer::Transfer;

/// Collaborators resolved from a validated config.
struct Session {
    address: String,
    auth: Box<dyn AuthProvider>,
    raft: RaftClient,
    provider: Box<dyn StorageProvider>,
}

impl Session {
    fn from_config(cfg: &Config) -> Result<Self> {
        let method = cfg.auth_method()?;
        let provider_cfg = cfg.provider_config()?;
        let retry = cfg.retry_policy();
        let settings = cfg.cluster_settings();
        let address = raft::cluster_address(&cfg.vault.address);

        let registry = ProviderRegistry::with_builtin();
        let provider = registry.create(&cfg.provider.trim().to_ascii_lowercase(), &provider_cfg, &retry)?;
        let auth = auth::provider_for(&method, &address, &settings);
        tracing::debug!(
            address = %address,
            auth = method.name(),
            provider = provider.name(),
            max_attempts = retry.max_attempts,
            "session ready"
        );
        Ok(Self {
            address,
            auth,
            raft: RaftClient::new(retry, settings),
            provider,
        })
    }

    fn transfer(&self) -> Transfer<'_> {
        Transfer {
            cluster_address: &self.address,
            auth: self.auth.as_ref(),
            raft: &self.raft,
            provider: self.provider.as_ref(),
        }
    }
}
