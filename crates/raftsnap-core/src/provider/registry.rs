use std::collections::BTreeMap;

use super::{azure, ProviderConfig, StorageProvider};
use crate::retry::RetryPolicy;

/// Builds a provider from its configuration and the process retry policy.
pub type ProviderFactory =
    Box<dyn Fn(&ProviderConfig, &RetryPolicy) -> anyhow::Result<Box<dyn StorageProvider>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("provider name is empty")]
    EmptyName,
    #[error("provider not found: {0}")]
    NotFound(String),
    #[error("provider already registered: {0}")]
    Duplicate(String),
    #[error("create provider {name}: {source:#}")]
    Build {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Name → factory table, filled once at startup and read-only afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every backend compiled into this crate.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.factories
            .insert(azure::PROVIDER_NAME.to_string(), Box::new(azure::factory));
        reg
    }

    pub fn register(&mut self, name: &str, factory: ProviderFactory) -> Result<(), RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the provider registered as `name`. Unknown names build nothing.
    pub fn create(
        &self,
        name: &str,
        config: &ProviderConfig,
        retry: &RetryPolicy,
    ) -> Result<Box<dyn StorageProvider>, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let provider = factory(config, retry).map_err(|source| RegistryError::Build {
            name: name.to_string(),
            source,
        })?;
        tracing::debug!(provider = name, "storage provider created");
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct Noop;

    #[async_trait]
    impl StorageProvider for Noop {
        async fn backup(&self, _: &CancellationToken, _: &Path, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn restore(&self, _: &CancellationToken, _: &str, _: &Path) -> anyhow::Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "noop"
        }
    }

    fn azure_config() -> ProviderConfig {
        ProviderConfig::Azure(azure::AzureConfig {
            account: "acct".into(),
            container: "snaps".into(),
            ..Default::default()
        })
    }

    #[test]
    fn unknown_provider_builds_nothing() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut reg = ProviderRegistry::new();
        let counter = Arc::clone(&built);
        reg.register(
            "noop",
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Noop) as Box<dyn StorageProvider>)
            }),
        )
        .unwrap();
        let err = reg
            .create("s3", &azure_config(), &RetryPolicy::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "provider not found: s3");
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let p = reg.create("noop", &azure_config(), &RetryPolicy::default()).unwrap();
        assert_eq!(p.name(), "noop");
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_and_duplicate_names_are_rejected() {
        let mut reg = ProviderRegistry::new();
        let noop = || -> ProviderFactory { Box::new(|_, _| Ok(Box::new(Noop) as Box<dyn StorageProvider>)) };
        assert!(matches!(reg.register("  ", noop()), Err(RegistryError::EmptyName)));
        reg.register("noop", noop()).unwrap();
        assert!(matches!(reg.register("noop", noop()), Err(RegistryError::Duplicate(_))));
        assert!(matches!(
            reg.create("", &azure_config(), &RetryPolicy::default()),
            Err(RegistryError::EmptyName)
        ));
    }

    #[test]
    fn builtin_registry_has_azure() {
        let reg = ProviderRegistry::with_builtin();
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["azure"]);
        let p = reg.create("azure", &azure_config(), &RetryPolicy::default()).unwrap();
        assert_eq!(p.name(), "azure");
    }
}
