//! Contact repository: the slow loader behind a shared memo store

use std::sync::Arc;
use std::time::Instant;

use contactdb::{CancelToken, Contact, LoaderConfig, Result, SlowLoader};
use tracing::{debug, warn};

use crate::memo::{MemoConfig, MemoStore};
use crate::stats::CacheStats;

/// Repository configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Loader settings
    pub loader: LoaderConfig,

    /// Memo store settings
    pub memo: MemoConfig,
}

/// Cached contact lookups
pub struct ContactRepository {
    /// Slow backend
    loader: SlowLoader,

    /// Memoized contacts, possibly shared with other repositories
    store: Arc<MemoStore<i64, Contact>>,
}

impl ContactRepository {
    /// Create a repository with a fresh store
    ///
    /// # Arguments
    /// * `config` - Loader and store settings
    ///
    /// # Returns
    /// * `Result<ContactRepository>` - Error if the store config is rejected
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        let store = MemoStore::with_config(config.memo)?;
        Ok(Self::with_store(
            SlowLoader::new(config.loader),
            Arc::new(store),
        ))
    }

    /// Create a repository over an existing store
    pub fn with_store(loader: SlowLoader, store: Arc<MemoStore<i64, Contact>>) -> Self {
        Self { loader, store }
    }

    /// Look up a contact, loading it on the first request for `id`
    ///
    /// # Arguments
    /// * `id` - Contact identifier
    ///
    /// # Returns
    /// * `Result<Contact>` - The contact, or the loader's error on a failed miss
    pub fn get_by_id(&self, id: i64) -> Result<Contact> {
        let mut loaded = false;

        let contact = self.store.get_or_compute(id, |&id| {
            loaded = true;
            debug!(id, delay = ?self.loader.delay(), "contact cache miss, loading");

            let start = Instant::now();
            match self.loader.load(id) {
                Ok(contact) => {
                    debug!(id, elapsed = ?start.elapsed(), "contact loaded");
                    Ok(contact)
                }
                Err(e) => {
                    warn!(id, error = %e, "contact load failed");
                    Err(e)
                }
            }
        })?;

        if !loaded {
            debug!(id, "contact cache hit");
        }

        Ok(contact)
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        self.store.stats()
    }

    /// Number of cached contacts
    pub fn cached_len(&self) -> usize {
        self.store.len()
    }

    /// Shared handle to the underlying store
    pub fn store(&self) -> &Arc<MemoStore<i64, Contact>> {
        &self.store
    }

    /// Token that interrupts this repository's loads
    pub fn cancel_token(&self) -> &CancelToken {
        self.loader.cancel_token()
    }
}
