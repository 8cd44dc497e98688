use std::sync::{Arc, RwLock};

use htb_core::{HtbError, Result};

use crate::credentials::CachedTokenRecord;

/// Trait for storing and retrieving cached API tokens
///
/// Methods are synchronous so that tokens can still be persisted from `Drop`.
pub trait TokenStore: Send + Sync {
    /// Load the cached tokens, or `None` if absent or unusable
    fn load(&self) -> Option<CachedTokenRecord>;

    /// Persist tokens, replacing whatever was stored before
    fn persist(&self, record: &CachedTokenRecord) -> Result<()>;

    /// Human readable description of where tokens are kept
    fn location(&self) -> String;
}

/// In-memory token store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    record: Arc<RwLock<Option<CachedTokenRecord>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a record
    pub fn with_record(record: CachedTokenRecord) -> Self {
        Self {
            record: Arc::new(RwLock::new(Some(record))),
        }
    }

    /// Raw stored record, without the usability check `load` applies
    pub fn snapshot(&self) -> Option<CachedTokenRecord> {
        self.record.read().ok()?.clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<CachedTokenRecord> {
        self.snapshot()
            .filter(|record| record.credentials().is_some())
    }

    fn persist(&self, record: &CachedTokenRecord) -> Result<()> {
        *self
            .record
            .write()
            .map_err(|_| HtbError::Cache("Lock poisoned".to_string()))? = Some(record.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
