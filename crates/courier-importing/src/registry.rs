//! Import-type registry.
//!
//! Same shape as the outbox registry, keyed by `import_type`. The handler
//! owns config parsing and validation for its type, plus the stage and
//! process phases. Seeded by the composition root at startup.

use async_trait::async_trait;
use courier_redis::StagingStore;
use courier_store::UnitOfWork;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::tabular::TabularDocument;
use crate::{ImportConfig, ProcessStats, StageStats};

#[async_trait]
pub trait ImportHandler: Send + Sync {
    fn import_type(&self) -> &'static str;

    /// Parse and validate the raw config object for this import type.
    fn parse_config(&self, raw: &Value) -> courier_common::Result<ImportConfig>;

    /// Business rules over an already well-formed config (key domains).
    fn validate_config(&self, config: &ImportConfig) -> courier_common::Result<()>;

    /// Normalize rows into the staging queue. Row errors are collected, not
    /// raised, unless `stop_on_row_error` is set.
    async fn stage(
        &self,
        job_key: &str,
        doc: TabularDocument,
        config: &ImportConfig,
        context: &Value,
        staging: &dyn StagingStore,
        ttl_seconds: u64,
    ) -> courier_common::Result<StageStats>;

    /// Drain staged rows into domain entities in batches.
    async fn process(
        &self,
        uow: &mut UnitOfWork,
        job_key: &str,
        context: &Value,
        staging: &dyn StagingStore,
        batch_size: u32,
        ttl_seconds: u64,
    ) -> courier_common::Result<ProcessStats>;
}

#[derive(Default)]
pub struct ImportRegistry {
    handlers: HashMap<&'static str, Arc<dyn ImportHandler>>,
}

impl ImportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ImportHandler>) {
        self.handlers.insert(handler.import_type(), handler);
    }

    pub fn get(&self, import_type: &str) -> Option<Arc<dyn ImportHandler>> {
        self.handlers.get(import_type).cloned()
    }

    pub fn is_registered(&self, import_type: &str) -> bool {
        self.handlers.contains_key(import_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyHandler;

    #[async_trait]
    impl ImportHandler for DummyHandler {
        fn import_type(&self) -> &'static str {
            "dummy"
        }

        fn parse_config(&self, raw: &Value) -> courier_common::Result<ImportConfig> {
            ImportConfig::from_value(raw)
        }

        fn validate_config(&self, _config: &ImportConfig) -> courier_common::Result<()> {
            Ok(())
        }

        async fn stage(
            &self,
            _job_key: &str,
            _doc: TabularDocument,
            _config: &ImportConfig,
            _context: &Value,
            _staging: &dyn StagingStore,
            _ttl_seconds: u64,
        ) -> courier_common::Result<StageStats> {
            Ok(StageStats::default())
        }

        async fn process(
            &self,
            _uow: &mut UnitOfWork,
            _job_key: &str,
            _context: &Value,
            _staging: &dyn StagingStore,
            _batch_size: u32,
            _ttl_seconds: u64,
        ) -> courier_common::Result<ProcessStats> {
            Ok(ProcessStats::default())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ImportRegistry::new();
        assert!(!registry.is_registered("dummy"));
        registry.register(Arc::new(DummyHandler));
        assert!(registry.is_registered("dummy"));
        assert!(registry.get("dummy").is_some());
        assert!(registry.get("message_request").is_none());
    }
}
