//! Common test setup functions.

use api::{router, state::AppState};
use axum::Router;
use axum_test::TestServer;
use chunk_store::ArchivalLog;
use std::path::Path;
use std::sync::Arc;
use worker::LifecycleEngine;

use crate::mocks::FlakyArchiveStorage;

/// Engine, router and archive storage wired the way the binary wires them.
pub struct TestContext {
    pub engine: Arc<LifecycleEngine>,
    pub storage: FlakyArchiveStorage,
    pub router: Router,
}

impl TestContext {
    /// In-memory archival log.
    pub fn new() -> Self {
        Self::build(Arc::new(ArchivalLog::in_memory()))
    }

    /// Archival log persisted under `dir`.
    pub async fn with_log_dir(dir: &Path) -> Self {
        let log = ArchivalLog::open(dir.join("archival.jsonl"))
            .await
            .expect("Failed to open archival log");
        Self::build(Arc::new(log))
    }

    fn build(log: Arc<ArchivalLog>) -> Self {
        let storage = FlakyArchiveStorage::new();
        let engine = Arc::new(
            LifecycleEngine::builder()
                .archival_log(log)
                .storage(Arc::new(storage.clone()))
                .build(),
        );
        let router = router(AppState::new(engine.clone()));

        Self {
            engine,
            storage,
            router,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
