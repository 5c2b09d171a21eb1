//! Common utilities for integration tests

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use axum::Router;

use align_core::AlignmentLogger;
use highlight_core::HighlightEngine;
use server::config::ServerConfig;
use server::routes::{app, AppState};

/// Fresh state with its own engine and a throwaway alignment directory.
pub fn test_state() -> AppState {
    let base = std::env::temp_dir().join(format!(
        "highlight-server-test-{}",
        uuid::Uuid::new_v4()
    ));
    let alignments = Arc::new(AlignmentLogger::new(&base).expect("create alignment dirs"));

    AppState {
        engine: HighlightEngine::spawn(),
        alignments,
        session_id: Arc::new(Mutex::new(None)),
        request_count: Arc::new(AtomicU64::new(0)),
        config: ServerConfig::default(),
    }
}

/// Create a test app instance
pub fn create_test_app() -> Router {
    app(test_state())
}
