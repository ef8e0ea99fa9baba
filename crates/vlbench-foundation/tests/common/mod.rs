//! Common test utilities shared across the `vlbench-foundation` integration tests.
//!
//! Declared with `mod common;` inside each test file that needs it.

#![allow(dead_code)]

pub mod mock_codegen;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use vlbench_foundation::config::RunConfig;
use vlbench_kernel::retry::Sleeper;

/// Smallest valid PNG header; enough for MIME detection and base64 encoding
pub const PNG_BYTES: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

/// Write a tiny PNG into `dir` and return its path
pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, PNG_BYTES).expect("write test image");
    path
}

/// Run config whose adapter and artifact directories live under `root`
pub fn config_in(root: &Path, identifier: &str) -> RunConfig {
    let mut config = RunConfig::for_model(identifier);
    config.paths.adapter_dir = root.join("generated_adapters");
    config.paths.artifact_dir = root.join("artifacts");
    config
}

/// Sleeper that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
    }
}

pub fn recording_sleeper() -> Arc<RecordingSleeper> {
    Arc::new(RecordingSleeper::default())
}
