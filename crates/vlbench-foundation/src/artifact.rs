//! Versioned record of approved adapter units
//!
//! Layout of [`LocalArtifactStore`]:
//!
//! ```text
//! <root>/<unit>/v1/<unit>.rhai
//! <root>/<unit>/v1/manifest.json
//! <root>/<unit>/v2/...
//! ```

use crate::synthesis::SynthesisArtifact;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;
use vlbench_kernel::{DispatchError, ModelIdentifier};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest of one recorded version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub identifier: ModelIdentifier,
    pub unit: String,
    pub class_name: String,
    pub version: u32,
    /// Hex SHA-256 of the source
    pub sha256: String,
    pub recorded_at: DateTime<Utc>,
}

/// Keeps every approved source, one version per approval
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn record(&self, artifact: &SynthesisArtifact) -> Result<ArtifactRecord, DispatchError>;

    /// Recorded versions of `unit`, oldest first
    async fn versions(&self, unit: &str) -> Result<Vec<ArtifactRecord>, DispatchError>;
}

/// Artifact store on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

fn store_error(path: &Path, err: impl std::fmt::Display) -> DispatchError {
    DispatchError::ArtifactStore(format!("{}: {}", path.display(), err))
}

/// `v<N>` directory names under a unit directory
fn parse_version(name: &str) -> Option<u32> {
    name.strip_prefix('v')?.parse().ok()
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn existing_versions(&self, unit_dir: &Path) -> Result<Vec<u32>, DispatchError> {
        let mut versions = Vec::new();
        let mut entries = match tokio::fs::read_dir(unit_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(store_error(unit_dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error(unit_dir, e))?
        {
            if let Some(version) = entry.file_name().to_str().and_then(parse_version) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn record(&self, artifact: &SynthesisArtifact) -> Result<ArtifactRecord, DispatchError> {
        let unit_dir = self.root.join(&artifact.unit);
        let version = self
            .existing_versions(&unit_dir)
            .await?
            .last()
            .map_or(1, |v| v + 1);

        let version_dir = unit_dir.join(format!("v{}", version));
        tokio::fs::create_dir_all(&version_dir)
            .await
            .map_err(|e| store_error(&version_dir, e))?;

        let source_path = version_dir.join(format!("{}.rhai", artifact.unit));
        tokio::fs::write(&source_path, &artifact.source)
            .await
            .map_err(|e| store_error(&source_path, e))?;

        let record = ArtifactRecord {
            identifier: artifact.identifier.clone(),
            unit: artifact.unit.clone(),
            class_name: artifact.class_name.clone(),
            version,
            sha256: hex::encode(Sha256::digest(artifact.source.as_bytes())),
            recorded_at: Utc::now(),
        };
        let manifest_path = version_dir.join(MANIFEST_FILE);
        let manifest =
            serde_json::to_vec_pretty(&record).map_err(|e| store_error(&manifest_path, e))?;
        tokio::fs::write(&manifest_path, manifest)
            .await
            .map_err(|e| store_error(&manifest_path, e))?;

        info!(unit = %record.unit, version, sha256 = %record.sha256, "adapter artifact recorded");
        Ok(record)
    }

    async fn versions(&self, unit: &str) -> Result<Vec<ArtifactRecord>, DispatchError> {
        let unit_dir = self.root.join(unit);
        let mut records = Vec::new();
        for version in self.existing_versions(&unit_dir).await? {
            let manifest_path = unit_dir.join(format!("v{}", version)).join(MANIFEST_FILE);
            let content = tokio::fs::read(&manifest_path)
                .await
                .map_err(|e| store_error(&manifest_path, e))?;
            let record: ArtifactRecord =
                serde_json::from_slice(&content).map_err(|e| store_error(&manifest_path, e))?;
            records.push(record);
        }
        Ok(records)
    }
}
