pub mod error;
pub mod flows;
pub mod metrics;
pub mod record;
pub mod staging;
pub mod transform;

use anyhow::Result;
use std::sync::Arc;

use crate::capability::ImageCapability;
use crate::capability::python::PythonCapability;
use crate::config::AppConfig;
use crate::database::ops::records::RecordStore;
use crate::pipeline::staging::{StagedFile, StagingArea};

/// Shared service state. One instance is managed by the server and drives
/// every request.
pub struct Pipeline {
    capability: Arc<dyn ImageCapability>,
    staging: StagingArea,
    store: RecordStore,
}

impl Pipeline {
    pub fn new(
        capability: Arc<dyn ImageCapability>,
        staging: StagingArea,
        store: RecordStore,
    ) -> Self {
        Self {
            capability,
            staging,
            store,
        }
    }

    pub fn production(config: &AppConfig) -> Result<Self> {
        let capability = Arc::new(PythonCapability::new(
            config.python_bin.clone(),
            config.scripts_dir.clone(),
        ));
        let staging = StagingArea::new(&config.staging_root)?;
        let store = RecordStore::open(&config.db_path)?;
        Ok(Self::new(capability, staging, store))
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}

/// An upload that has landed in the staging area, with the client metadata
/// that should survive into the record.
#[derive(Debug)]
pub struct UploadedArtifact {
    pub staged: StagedFile,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}
