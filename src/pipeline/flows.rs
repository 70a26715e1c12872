use anyhow::{Context, anyhow};
use log::{info, warn};
use std::time::Instant;
use tokio::task::spawn_blocking;

use crate::capability::{CapabilityCall, MapVariant, MetricsCategory};
use crate::database::schema::record::{OperationRecord, OperationType};
use crate::pipeline::error::PipelineError;
use crate::pipeline::metrics::{self, Metrics, MetricsOutcome};
use crate::pipeline::record::{self, RecordDraft};
use crate::pipeline::staging::StagedFile;
use crate::pipeline::transform::{self, validate_decrypt_key, validate_encrypt_key};
use crate::pipeline::{Pipeline, UploadedArtifact};

/// Outcome of a persisting run.
#[derive(Debug)]
pub struct CompletedOperation {
    pub record: OperationRecord,
}

/// Outcome of a transient recovery run. Nothing stays on disk.
#[derive(Debug)]
pub struct RecoveredArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Pipeline {
    /// Encrypt an uploaded image and persist the run.
    pub async fn encrypt(
        &self,
        image: UploadedArtifact,
        key: &str,
        map: MapVariant,
    ) -> Result<CompletedOperation, PipelineError> {
        // Step 1: Reject bad input before anything touches the capability.
        validate_encrypt_key(key)?;

        // Step 2: Run the encryption capability.
        let started = Instant::now();
        let output = transform::run(
            self.capability.as_ref(),
            &self.staging,
            CapabilityCall::Encrypt {
                image: image.staged.path().to_path_buf(),
                key: key.to_string(),
                map,
            },
        )
        .await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Step 3: Measure the artifact. Failures degrade, never abort.
        let outcome = metrics::measure(
            self.capability.as_ref(),
            MetricsCategory::Encryption,
            image.staged.path(),
            output.path(),
        )
        .await;
        let metrics = resolve_metrics(outcome, elapsed_ms);

        // Step 4: Persist the record. Artifacts are kept only on success.
        let record = self
            .persist(image, output, map, OperationType::Basic, metrics)
            .await?;

        info!(duration = &*format!("{:?}", started.elapsed()); "Encrypted {}", record.original_name);
        Ok(CompletedOperation { record })
    }

    /// Hide an uploaded secret image inside an uploaded cover image and
    /// persist the run. The record's subject is the secret image; the cover
    /// is transient.
    pub async fn encrypt_stego(
        &self,
        secret: UploadedArtifact,
        cover: UploadedArtifact,
        key: &str,
        map: MapVariant,
    ) -> Result<CompletedOperation, PipelineError> {
        validate_encrypt_key(key)?;

        let started = Instant::now();
        let output = transform::run(
            self.capability.as_ref(),
            &self.staging,
            CapabilityCall::StegoEncrypt {
                secret: secret.staged.path().to_path_buf(),
                cover: cover.staged.path().to_path_buf(),
                key: key.to_string(),
                map,
            },
        )
        .await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Stego quality compares the cover against what now hides the secret.
        let outcome = metrics::measure(
            self.capability.as_ref(),
            MetricsCategory::Steganography,
            cover.staged.path(),
            output.path(),
        )
        .await;
        let metrics = resolve_metrics(outcome, elapsed_ms);

        cover.staged.release();

        let record = self
            .persist(secret, output, map, OperationType::Steganography, metrics)
            .await?;

        info!(duration = &*format!("{:?}", started.elapsed()); "Hid {} inside a cover image", record.original_name);
        Ok(CompletedOperation { record })
    }

    /// Restore an encrypted upload. The artifacts are removed once the
    /// recovered bytes are in memory.
    pub async fn decrypt(
        &self,
        encrypted: UploadedArtifact,
        key: &str,
    ) -> Result<RecoveredArtifact, PipelineError> {
        validate_decrypt_key(key)?;

        let started = Instant::now();
        let output = transform::run(
            self.capability.as_ref(),
            &self.staging,
            CapabilityCall::Decrypt {
                input: encrypted.staged.path().to_path_buf(),
                key: key.to_string(),
            },
        )
        .await?;

        let recovered = self.recover(encrypted, output).await?;
        info!(duration = &*format!("{:?}", started.elapsed()); "Decrypted {}", recovered.file_name);
        Ok(recovered)
    }

    /// Extract the secret image hidden in a stego upload.
    pub async fn decrypt_stego(
        &self,
        stego: UploadedArtifact,
        key: &str,
    ) -> Result<RecoveredArtifact, PipelineError> {
        validate_decrypt_key(key)?;

        let started = Instant::now();
        let output = transform::run(
            self.capability.as_ref(),
            &self.staging,
            CapabilityCall::StegoDecrypt {
                input: stego.staged.path().to_path_buf(),
                key: key.to_string(),
            },
        )
        .await?;

        let recovered = self.recover(stego, output).await?;
        info!(duration = &*format!("{:?}", started.elapsed()); "Extracted {}", recovered.file_name);
        Ok(recovered)
    }

    /// Remove a record together with the artifacts it references.
    pub async fn delete_record(&self, id: &str) -> Result<OperationRecord, PipelineError> {
        let store = self.store.clone();
        let record_id = id.to_string();
        let removed = spawn_blocking(move || store.delete(&record_id))
            .await
            .map_err(|err| PipelineError::Internal(anyhow!("record writer task failed: {err}")))?
            .map_err(PipelineError::Internal)?;
        let record = removed.ok_or(PipelineError::NotFound)?;

        self.staging.release_recorded(&record.output_path);
        self.staging.release_recorded(&record.input_path);
        info!("Deleted record {} and its artifacts", record.id);
        Ok(record)
    }

    async fn recover(
        &self,
        input: UploadedArtifact,
        output: StagedFile,
    ) -> Result<RecoveredArtifact, PipelineError> {
        let file_name = output.file_name();
        let bytes = tokio::fs::read(output.path())
            .await
            .with_context(|| format!("Failed to read the produced artifact {:?}", output.path()))?;
        input.staged.release();
        output.release();
        Ok(RecoveredArtifact { file_name, bytes })
    }

    async fn persist(
        &self,
        subject: UploadedArtifact,
        output: StagedFile,
        map: MapVariant,
        operation_type: OperationType,
        metrics: Metrics,
    ) -> Result<OperationRecord, PipelineError> {
        let UploadedArtifact {
            staged: input,
            original_name,
            mime_type,
            size_bytes,
        } = subject;

        let record = record::assemble(RecordDraft {
            original_name,
            mime_type,
            size_bytes,
            input_path: input.path().to_path_buf(),
            output_path: output.path().to_path_buf(),
            chaotic_map: map,
            operation_type,
            metrics,
        });

        let store = self.store.clone();
        let stored = record.clone();
        match spawn_blocking(move || store.create(&stored)).await {
            Ok(Ok(())) => {
                // The record now owns both artifacts.
                input.keep();
                output.keep();
                Ok(record)
            }
            Ok(Err(err)) => Err(PipelineError::Persistence(err)),
            Err(err) => Err(PipelineError::Persistence(anyhow!(
                "record writer task failed: {err}"
            ))),
        }
    }
}

fn resolve_metrics(outcome: MetricsOutcome, elapsed_ms: u64) -> Metrics {
    match outcome {
        MetricsOutcome::Measured(mut metrics) => {
            metrics.encryption_time_ms = elapsed_ms;
            metrics
        }
        MetricsOutcome::Unavailable { reason } => {
            warn!("Metrics unavailable, recording zeroes: {}", reason);
            Metrics {
                encryption_time_ms: elapsed_ms,
                ..Metrics::default()
            }
        }
    }
}
