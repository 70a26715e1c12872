use rocket::State;
use rocket::serde::json::Json;
use serde::Serialize;
use tokio::task::spawn_blocking;

use crate::api::AppResult;
use crate::capability::MapVariant;
use crate::common::RECENT_RECORDS_WINDOW;
use crate::database::schema::record::{OperationRecord, OperationType};
use crate::pipeline::Pipeline;
use crate::pipeline::metrics::Metrics;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_records: u64,
    pub basic_count: usize,
    pub stego_count: usize,
    pub total_bytes: u64,
    pub average_encryption_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct AdminStatsResponse {
    pub success: bool,
    pub stats: AdminStats,
}

#[get("/admin/stats")]
pub async fn admin_stats(pipeline: &State<Pipeline>) -> AppResult<Json<AdminStatsResponse>> {
    let store = pipeline.store().clone();
    let (total_records, records) = spawn_blocking(
        move || -> anyhow::Result<(u64, Vec<OperationRecord>)> {
            let total = store.count()?;
            let recent = store.list_recent(RECENT_RECORDS_WINDOW)?;
            Ok((total, recent))
        },
    )
    .await??;

    let basic_count = records
        .iter()
        .filter(|record| record.operation_type == OperationType::Basic)
        .count();
    let stats = AdminStats {
        total_records,
        basic_count,
        stego_count: records.len() - basic_count,
        total_bytes: records.iter().map(|record| record.size_bytes).sum(),
        average_encryption_time_ms: mean(
            records
                .iter()
                .map(|record| record.metrics.encryption_time_ms as f64),
        ),
    };

    Ok(Json(AdminStatsResponse {
        success: true,
        stats,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRow {
    pub image_id: String,
    pub original_name: String,
    pub operation_type: OperationType,
    pub chaotic_map: MapVariant,
    pub created_at: u64,
    pub metrics: Metrics,
}

#[derive(Debug, Serialize)]
pub struct MetricsAllResponse {
    pub success: bool,
    pub metrics: Vec<MetricsRow>,
}

#[get("/metrics/all")]
pub async fn metrics_all(pipeline: &State<Pipeline>) -> AppResult<Json<MetricsAllResponse>> {
    let store = pipeline.store().clone();
    let records = spawn_blocking(move || store.list_recent(RECENT_RECORDS_WINDOW)).await??;

    let metrics = records
        .into_iter()
        .map(|record| MetricsRow {
            image_id: record.id.to_string(),
            original_name: record.original_name,
            operation_type: record.operation_type,
            chaotic_map: record.chaotic_map,
            created_at: record.created_at,
            metrics: record.metrics,
        })
        .collect();

    Ok(Json(MetricsAllResponse {
        success: true,
        metrics,
    }))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionAverages {
    pub measured_count: usize,
    pub average_entropy_original: f64,
    pub average_entropy_encrypted: f64,
    pub average_npcr: f64,
    pub average_uaci: f64,
    pub average_correlation: f64,
    pub average_encryption_time_ms: f64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SteganographyAverages {
    pub measured_count: usize,
    pub average_psnr: f64,
    pub average_mse: f64,
    pub average_encryption_time_ms: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsStats {
    pub encryption: EncryptionAverages,
    pub steganography: SteganographyAverages,
}

#[derive(Debug, Serialize)]
pub struct MetricsStatsResponse {
    pub success: bool,
    pub stats: MetricsStats,
}

/// Means are taken over records whose metrics were actually measured, so
/// degraded runs do not drag the averages toward zero.
#[get("/metrics/stats")]
pub async fn metrics_stats(pipeline: &State<Pipeline>) -> AppResult<Json<MetricsStatsResponse>> {
    let store = pipeline.store().clone();
    let records = spawn_blocking(move || store.list_recent(RECENT_RECORDS_WINDOW)).await??;

    let measured_basic: Vec<&OperationRecord> = records
        .iter()
        .filter(|record| {
            record.operation_type == OperationType::Basic && record.metrics.entropy.encrypted > 0.0
        })
        .collect();
    let measured_stego: Vec<&OperationRecord> = records
        .iter()
        .filter(|record| {
            record.operation_type == OperationType::Steganography && record.metrics.psnr > 0.0
        })
        .collect();

    let encryption = EncryptionAverages {
        measured_count: measured_basic.len(),
        average_entropy_original: field_mean(&measured_basic, |m| m.entropy.original),
        average_entropy_encrypted: field_mean(&measured_basic, |m| m.entropy.encrypted),
        average_npcr: field_mean(&measured_basic, |m| m.npcr),
        average_uaci: field_mean(&measured_basic, |m| m.uaci),
        average_correlation: field_mean(&measured_basic, |m| m.correlation),
        average_encryption_time_ms: field_mean(&measured_basic, |m| m.encryption_time_ms as f64),
    };
    let steganography = SteganographyAverages {
        measured_count: measured_stego.len(),
        average_psnr: field_mean(&measured_stego, |m| m.psnr),
        average_mse: field_mean(&measured_stego, |m| m.mse),
        average_encryption_time_ms: field_mean(&measured_stego, |m| m.encryption_time_ms as f64),
    };

    Ok(Json(MetricsStatsResponse {
        success: true,
        stats: MetricsStats {
            encryption,
            steganography,
        },
    }))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn field_mean(records: &[&OperationRecord], field: impl Fn(&Metrics) -> f64) -> f64 {
    mean(records.iter().map(|record| field(&record.metrics)))
}
