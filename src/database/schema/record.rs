use arrayvec::ArrayString;
use bitcode::{Decode, Encode};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::capability::MapVariant;
use crate::pipeline::metrics::Metrics;

pub const RECORD_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("operation_records");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Basic,
    Steganography,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One completed pipeline run. The subject of the record is the image the
/// client asked to protect; `output_path` is the artifact served back on
/// download and removed together with the record on delete.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: ArrayString<64>,
    pub original_name: String,
    pub output_name: String,
    pub output_path: String,
    pub input_path: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub chaotic_map: MapVariant,
    pub operation_type: OperationType,
    pub status: RecordStatus,
    pub metrics: Metrics,
    pub created_at: u64,
}
