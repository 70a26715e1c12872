use arrayvec::ArrayString;
use std::path::PathBuf;
use uuid::Uuid;

use crate::capability::MapVariant;
use crate::database::schema::record::{OperationRecord, OperationType, RecordStatus};
use crate::pipeline::metrics::Metrics;
use crate::utils::{file_name_string, now_millis};

/// Everything a finished run contributes to its durable record.
#[derive(Debug)]
pub struct RecordDraft {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub chaotic_map: MapVariant,
    pub operation_type: OperationType,
    pub metrics: Metrics,
}

pub fn assemble(draft: RecordDraft) -> OperationRecord {
    let id = Uuid::new_v4().to_string();
    OperationRecord {
        id: ArrayString::<64>::from(&id).unwrap(),
        original_name: draft.original_name,
        output_name: file_name_string(&draft.output_path),
        output_path: draft.output_path.to_string_lossy().into_owned(),
        input_path: draft.input_path.to_string_lossy().into_owned(),
        size_bytes: draft.size_bytes,
        mime_type: draft.mime_type,
        chaotic_map: draft.chaotic_map,
        operation_type: draft.operation_type,
        status: RecordStatus::Completed,
        metrics: draft.metrics,
        created_at: now_millis(),
    }
}
