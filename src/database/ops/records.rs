use anyhow::{Context, Result};
use redb::{Database, ReadableTableMetadata};
use std::path::Path;
use std::sync::Arc;

use crate::database::schema::record::{OperationRecord, RECORD_TABLE};

/// Handle to the record table. Clones share one database, so the store can
/// be handed to blocking tasks freely.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Open (or create) the store and make sure the table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }
        let db = Database::create(path)
            .with_context(|| format!("Failed to open database {:?}", path))?;
        let txn = db.begin_write()?;
        txn.open_table(RECORD_TABLE)?;
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn create(&self, record: &OperationRecord) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RECORD_TABLE)?;
            table.insert(record.id.as_str(), bitcode::encode(record).as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn find(&self, id: &str) -> Result<Option<OperationRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORD_TABLE)?;
        let Some(bytes) = table.get(id)? else {
            return Ok(None);
        };
        let record = bitcode::decode(bytes.value()).context("Corrupt record entry")?;
        Ok(Some(record))
    }

    /// Remove a record and hand back what was stored, so the caller can
    /// clean up the artifacts it referenced.
    pub fn delete(&self, id: &str) -> Result<Option<OperationRecord>> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(RECORD_TABLE)?;
            match table.remove(id)? {
                Some(bytes) => {
                    Some(bitcode::decode(bytes.value()).context("Corrupt record entry")?)
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<OperationRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORD_TABLE)?;
        let count = table.len()?;
        let mut records = Vec::with_capacity(count as usize);
        for entry in table.range::<&str>(..)? {
            let (_, bytes) = entry?;
            let record: OperationRecord =
                bitcode::decode(bytes.value()).context("Corrupt record entry")?;
            records.push(record);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORD_TABLE)?;
        Ok(table.len()?)
    }
}
