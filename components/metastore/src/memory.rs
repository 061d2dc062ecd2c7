use std::collections::HashMap;

use async_trait::async_trait;
use log::trace;
use model::{SegmentName, SegmentRecord};
use parking_lot::Mutex;

use crate::{MetaError, SegmentStore, Version};

/// Process-local [`SegmentStore`] with full compare-and-set semantics.
///
/// Backs the standalone server and every test; a clustered deployment plugs
/// a durable store in behind the same trait.
#[derive(Debug, Default)]
pub struct MemorySegmentStore {
    records: Mutex<HashMap<SegmentName, (SegmentRecord, Version)>>,
}

impl MemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn read_segment_record(
        &self,
        name: &SegmentName,
    ) -> Result<Option<(SegmentRecord, Version)>, MetaError> {
        Ok(self.records.lock().get(name).cloned())
    }

    async fn write_segment_record(
        &self,
        name: &SegmentName,
        record: SegmentRecord,
        expected: Version,
    ) -> Result<Version, MetaError> {
        let mut records = self.records.lock();
        match records.get_mut(name) {
            Some((current, version)) => {
                if *version != expected {
                    return Err(MetaError::Conflict {
                        expected,
                        actual: *version,
                    });
                }
                *current = record;
                *version += 1;
                trace!("Updated segment record {} to version {}", name, *version);
                Ok(*version)
            }
            None => Err(MetaError::NotFound(name.to_string())),
        }
    }

    async fn create_segment_record(
        &self,
        name: &SegmentName,
        record: SegmentRecord,
    ) -> Result<Version, MetaError> {
        let mut records = self.records.lock();
        if records.contains_key(name) {
            return Err(MetaError::AlreadyExists(name.to_string()));
        }
        records.insert(name.clone(), (record, 0));
        trace!("Created segment record {}", name);
        Ok(0)
    }
}
