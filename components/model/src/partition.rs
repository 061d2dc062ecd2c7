use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identity of one independently-consumed stream partition of a table.
///
/// Every replica ingesting the same partition group sees the same ordered
/// record sequence, so the completion coordinator arbitrates per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub table_name: String,

    pub partition_group_id: u32,
}

impl PartitionKey {
    pub fn new(table_name: impl Into<String>, partition_group_id: u32) -> Self {
        Self {
            table_name: table_name.into(),
            partition_group_id,
        }
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table_name, self.partition_group_id)
    }
}
