use std::sync::{Mutex, MutexGuard};

use crate::models::JobRecord;

/// Accepted records for one run, in arrival order.
///
/// No dedup happens here; the persister does that on flush.
#[derive(Debug, Default)]
pub struct JobTable {
    rows: Mutex<Vec<JobRecord>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: JobRecord) {
        self.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JobRecord>> {
        // A panicking handler leaves the rows intact; keep using them.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl From<Vec<JobRecord>> for JobTable {
    fn from(rows: Vec<JobRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}
