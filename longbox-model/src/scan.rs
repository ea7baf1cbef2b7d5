use serde::{Deserialize, Serialize};

/// Per-invocation scan outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl ScanSummary {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted + self.skipped
    }
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} deleted, {} skipped",
            self.added, self.updated, self.deleted, self.skipped
        )
    }
}
