pub mod checkpoint;
pub mod cursor;

pub use checkpoint::{Bookmark, CheckpointManager, SyncStatus};
pub use cursor::{CursorTracker, FileCoverage, ReplicationCursor};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop request, polled between rows and between files.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
