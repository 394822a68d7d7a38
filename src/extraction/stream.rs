use crate::csv_processor::{
    catalog_entry, entity_columns, enumerate_files, CatalogEntry, ColumnSchema, FileRows, Record,
    SourceFile,
};
use crate::state::{CursorTracker, FileCoverage, ReplicationCursor, ShutdownSignal, SyncStatus};
use crate::utils::{ErrorClass, ResolvedEntity, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PROGRESS_LOG_EVERY: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Init,
    Enumerating,
    ResolvingHeader,
    StreamingRows,
    Done,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn sync_status(&self) -> SyncStatus {
        match self {
            StreamState::Done => SyncStatus::Completed,
            StreamState::Failed => SyncStatus::Failed,
            StreamState::Cancelled => SyncStatus::Cancelled,
            _ => SyncStatus::Running,
        }
    }
}

/// A record together with the entity cursor right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRecord {
    pub entity: Arc<str>,
    pub record: Record,
    pub cursor: ReplicationCursor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Emitted once, before any record, when the entity has files.
    Schema(CatalogEntry),
    Record(EmittedRecord),
    /// Safe point to persist the cursor: after each file and every N records.
    Checkpoint {
        entity: Arc<str>,
        cursor: Option<ReplicationCursor>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub entity: String,
    pub state: StreamState,
    pub files_enumerated: usize,
    pub files_read: usize,
    pub files_already_synced: usize,
    pub files_failed: usize,
    pub records_emitted: u64,
    pub rows_skipped: u64,
    pub rows_malformed: u64,
    pub cursor: Option<ReplicationCursor>,
}

impl SyncSummary {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            state: StreamState::Init,
            files_enumerated: 0,
            files_read: 0,
            files_already_synced: 0,
            files_failed: 0,
            records_emitted: 0,
            rows_skipped: 0,
            rows_malformed: 0,
            cursor: None,
        }
    }
}

/// The later of the configured start position and the stored bookmark.
pub fn effective_start(
    configured: Option<&ReplicationCursor>,
    stored: Option<&ReplicationCursor>,
) -> Option<ReplicationCursor> {
    std::cmp::max(configured, stored).cloned()
}

/// Lazy record stream for one entity.
///
/// Walks `INIT -> ENUMERATING -> (RESOLVING_HEADER -> STREAMING_ROWS)* -> DONE`.
/// Resuming re-reads the cursor's file and drops rows at or before it. Not
/// restartable: build a new stream from the last cursor to scan again.
///
/// Delivery is at-least-once. A run that dies after emitting a record but
/// before its checkpoint is persisted emits that record again on the next run.
pub struct EntityStream {
    entity: ResolvedEntity,
    name: Arc<str>,
    tracker: CursorTracker,
    shutdown: ShutdownSignal,
    checkpoint_every: u64,
    state: StreamState,
    files: std::vec::IntoIter<SourceFile>,
    current: Option<FileRows>,
    catalog_columns: Option<ColumnSchema>,
    since_checkpoint: u64,
    checkpoint_due: bool,
    summary: SyncSummary,
}

impl EntityStream {
    pub fn new(entity: ResolvedEntity, resume: Option<ReplicationCursor>) -> Self {
        let name: Arc<str> = Arc::from(entity.name.as_str());
        let mut tracker = CursorTracker::new();
        tracker.resume_from(&entity.name, resume);
        let summary = SyncSummary::new(&entity.name);

        Self {
            entity,
            name,
            tracker,
            shutdown: ShutdownSignal::new(),
            checkpoint_every: 0,
            state: StreamState::Init,
            files: Vec::new().into_iter(),
            current: None,
            catalog_columns: None,
            since_checkpoint: 0,
            checkpoint_due: false,
            summary,
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// `0` disables row-count checkpoints; per-file checkpoints always happen.
    pub fn with_checkpoint_every(mut self, rows: u64) -> Self {
        self.checkpoint_every = rows;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn cursor(&self) -> Option<&ReplicationCursor> {
        self.tracker.position(&self.entity.name)
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = self.summary.clone();
        summary.state = self.state;
        summary.cursor = self.cursor().cloned();
        summary
    }

    fn checkpoint(&mut self) -> StreamEvent {
        self.since_checkpoint = 0;
        self.checkpoint_due = false;
        StreamEvent::Checkpoint {
            entity: self.name.clone(),
            cursor: self.cursor().cloned(),
        }
    }

    fn cancel(&mut self) -> StreamEvent {
        if let Some(rows) = self.current.take() {
            self.summary.rows_skipped += rows.rows_skipped();
        }
        info!(entity = %self.name, cursor = ?self.cursor(), "Extraction cancelled");
        self.state = StreamState::Cancelled;
        self.checkpoint()
    }

    fn enumerate(&mut self) -> Option<StreamEvent> {
        let files = match enumerate_files(&self.entity.path, self.entity.prefix.as_deref()) {
            Ok(files) => files,
            Err(e) => {
                error!(entity = %self.name, path = %self.entity.path.display(), error = %e, "Cannot list files");
                self.state = StreamState::Failed;
                return None;
            }
        };

        self.summary.files_enumerated = files.len();
        self.state = StreamState::ResolvingHeader;

        if files.is_empty() {
            warn!(entity = %self.name, "Entity has no acceptable files");
            return None;
        }

        let columns = entity_columns(&self.entity, &files);
        let entry = catalog_entry(&self.entity, &columns, &files);
        self.catalog_columns = Some(columns);
        self.files = files.into_iter();
        Some(StreamEvent::Schema(entry))
    }

    fn open_next_file(&mut self) {
        let Some(file) = self.files.next() else {
            info!(
                entity = %self.name,
                records = self.summary.records_emitted,
                "Entity sync complete"
            );
            self.state = StreamState::Done;
            return;
        };

        let resume_after = match self.tracker.coverage(&self.entity.name, &file.name) {
            FileCoverage::Synced => {
                info!(entity = %self.name, file = %file.name, "Skipping file, already synced");
                self.summary.files_already_synced += 1;
                return;
            }
            FileCoverage::ResumeAfter(row) => {
                info!(entity = %self.name, file = %file.name, row, "Resuming file after row");
                row
            }
            FileCoverage::Unread => 0,
        };

        match FileRows::open(&file, &self.entity.dialect, self.entity.header.as_ref(), resume_after) {
            Ok(rows) => {
                if let Some(expected) = &self.catalog_columns {
                    if !rows.columns().is_empty() && rows.columns() != expected {
                        warn!(
                            entity = %self.name,
                            file = %file.name,
                            expected = ?expected.names(),
                            found = ?rows.columns().names(),
                            "Header differs from the entity schema"
                        );
                    }
                }
                debug!(entity = %self.name, file = %file.name, columns = rows.columns().len(), "Streaming file");
                self.current = Some(rows);
                self.state = StreamState::StreamingRows;
            }
            Err(e) => {
                warn!(entity = %self.name, file = %file.name, error = %e, "Skipping unreadable file");
                self.summary.files_failed += 1;
            }
        }
    }

    fn finish_file(&mut self, failed: bool) -> StreamEvent {
        if let Some(rows) = self.current.take() {
            self.summary.rows_skipped += rows.rows_skipped();
            if failed {
                self.summary.files_failed += 1;
            } else {
                self.summary.files_read += 1;
                info!(entity = %self.name, file = %rows.file_name(), rows = rows.rows_read(), "Synced file");
            }
        }
        self.state = StreamState::ResolvingHeader;
        self.checkpoint()
    }

    /// Applies the skip, advance and error rules to one item from the open
    /// file. `None` means nothing to emit yet.
    fn handle_row(&mut self, next: Option<Result<Record>>) -> Option<StreamEvent> {
        match next {
            Some(Ok(record)) => {
                let file = record.file_name.clone();
                let row = record.row_number;

                if self.tracker.should_skip(&self.entity.name, &file, row) {
                    self.summary.rows_skipped += 1;
                    return None;
                }
                self.tracker.advance(&self.entity.name, &file, row);

                self.summary.records_emitted += 1;
                self.since_checkpoint += 1;
                if self.checkpoint_every > 0 && self.since_checkpoint >= self.checkpoint_every {
                    self.checkpoint_due = true;
                }
                if row % PROGRESS_LOG_EVERY == 0 {
                    debug!(entity = %self.name, file = %file, row, "Syncing");
                }

                let cursor = ReplicationCursor::new(&*file, row);
                Some(StreamEvent::Record(EmittedRecord {
                    entity: self.name.clone(),
                    record,
                    cursor,
                }))
            }
            Some(Err(e)) if e.class() == ErrorClass::Row => {
                warn!(entity = %self.name, error = %e, "Skipping malformed row");
                self.summary.rows_malformed += 1;
                None
            }
            Some(Err(e)) => {
                warn!(entity = %self.name, error = %e, "Abandoning rest of file");
                Some(self.finish_file(true))
            }
            None => Some(self.finish_file(false)),
        }
    }
}

impl Iterator for EntityStream {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        if self.checkpoint_due {
            return Some(self.checkpoint());
        }

        loop {
            match self.state {
                StreamState::Done | StreamState::Failed | StreamState::Cancelled => return None,
                StreamState::Init => self.state = StreamState::Enumerating,
                StreamState::Enumerating => {
                    if let Some(schema) = self.enumerate() {
                        return Some(schema);
                    }
                }
                StreamState::ResolvingHeader => {
                    if self.shutdown.is_requested() {
                        return Some(self.cancel());
                    }
                    self.open_next_file();
                }
                StreamState::StreamingRows => {
                    if self.shutdown.is_requested() {
                        return Some(self.cancel());
                    }

                    let next = match self.current.as_mut() {
                        Some(rows) => rows.next(),
                        None => {
                            self.state = StreamState::ResolvingHeader;
                            continue;
                        }
                    };

                    if let Some(event) = self.handle_row(next) {
                        return Some(event);
                    }
                }
            }
        }
    }
}
