pub mod csv_processor;
pub mod extraction;
pub mod state;
pub mod utils;

pub use csv_processor::{CatalogEntry, ColumnSchema, Dialect, FieldValue, FileRows, Record, SourceFile};
pub use extraction::{EmittedRecord, EntityStream, MessageEmitter, StreamEvent, StreamState, SyncOptions, SyncSummary};
pub use state::{CheckpointManager, CursorTracker, ReplicationCursor, ShutdownSignal, SyncStatus};
pub use utils::{EntityConfig, ResolvedEntity, Result, TapConfig, TapError};
