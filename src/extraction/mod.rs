pub mod emitter;
pub mod stream;

pub use emitter::MessageEmitter;
pub use stream::{effective_start, EmittedRecord, EntityStream, StreamEvent, StreamState, SyncSummary};

use crate::state::{CheckpointManager, ShutdownSignal, SyncStatus};
use crate::utils::{ResolvedEntity, Result};
use std::io::Write;
use tracing::{info, info_span};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub checkpoint_every_rows: u64,
    pub shutdown: ShutdownSignal,
}

/// Runs entities one after another, writing messages and persisting bookmarks.
///
/// Per-file and per-row problems only show up in the summaries; an `Err` here
/// means the output or the bookmark store failed.
pub fn sync_entities<W: Write>(
    entities: &[ResolvedEntity],
    options: &SyncOptions,
    checkpoints: Option<&CheckpointManager>,
    emitter: &mut MessageEmitter<W>,
) -> Result<Vec<SyncSummary>> {
    let span = info_span!("sync", sync_id = %Uuid::new_v4());
    let _guard = span.enter();

    let mut summaries = Vec::with_capacity(entities.len());

    for entity in entities {
        if options.shutdown.is_requested() {
            info!(entity = %entity.name, "Shutdown requested, not starting entity");
            break;
        }
        summaries.push(sync_entity(entity, options, checkpoints, emitter)?);
    }

    emitter.flush()?;
    Ok(summaries)
}

pub fn sync_entity<W: Write>(
    entity: &ResolvedEntity,
    options: &SyncOptions,
    checkpoints: Option<&CheckpointManager>,
    emitter: &mut MessageEmitter<W>,
) -> Result<SyncSummary> {
    let stored = match checkpoints {
        Some(store) => store.load_cursor(&entity.name)?,
        None => None,
    };
    let start = effective_start(entity.start_from.as_ref(), stored.as_ref());
    info!(entity = %entity.name, start = ?start.as_ref().map(|c| c.to_string()), "Starting entity sync");

    let mut stream = EntityStream::new(entity.clone(), start)
        .with_shutdown(options.shutdown.clone())
        .with_checkpoint_every(options.checkpoint_every_rows);

    for event in stream.by_ref() {
        match event {
            StreamEvent::Schema(entry) => emitter.write_schema(&entry)?,
            StreamEvent::Record(emitted) => emitter.write_record(&emitted)?,
            StreamEvent::Checkpoint { entity, cursor } => {
                emitter.write_state(&entity, cursor.as_ref())?;
                emitter.flush()?;
                if let Some(store) = checkpoints {
                    store.record_progress(&entity, cursor.as_ref(), SyncStatus::Running)?;
                }
            }
        }
    }

    let summary = stream.summary();
    if let Some(store) = checkpoints {
        store.record_progress(&entity.name, summary.cursor.as_ref(), summary.state.sync_status())?;
    }

    info!(
        entity = %entity.name,
        status = %summary.state.sync_status(),
        records = summary.records_emitted,
        files_read = summary.files_read,
        files_failed = summary.files_failed,
        "Finished entity sync"
    );

    Ok(summary)
}
