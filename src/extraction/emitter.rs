use crate::csv_processor::{CatalogEntry, Record, REPLICATION_KEY};
use crate::extraction::stream::EmittedRecord;
use crate::state::ReplicationCursor;
use crate::utils::Result;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum Message<'a> {
    Schema {
        stream: &'a str,
        schema: &'a JsonValue,
        key_properties: &'a [String],
        bookmark_properties: [&'a str; 1],
    },
    Record {
        stream: &'a str,
        record: &'a Record,
    },
    State {
        value: JsonValue,
    },
}

/// Writes SCHEMA / RECORD / STATE messages as JSON lines.
///
/// STATE always carries the bookmarks of every entity seen so far.
pub struct MessageEmitter<W: Write> {
    writer: W,
    bookmarks: BTreeMap<String, String>,
    records_written: u64,
}

impl<W: Write> MessageEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bookmarks: BTreeMap::new(),
            records_written: 0,
        }
    }

    fn write_message(&mut self, message: &Message<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn write_schema(&mut self, entry: &CatalogEntry) -> Result<()> {
        self.write_message(&Message::Schema {
            stream: &entry.stream,
            schema: &entry.schema,
            key_properties: &entry.key_properties,
            bookmark_properties: [REPLICATION_KEY],
        })
    }

    pub fn write_record(&mut self, emitted: &EmittedRecord) -> Result<()> {
        self.write_message(&Message::Record {
            stream: &emitted.entity,
            record: &emitted.record,
        })?;
        self.records_written += 1;
        Ok(())
    }

    pub fn write_state(&mut self, entity: &str, cursor: Option<&ReplicationCursor>) -> Result<()> {
        if let Some(c) = cursor {
            self.bookmarks.insert(entity.to_string(), c.to_string());
        }

        let bookmarks: serde_json::Map<String, JsonValue> = self
            .bookmarks
            .iter()
            .map(|(entity, value)| {
                (
                    entity.clone(),
                    json!({
                        "replication_key": REPLICATION_KEY,
                        "replication_key_value": value,
                    }),
                )
            })
            .collect();

        self.write_message(&Message::State {
            value: json!({ "bookmarks": bookmarks }),
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns how many records were written.
    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;
        Ok(self.records_written)
    }
}
