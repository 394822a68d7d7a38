pub mod analyzer;
pub mod dialect;
pub mod enumerator;
pub mod header;
pub mod reader;
pub mod record;

pub use analyzer::{catalog_entry, discover_catalog, discover_entity, entity_columns, schema_for_columns, CatalogEntry};
pub use dialect::{Dialect, Encoding};
pub use enumerator::{enumerate_files, SourceFile};
pub use header::{resolve_header, ResolvedHeader};
pub use reader::{CsvStreamReader, FileRows, RawRow};
pub use record::{format_position, ColumnSchema, FieldValue, Record, REPLICATION_KEY};
