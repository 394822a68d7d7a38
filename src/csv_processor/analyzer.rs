use crate::csv_processor::enumerator::{enumerate_files, SourceFile};
use crate::csv_processor::reader::FileRows;
use crate::csv_processor::record::{ColumnSchema, REPLICATION_KEY};
use crate::utils::{ResolvedEntity, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tracing::warn;

/// Discovery output for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub tap_stream_id: String,
    pub stream: String,
    pub schema: JsonValue,
    pub key_properties: Vec<String>,
    pub replication_key: String,
    pub source_files: Vec<String>,
}

/// The explicit header, or the header row of the first readable file.
pub fn entity_columns(entity: &ResolvedEntity, files: &[SourceFile]) -> ColumnSchema {
    if let Some(header) = &entity.header {
        return header.clone();
    }

    for file in files {
        match FileRows::open(file, &entity.dialect, None, 0) {
            Ok(rows) => return rows.columns().clone(),
            Err(e) => {
                warn!(entity = %entity.name, file = %file.name, error = %e, "Cannot read header");
            }
        }
    }

    ColumnSchema::empty()
}

/// Every column may hold a number, text or nothing; CSV carries no types.
pub fn schema_for_columns(columns: &ColumnSchema) -> JsonValue {
    let mut properties = Map::new();
    for name in columns.names() {
        properties.insert(name.clone(), json!({ "type": ["number", "string", "null"] }));
    }
    properties.insert(REPLICATION_KEY.to_string(), json!({ "type": "string" }));

    json!({
        "type": "object",
        "properties": properties,
    })
}

/// `None` when the entity currently matches no files.
pub fn discover_entity(entity: &ResolvedEntity) -> Result<Option<CatalogEntry>> {
    let files = enumerate_files(&entity.path, entity.prefix.as_deref())?;
    if files.is_empty() {
        warn!(entity = %entity.name, "Entity has no acceptable files");
        return Ok(None);
    }

    let columns = entity_columns(entity, &files);
    Ok(Some(catalog_entry(entity, &columns, &files)))
}

pub fn catalog_entry(entity: &ResolvedEntity, columns: &ColumnSchema, files: &[SourceFile]) -> CatalogEntry {
    CatalogEntry {
        tap_stream_id: entity.name.clone(),
        stream: entity.name.clone(),
        schema: schema_for_columns(columns),
        key_properties: entity.keys.clone(),
        replication_key: REPLICATION_KEY.to_string(),
        source_files: files.iter().map(|f| f.name.clone()).collect(),
    }
}

pub fn discover_catalog(entities: &[ResolvedEntity]) -> Result<Vec<CatalogEntry>> {
    let mut catalog = Vec::with_capacity(entities.len());
    for entity in entities {
        if let Some(entry) = discover_entity(entity)? {
            catalog.push(entry);
        }
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_processor::dialect::Dialect;
    use std::path::Path;

    fn entity(path: &Path, prefix: Option<&str>, header: Option<&[&str]>) -> ResolvedEntity {
        ResolvedEntity {
            name: "people".into(),
            path: path.to_path_buf(),
            prefix: prefix.map(str::to_string),
            keys: vec!["id".into()],
            start_from: None,
            dialect: Dialect::default(),
            header: header.map(|h| ColumnSchema::new(h.iter().map(|c| c.to_string()).collect()).unwrap()),
        }
    }

    #[test]
    fn schema_comes_from_first_file_header() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("people_1.csv"), "id,name\n1,Ann\n").unwrap();
        std::fs::write(dir.path().join("people_2.csv"), "id,name,extra\n2,Bo,x\n").unwrap();

        let entry = discover_entity(&entity(dir.path(), Some("people"), None))
            .unwrap()
            .unwrap();

        let properties = entry.schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 3);
        assert_eq!(properties["id"]["type"], json!(["number", "string", "null"]));
        assert_eq!(properties[REPLICATION_KEY]["type"], "string");
        assert_eq!(entry.key_properties, vec!["id"]);
        assert_eq!(entry.source_files, vec!["people_1.csv", "people_2.csv"]);
    }

    #[test]
    fn explicit_header_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "1,Ann\n").unwrap();

        let entry = discover_entity(&entity(dir.path(), None, Some(&["Id", "Name"])))
            .unwrap()
            .unwrap();
        let properties = entry.schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("Id"));
        assert!(!properties.contains_key("1"));
    }

    #[test]
    fn entities_without_files_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.csv"), "a\n1\n").unwrap();

        let catalog = discover_catalog(&[entity(dir.path(), Some("people"), None)]).unwrap();
        assert!(catalog.is_empty());
    }
}
