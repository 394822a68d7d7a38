use csv_tap::extraction::{sync_entities, sync_entity};
use csv_tap::{
    CheckpointManager, EntityStream, FieldValue, MessageEmitter, Record, ReplicationCursor,
    ResolvedEntity, StreamEvent, StreamState, SyncOptions, SyncStatus, TapConfig,
};
use serde_json::Value as JsonValue;
use std::path::Path;

fn alphabet(dir: &Path) {
    let mut content = String::from("letter,position\n");
    for (i, c) in ('a'..='k').enumerate() {
        content.push_str(&format!("{},{}\n", c, i + 1));
    }
    std::fs::write(dir.join("alphabet.csv"), content).unwrap();
}

fn resolve_one(toml: &str) -> ResolvedEntity {
    TapConfig::from_toml_str(toml).unwrap().resolve().unwrap().remove(0)
}

fn records(entity: ResolvedEntity, start: Option<ReplicationCursor>) -> Vec<Record> {
    EntityStream::new(entity, start)
        .filter_map(|event| match event {
            StreamEvent::Record(r) => Some(r.record),
            _ => None,
        })
        .collect()
}

fn run(entities: &[ResolvedEntity], store: Option<&CheckpointManager>) -> (Vec<JsonValue>, Vec<csv_tap::SyncSummary>) {
    let mut buffer = Vec::new();
    let summaries = {
        let mut emitter = MessageEmitter::new(&mut buffer);
        sync_entities(entities, &SyncOptions::default(), store, &mut emitter).unwrap()
    };
    let messages = std::str::from_utf8(&buffer)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    (messages, summaries)
}

fn of_type<'a>(messages: &'a [JsonValue], kind: &str) -> Vec<&'a JsonValue> {
    messages.iter().filter(|m| m["type"] == kind).collect()
}

#[test]
fn start_from_skips_through_the_given_row() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.csv"), "1,a\n2,b\n3,c\n4,d\n5,e\n").unwrap();

    let entity = resolve_one(&format!(
        r#"
        [[files]]
        entity = "data"
        path = "{}"
        header = ["n", "s"]
        start_from = "data.csv:3"
        "#,
        dir.path().join("data.csv").display()
    ));
    let start = entity.start_from.clone();

    let rows: Vec<u64> = records(entity, start).iter().map(|r| r.row_number).collect();
    assert_eq!(rows, vec![4, 5]);
}

#[test]
fn blank_lines_do_not_shift_the_resume_point() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.csv"), "1\n\n3\n4\n").unwrap();

    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"data\"\npath = \"{}\"\nheader = [\"n\"]\nstart_from = \"data.csv:3\"\n",
        dir.path().display()
    ));
    let start = entity.start_from.clone();

    let rows = records(entity, start);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_number, 4);
    assert_eq!(rows[0].get("n"), Some(&FieldValue::Integer(4)));
}

#[test]
fn explicit_header_row_in_file_is_skipped_only_when_equal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("with")).unwrap();
    std::fs::create_dir(dir.path().join("without")).unwrap();
    std::fs::write(dir.path().join("with/p.csv"), "Id,Name\n1,Alice\n").unwrap();
    std::fs::write(dir.path().join("without/p.csv"), "1,Alice\n2,Bob\n").unwrap();

    let config = |sub: &str| {
        resolve_one(&format!(
            "[[files]]\nentity = \"p\"\npath = \"{}\"\nheader = [\"Id\", \"Name\"]\n",
            dir.path().join(sub).display()
        ))
    };

    let with = records(config("with"), None);
    assert_eq!(with.len(), 1);
    assert_eq!(with[0].row_number, 2);
    assert_eq!(with[0].get("Name"), Some(&FieldValue::Text("Alice".into())));

    let without = records(config("without"), None);
    assert_eq!(without.len(), 2);
    assert_eq!(without[0].row_number, 1);
    assert_eq!(without[0].get("Id"), Some(&FieldValue::Integer(1)));
}

#[test]
fn ragged_rows_are_padded_or_truncated() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("r.csv"), "a,b\n1\n1,2,3,4\n").unwrap();

    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"r\"\npath = \"{}\"\n",
        dir.path().display()
    ));
    let rows = records(entity, None);

    assert_eq!(rows[0].values, vec![FieldValue::Integer(1), FieldValue::Null]);
    assert_eq!(rows[1].values, vec![FieldValue::Integer(1), FieldValue::Integer(2)]);
}

#[test]
fn second_run_from_the_stored_bookmark_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir(&data).unwrap();
    alphabet(&data);
    let store = CheckpointManager::new(&dir.path().join("state.redb")).unwrap();

    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"test\"\npath = \"{}\"\n",
        data.display()
    ));

    let (first, summaries) = run(std::slice::from_ref(&entity), Some(&store));
    assert_eq!(of_type(&first, "RECORD").len(), 11);
    assert_eq!(summaries[0].state, StreamState::Done);

    let bookmark = store.load_bookmark("test").unwrap().unwrap();
    assert_eq!(bookmark.cursor, Some(ReplicationCursor::new("alphabet.csv", 12)));
    assert_eq!(bookmark.status, SyncStatus::Completed);

    let (second, summaries) = run(&[entity], Some(&store));
    assert!(of_type(&second, "RECORD").is_empty());
    assert_eq!(summaries[0].records_emitted, 0);
    assert_eq!(summaries[0].rows_skipped, 11);
}

#[test]
fn new_rows_after_a_run_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir(&data).unwrap();
    std::fs::write(data.join("a_1.csv"), "id\n1\n2\n").unwrap();
    let store = CheckpointManager::new(&dir.path().join("state.redb")).unwrap();
    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"e\"\npath = \"{}\"\n",
        data.display()
    ));

    let mut sink = Vec::new();
    let mut emitter = MessageEmitter::new(&mut sink);
    let first = sync_entity(&entity, &SyncOptions::default(), Some(&store), &mut emitter).unwrap();
    assert_eq!(first.records_emitted, 2);

    std::fs::write(data.join("a_2.csv"), "id\n3\n").unwrap();
    let second = sync_entity(&entity, &SyncOptions::default(), Some(&store), &mut emitter).unwrap();
    assert_eq!(second.records_emitted, 1);
    assert_eq!(second.files_read, 2);
    assert_eq!(second.rows_skipped, 2);
    assert_eq!(second.cursor, Some(ReplicationCursor::new("a_2.csv", 2)));
}

#[test]
fn unreadable_file_is_skipped_and_the_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "id\n1\n2\n").unwrap();
    std::fs::write(dir.path().join("b.csv"), b"\xff\xfe\xfd\n1\n".as_slice()).unwrap();
    std::fs::write(dir.path().join("c.csv"), "id\n3\n").unwrap();

    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"e\"\npath = \"{}\"\n",
        dir.path().display()
    ));

    let mut stream = EntityStream::new(entity, None);
    let files: Vec<String> = stream
        .by_ref()
        .filter_map(|event| match event {
            StreamEvent::Record(r) => Some(r.record.file_name.to_string()),
            _ => None,
        })
        .collect();

    assert_eq!(files, vec!["a.csv", "a.csv", "c.csv"]);
    let summary = stream.summary();
    assert_eq!(summary.state, StreamState::Done);
    assert_eq!(summary.files_enumerated, 3);
    assert_eq!(summary.files_read, 2);
    assert_eq!(summary.files_failed, 1);
}

#[test]
fn state_messages_track_the_replication_key() {
    let dir = tempfile::tempdir().unwrap();
    alphabet(dir.path());
    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"test\"\npath = \"{}\"\nkeys = []\n",
        dir.path().join("alphabet.csv").display()
    ));

    let (messages, _) = run(&[entity], None);

    assert_eq!(messages[0]["type"], "SCHEMA");
    let records = of_type(&messages, "RECORD");
    assert_eq!(records[0]["record"]["replication_key"], "alphabet.csv:000000002");
    assert_eq!(records[0]["record"]["letter"], "a");
    assert_eq!(records[0]["record"]["position"], 1);

    let last = messages.last().unwrap();
    assert_eq!(last["type"], "STATE");
    assert_eq!(
        last["value"]["bookmarks"]["test"]["replication_key_value"],
        "alphabet.csv:000000012"
    );
}

#[test]
fn global_path_with_prefix_and_custom_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    alphabet(dir.path());
    std::fs::write(dir.path().join("tilde.txt"), "col1~col2\nx~1\ny~2\n").unwrap();

    let entities = TapConfig::from_toml_str(&format!(
        r#"
        path = "{}"

        [[files]]
        entity = "tilde"
        prefix = "TILDE"
        delimiter = "~"
        keys = ["col1"]
        "#,
        dir.path().display()
    ))
    .unwrap()
    .resolve()
    .unwrap();

    let (messages, summaries) = run(&entities, None);
    let records = of_type(&messages, "RECORD");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["record"]["col1"], "y");
    assert_eq!(records[1]["record"]["replication_key"], "tilde.txt:000000003");
    assert_eq!(messages[0]["key_properties"], serde_json::json!(["col1"]));
    assert_eq!(summaries[0].files_enumerated, 1);
}

#[test]
fn empty_file_yields_no_records_and_no_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.csv"), "").unwrap();
    let entity = resolve_one(&format!(
        "[[files]]\nentity = \"e\"\npath = \"{}\"\n",
        dir.path().display()
    ));

    let mut stream = EntityStream::new(entity, None);
    assert!(!stream.by_ref().any(|e| matches!(e, StreamEvent::Record(_))));
    let summary = stream.summary();
    assert_eq!(summary.state, StreamState::Done);
    assert_eq!(summary.files_read, 1);
    assert_eq!(summary.records_emitted, 0);
}
