use crate::csv_processor::record::format_position;
use crate::utils::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// High-water mark `(file, row)`. Ordered by file name bytes, then row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicationCursor {
    pub file_name: String,
    pub row_number: u64,
}

impl ReplicationCursor {
    pub fn new(file_name: impl Into<String>, row_number: u64) -> Self {
        Self {
            file_name: file_name.into(),
            row_number,
        }
    }

    /// Where `(file, row)` sits relative to this cursor.
    pub fn compare_position(&self, file: &str, row: u64) -> Ordering {
        file.as_bytes()
            .cmp(self.file_name.as_bytes())
            .then(row.cmp(&self.row_number))
    }
}

impl fmt::Display for ReplicationCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_position(&self.file_name, self.row_number))
    }
}

impl FromStr for ReplicationCursor {
    type Err = TapError;

    /// Parses `"<file>:<row>"`. The last colon splits, so file names may contain colons.
    fn from_str(value: &str) -> Result<Self> {
        let invalid = |reason: &str| TapError::InvalidCursor {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (file, row) = value
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected <filename>:<row_number>"))?;
        if file.is_empty() {
            return Err(invalid("file name is empty"));
        }
        if row.is_empty() || !row.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("row number must be a base-10 integer"));
        }
        let row_number = row
            .parse::<u64>()
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self::new(file, row_number))
    }
}

/// How much of a file an entity's cursor already covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCoverage {
    /// The whole file precedes the cursor.
    Synced,
    /// Rows up to and including this one were emitted before.
    ResumeAfter(u64),
    /// Nothing in the file has been emitted.
    Unread,
}

/// Resume positions per entity. An entity with no entry sits before every position.
#[derive(Debug, Default)]
pub struct CursorTracker {
    positions: HashMap<String, ReplicationCursor>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entity's starting position; `None` leaves it at the start.
    pub fn resume_from(&mut self, entity: &str, cursor: Option<ReplicationCursor>) {
        match cursor {
            Some(c) => {
                self.positions.insert(entity.to_string(), c);
            }
            None => {
                self.positions.remove(entity);
            }
        }
    }

    pub fn position(&self, entity: &str) -> Option<&ReplicationCursor> {
        self.positions.get(entity)
    }

    /// True when `(file, row)` is at or before the entity's cursor.
    pub fn should_skip(&self, entity: &str, file: &str, row: u64) -> bool {
        self.positions
            .get(entity)
            .is_some_and(|c| c.compare_position(file, row) != Ordering::Greater)
    }

    /// Moves the cursor forward. Returns false (and changes nothing) for positions
    /// at or before the current one.
    pub fn advance(&mut self, entity: &str, file: &str, row: u64) -> bool {
        match self.positions.get_mut(entity) {
            Some(current) => {
                if current.compare_position(file, row) != Ordering::Greater {
                    return false;
                }
                if current.file_name != file {
                    current.file_name = file.to_string();
                }
                current.row_number = row;
                true
            }
            None => {
                self.positions
                    .insert(entity.to_string(), ReplicationCursor::new(file, row));
                true
            }
        }
    }

    pub fn coverage(&self, entity: &str, file: &str) -> FileCoverage {
        match self.positions.get(entity) {
            None => FileCoverage::Unread,
            Some(c) => match file.as_bytes().cmp(c.file_name.as_bytes()) {
                Ordering::Less => FileCoverage::Synced,
                Ordering::Equal => FileCoverage::ResumeAfter(c.row_number),
                Ordering::Greater => FileCoverage::Unread,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_from() {
        let cursor: ReplicationCursor = "data.csv:3".parse().unwrap();
        assert_eq!(cursor, ReplicationCursor::new("data.csv", 3));

        let padded: ReplicationCursor = "alphabet.csv:000000012".parse().unwrap();
        assert_eq!(padded.row_number, 12);

        let colon: ReplicationCursor = "2024-01-01T00:00.csv:7".parse().unwrap();
        assert_eq!(colon.file_name, "2024-01-01T00:00.csv");
    }

    #[test]
    fn rejects_malformed_start_from() {
        for bad in ["data.csv", ":3", "data.csv:", "data.csv:-1", "data.csv:+3", "data.csv:x"] {
            assert!(
                matches!(bad.parse::<ReplicationCursor>(), Err(TapError::InvalidCursor { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn displays_zero_padded() {
        assert_eq!(ReplicationCursor::new("a.csv", 4).to_string(), "a.csv:000000004");
    }

    #[test]
    fn orders_by_file_bytes_then_row() {
        let upper = ReplicationCursor::new("C.csv", 100);
        let lower = ReplicationCursor::new("a.csv", 1);
        assert!(upper < lower);
        assert!(ReplicationCursor::new("a.csv", 2) < ReplicationCursor::new("a.csv", 10));
    }

    #[test]
    fn should_skip_is_inclusive() {
        let mut tracker = CursorTracker::new();
        tracker.resume_from("e", Some(ReplicationCursor::new("data.csv", 3)));

        assert!(tracker.should_skip("e", "data.csv", 1));
        assert!(tracker.should_skip("e", "data.csv", 3));
        assert!(!tracker.should_skip("e", "data.csv", 4));
        assert!(tracker.should_skip("e", "a.csv", 99));
        assert!(!tracker.should_skip("e", "e.csv", 1));
        assert!(!tracker.should_skip("other", "a.csv", 1));
    }

    #[test]
    fn advance_is_monotonic() {
        let mut tracker = CursorTracker::new();
        assert!(tracker.advance("e", "b.csv", 5));
        assert!(!tracker.advance("e", "b.csv", 4));
        assert!(!tracker.advance("e", "a.csv", 50));
        assert!(!tracker.advance("e", "b.csv", 5));
        assert_eq!(tracker.position("e"), Some(&ReplicationCursor::new("b.csv", 5)));

        assert!(tracker.advance("e", "c.csv", 2));
        assert_eq!(tracker.position("e"), Some(&ReplicationCursor::new("c.csv", 2)));
    }

    #[test]
    fn coverage_by_file() {
        let mut tracker = CursorTracker::new();
        assert_eq!(tracker.coverage("e", "a.csv"), FileCoverage::Unread);

        tracker.resume_from("e", Some(ReplicationCursor::new("b.csv", 7)));
        assert_eq!(tracker.coverage("e", "a.csv"), FileCoverage::Synced);
        assert_eq!(tracker.coverage("e", "b.csv"), FileCoverage::ResumeAfter(7));
        assert_eq!(tracker.coverage("e", "c.csv"), FileCoverage::Unread);
    }
}
