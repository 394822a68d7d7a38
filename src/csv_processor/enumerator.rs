use crate::utils::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One candidate source file, identified by its bare file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
}

/// Lists the files behind an entity path in cursor order.
///
/// A file path yields itself. A directory yields its immediate regular files
/// whose name starts with `prefix`, compared case-insensitively, sorted by
/// name in plain byte order so that `"C.csv" < "a.csv"` on every platform.
/// A missing path yields nothing.
pub fn enumerate_files(path: &Path, prefix: Option<&str>) -> Result<Vec<SourceFile>> {
    if !path.exists() {
        warn!(path = %path.display(), "Path does not exist");
        return Ok(Vec::new());
    }

    if !path.is_dir() {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => {
                warn!(path = %path.display(), "Skipping file with a non UTF-8 name");
                return Ok(Vec::new());
            }
        };
        return Ok(vec![SourceFile {
            name,
            path: path.to_path_buf(),
        }]);
    }

    let prefix = prefix.unwrap_or("").to_lowercase();
    let mut files = Vec::new();

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(raw) => {
                warn!(name = ?raw, "Skipping file with a non UTF-8 name");
                continue;
            }
        };

        if !name.to_lowercase().starts_with(&prefix) {
            continue;
        }

        let entry_path = entry.path();
        match std::fs::metadata(&entry_path) {
            Ok(metadata) if metadata.is_file() => files.push(SourceFile {
                name,
                path: entry_path,
            }),
            Ok(_) => {}
            Err(e) => {
                warn!(path = %entry_path.display(), error = %e, "Cannot stat directory entry");
            }
        }
    }

    files.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    debug!(path = %path.display(), count = files.len(), "Enumerated source files");

    Ok(files)
}
