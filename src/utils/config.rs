use crate::csv_processor::dialect::Dialect;
use crate::csv_processor::record::ColumnSchema;
use crate::state::cursor::ReplicationCursor;
use crate::utils::errors::{Result, TapError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level tap configuration, read from TOML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TapConfig {
    /// Default file or directory for entities without their own `path`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Entity definitions. Takes precedence over `csv_files_definition`.
    #[serde(default)]
    pub files: Option<Vec<EntityConfig>>,
    /// JSON file holding an array of entity definitions.
    #[serde(default)]
    pub csv_files_definition: Option<PathBuf>,
    /// Where bookmarks are kept between runs.
    #[serde(default = "default_state_db")]
    pub state_db: PathBuf,
    /// Emit a checkpoint after this many records, in addition to one per file.
    #[serde(default = "default_checkpoint_every_rows")]
    pub checkpoint_every_rows: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One logical extraction target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub entity: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Case-insensitive file name prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    /// `"<filename>:<row_number>"`; rows up to and including it are skipped.
    #[serde(default)]
    pub start_from: Option<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
    /// `excel`, `excel-tab` or `unix`.
    #[serde(default)]
    pub dialect: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub quotechar: Option<String>,
    /// Column names for files without a header row.
    #[serde(default)]
    pub header: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn default_state_db() -> PathBuf {
    PathBuf::from("./data/bookmarks.redb")
}

fn default_checkpoint_every_rows() -> u64 {
    10_000
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            path: None,
            files: None,
            csv_files_definition: None,
            state_db: default_state_db(),
            checkpoint_every_rows: default_checkpoint_every_rows(),
            logging: LoggingConfig::default(),
        }
    }
}

/// An entity with every default applied and every option validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub name: String,
    pub path: PathBuf,
    pub prefix: Option<String>,
    pub keys: Vec<String>,
    pub start_from: Option<ReplicationCursor>,
    pub dialect: Dialect,
    pub header: Option<ColumnSchema>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl TapConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TapError::ConfigError(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| TapError::ConfigError(e.to_string()))
    }

    /// `.json` files are read as JSON, anything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapError::ConfigError(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    fn entity_configs(&self) -> Result<Vec<EntityConfig>> {
        if let Some(files) = &self.files {
            if self.csv_files_definition.is_some() {
                tracing::warn!("Both files and csv_files_definition are set; using files");
            }
            return Ok(files.clone());
        }

        match &self.csv_files_definition {
            Some(definition) => {
                if !definition.is_file() {
                    return Err(TapError::ConfigError(format!(
                        "'{}' file not found",
                        definition.display()
                    )));
                }
                let content = std::fs::read_to_string(definition)?;
                serde_json::from_str(&content).map_err(|e| {
                    TapError::ConfigError(format!("{}: {}", definition.display(), e))
                })
            }
            None => Ok(Vec::new()),
        }
    }

    /// Validates every entity and applies the global path fallback once.
    pub fn resolve(&self) -> Result<Vec<ResolvedEntity>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for config in self.entity_configs()? {
            if config.entity.is_empty() {
                return Err(TapError::ConfigError("entity name is empty".to_string()));
            }
            if !seen.insert(config.entity.clone()) {
                return Err(TapError::DuplicateEntity(config.entity));
            }
            resolved.push(self.resolve_entity(config)?);
        }

        Ok(resolved)
    }

    fn resolve_entity(&self, config: EntityConfig) -> Result<ResolvedEntity> {
        let path = config
            .path
            .clone()
            .or_else(|| self.path.clone())
            .ok_or_else(|| {
                TapError::ConfigError(format!(
                    "No global path and no file path defined for entity '{}'",
                    config.entity
                ))
            })?;

        let dialect = Dialect::resolve(
            non_empty(&config.delimiter),
            non_empty(&config.dialect),
            non_empty(&config.quotechar),
            non_empty(&config.encoding),
        )?;

        let start_from = non_empty(&config.start_from)
            .map(str::parse::<ReplicationCursor>)
            .transpose()?;

        let header = match config.header {
            Some(columns) if !columns.is_empty() => Some(ColumnSchema::new(columns)?),
            _ => None,
        };

        let mut unique_keys = HashSet::new();
        for key in &config.keys {
            if !unique_keys.insert(key.as_str()) {
                return Err(TapError::ConfigError(format!(
                    "key '{}' listed twice for entity '{}'",
                    key, config.entity
                )));
            }
            if let Some(h) = &header {
                if h.position(key).is_none() {
                    tracing::warn!(entity = %config.entity, key = %key, "Key is not a header column");
                }
            }
        }

        Ok(ResolvedEntity {
            name: config.entity,
            path,
            prefix: non_empty(&config.prefix).map(str::to_string),
            keys: config.keys,
            start_from,
            dialect,
            header,
        })
    }
}
