use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::StoreError;

/// On-disk envelope for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Products,
    Favorites,
    Cart,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Favorites => "favorites",
            Table::Cart => "cart",
        }
    }
}

/// Where committed tables go.
#[derive(Debug, Clone)]
pub enum Backing {
    Memory,
    Disk(PathBuf),
}

impl Backing {
    pub fn disk(dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Backing::Disk(dir))
    }

    fn table_path(dir: &Path, table: Table) -> PathBuf {
        dir.join(format!("{}.json", table.name()))
    }

    /// Load a table's rows. Missing or unreadable files yield an empty table.
    pub fn load<T: DeserializeOwned>(&self, table: Table) -> Vec<T> {
        let Backing::Disk(dir) = self else {
            return Vec::new();
        };
        let path = Self::table_path(dir, table);
        match read_json::<CachedData<Vec<T>>>(&path) {
            Ok(Some(cached)) => {
                debug!(table = table.name(), rows = cached.data.len(), "Table loaded");
                cached.data
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(table = table.name(), error = %e, "Failed to load table, starting empty");
                Vec::new()
            }
        }
    }

    /// Commit a table's rows in one atomic replace.
    pub fn commit<T: Serialize>(&self, table: Table, rows: &[T]) -> Result<(), StoreError> {
        let Backing::Disk(dir) = self else {
            return Ok(());
        };
        let path = Self::table_path(dir, table);
        write_json_atomic(&path, &CachedData::new(rows))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Write to a sibling temp file, sync, then rename over the target.
fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    let serialized = serde_json::to_string_pretty(data)?;
    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));

    let written = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}
