//! File-backed storage of UA pages.
//!
//! Each page lives in `{dir}/{name}.json`. `index.json` in the same directory
//! lists every page and is rewritten after each save or delete. Nothing is
//! cached; every read goes to disk.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::fs;
use tracing::{error, info};

use crate::{
    models::{GlobalQueries, StoredQuery, UaIndex, UaPage},
    DashboardError, Result,
};

const INDEX_FILE: &str = "index.json";
const PAGE_NOT_FOUND: &str = "Page UA not found";

#[derive(Debug, Clone)]
pub struct PageStore {
    dir: PathBuf,
}

impl PageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        if fs::metadata(&self.dir).await.is_err() {
            fs::create_dir_all(&self.dir).await?;
            info!("Created UA pages directory {}", self.dir.display());
        }
        Ok(())
    }

    fn page_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.json", name)))
    }

    /// Names of every stored page, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name == INDEX_FILE {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn get(&self, name: &str) -> Result<UaPage> {
        Ok(serde_json::from_value(self.get_raw(name).await?)?)
    }

    /// The page file exactly as stored, including fields `UaPage` does not model.
    pub async fn get_raw(&self, name: &str) -> Result<Value> {
        let path = self.page_path(name)?;
        let content = fs::read_to_string(&path).await.map_err(not_found_or_io)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the page, replacing any previous version, and refreshes the index.
    pub async fn save(&self, name: &str, page: &UaPage) -> Result<()> {
        let path = self.page_path(name)?;
        if page.title.is_empty() || page.content.is_empty() {
            return Err(DashboardError::Validation(
                "title and content are required".to_string(),
            ));
        }

        let body = serde_json::to_string_pretty(page)?;
        fs::write(&path, body).await?;
        self.update_index().await;

        info!("Page {} saved", name);
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.page_path(name)?;
        fs::remove_file(&path).await.map_err(not_found_or_io)?;
        self.update_index().await;

        info!("Page {} deleted", name);
        Ok(())
    }

    /// Reads the index, regenerating it first when it does not exist yet.
    pub async fn read_index(&self) -> Result<UaIndex> {
        let path = self.dir.join(INDEX_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => self.write_index().await,
            Err(e) => Err(e.into()),
        }
    }

    /// Regenerates the index. Failures are logged and otherwise ignored so
    /// the page write that triggered the refresh still succeeds.
    pub async fn update_index(&self) {
        if let Err(e) = self.write_index().await {
            error!("Failed to update UA index: {}", e);
        }
    }

    async fn write_index(&self) -> Result<UaIndex> {
        let index = UaIndex {
            uas: self.list().await?,
            last_update: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let body = serde_json::to_string_pretty(&index)?;
        fs::write(self.dir.join(INDEX_FILE), body).await?;
        Ok(index)
    }
}

/// Reads the `queries` array of the global dashboard config.
pub async fn read_global_queries(path: &Path) -> Result<Vec<StoredQuery>> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        DashboardError::Io(format!("cannot read {}: {}", path.display(), e))
    })?;
    let config: GlobalQueries = serde_json::from_str(&content)?;
    Ok(config.queries)
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "index"
        || name == "."
        || name.contains("..")
        || name.contains(|c| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(DashboardError::Validation(format!("invalid page name: {:?}", name)));
    }
    Ok(())
}

fn not_found_or_io(err: std::io::Error) -> DashboardError {
    if err.kind() == ErrorKind::NotFound {
        DashboardError::NotFound(PAGE_NOT_FOUND.to_string())
    } else {
        err.into()
    }
}
