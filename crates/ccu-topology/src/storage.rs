//! Layout persistence.

use ccu_core::{Error, Result};
use std::path::{Path, PathBuf};

use crate::layout::Layout;

/// Where the layout lives between restarts.
pub trait LayoutStore: Send + Sync {
    /// Load the stored layout. `Error::NotFound` when nothing is stored.
    fn load(&self) -> Result<Layout>;

    fn save(&self, layout: &Layout) -> Result<()>;
}

/// Layout stored as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileLayoutStore {
    path: PathBuf,
}

impl JsonFileLayoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LayoutStore for JsonFileLayoutStore {
    fn load(&self) -> Result<Layout> {
        if !self.path.exists() {
            return Err(Error::NotFound(format!(
                "layout file {}",
                self.path.display()
            )));
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Storage(format!("read {}: {}", self.path.display(), e)))?;
        Layout::from_json(&json)
    }

    fn save(&self, layout: &Layout) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = layout.to_json()?;

        // Write then rename; readers never see a partial file
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)
            .map_err(|e| Error::Storage(format!("write {}: {}", temp_path.display(), e)))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::Storage(format!("rename to {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}
