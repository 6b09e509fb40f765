use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, Config};
use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DATABASE_FILE: &str = "trajectories.db";

/// Default base directory for all traj storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".traj")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// A data directory: the trajectory database plus the user's config.
///
/// Layout:
/// ```text
/// ~/.traj/
/// ├── config.toml       (optional)
/// └── trajectories.db
/// ```
pub struct DataDir {
    base: PathBuf,
    store: Store,
    config: Config,
}

impl DataDir {
    /// Open the store and config under `base_dir`, creating the directory
    /// as needed. `None` means [`default_base_dir`].
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        fs::create_dir_all(&base).map_err(|e| StoreError::io(&base, e))?;

        let config = Config::load(&base.join(CONFIG_FILE))?;
        let store = Store::open(&base.join(DATABASE_FILE))?;
        Ok(Self {
            base,
            store,
            config,
        })
    }

    /// In-memory store with default config (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            base: PathBuf::from(":memory:"),
            store: Store::open_in_memory()?,
            config: Config::default(),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traj_core::{Kernel, SegmentTree, World};

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("data");
        let data = DataDir::open(Some(&base)).unwrap();
        assert!(base.join(DATABASE_FILE).exists());
        assert_eq!(data.base(), base.as_path());
        assert_eq!(data.config(), &Config::default());
    }

    #[test]
    fn test_open_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "kernel = \"fma\"\n").unwrap();
        let data = DataDir::open(Some(dir.path())).unwrap();
        assert_eq!(data.config().kernel, Kernel::Fma);
    }

    #[test]
    fn test_bad_config_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "kernel = 3\n").unwrap();
        assert!(DataDir::open(Some(dir.path())).is_err());
    }

    #[test]
    fn test_reopen_sees_saved_trees() {
        let dir = tempfile::tempdir().unwrap();
        {
            let data = DataDir::open(Some(dir.path())).unwrap();
            let tree: SegmentTree<World> = data.config().new_tree().unwrap();
            data.store().save_tree("empty", &tree).unwrap();
        }
        let data = DataDir::open(Some(dir.path())).unwrap();
        assert!(data.store().contains("empty").unwrap());
    }
}
