use std::fs;
use std::path::Path;

use traj_core::{Frame, SegmentTree, export_json, import_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import a JSON export file under `name`, replacing any tree stored
    /// there. The file is validated in full before anything is written.
    pub fn import_json_file<F: Frame>(&self, name: &str, path: &Path) -> Result<SegmentTree<F>> {
        let json = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        self.import_json_str(name, &json)
    }

    pub fn import_json_str<F: Frame>(&self, name: &str, json: &str) -> Result<SegmentTree<F>> {
        let tree = import_json(json)?;
        self.save_tree(name, &tree)?;
        Ok(tree)
    }

    /// Export the tree stored under `name` to a JSON file.
    pub fn export_json_file<F: Frame>(&self, name: &str, path: &Path) -> Result<()> {
        let json = self.export_json_string::<F>(name)?;
        fs::write(path, json).map_err(|e| StoreError::io(path, e))
    }

    pub fn export_json_string<F: Frame>(&self, name: &str) -> Result<String> {
        let tree: SegmentTree<F> = self.load_tree(name)?;
        Ok(export_json(&tree)?)
    }
}
