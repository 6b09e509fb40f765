//! User defaults read from `config.toml` in the data directory.
//!
//! ```toml
//! interpolation = "hermite3"   # or "linear"
//! kernel = "portable"          # or "fma"
//!
//! [downsampling]
//! enabled = true
//! max_dense_intervals = 10000
//! tolerance = 10.0             # metres
//! ```
//!
//! Every key is optional; a missing file means all defaults.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use traj_core::{
    DEFAULT_MAX_DENSE_INTERVALS, DEFAULT_TOLERANCE, DownsamplingParameters, Evaluator, Frame,
    Interpolation, Kernel, SegmentTree,
};

use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub interpolation: Interpolation,
    pub kernel: Kernel,
    pub downsampling: DownsamplingConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownsamplingConfig {
    pub enabled: bool,
    pub max_dense_intervals: usize,
    pub tolerance: f64,
}

impl Default for DownsamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dense_intervals: DEFAULT_MAX_DENSE_INTERVALS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Config {
    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let config = Self::parse(&content, path)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse TOML content. `origin` only labels errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|source| StoreError::Config {
            path: origin.to_path_buf(),
            source,
        })?;
        config.downsampling_parameters()?;
        Ok(config)
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.interpolation, self.kernel)
    }

    /// `None` when downsampling is disabled.
    pub fn downsampling_parameters(&self) -> Result<Option<DownsamplingParameters>> {
        if !self.downsampling.enabled {
            return Ok(None);
        }
        let params = DownsamplingParameters::new(
            self.downsampling.max_dense_intervals,
            self.downsampling.tolerance,
        )?;
        Ok(Some(params))
    }

    /// An empty tree set up with the configured evaluator and downsampling.
    pub fn new_tree<F: Frame>(&self) -> Result<SegmentTree<F>> {
        let mut tree = SegmentTree::new(self.evaluator());
        if let Some(params) = self.downsampling_parameters()? {
            let root = tree.root();
            tree.set_downsampling(root, params)?;
        }
        Ok(tree)
    }
}
