use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// How backward accumulates into the shared feature-store gradient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradAccumulation {
    /// Every worker adds straight into the shared buffer with an atomic f32
    /// add. Low bits of the result depend on worker interleaving.
    #[default]
    Atomic,
    /// Every worker accumulates into a private copy; the copies are summed in
    /// worker order afterwards. Bit-reproducible, at the cost of one
    /// feature-store-sized buffer per worker.
    PerWorker,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Worker count. `None` uses the size of the global rayon pool.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub accumulation: GradAccumulation,
}

impl KernelConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
