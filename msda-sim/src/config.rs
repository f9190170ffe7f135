use std::path::Path;

use msda_core::{KernelConfig, LevelDescriptor, MsdaError, Result};
use serde::{Deserialize, Serialize};

/// Problem size and training schedule of the simulation. Every field is
/// optional in JSON; missing ones take the [`Default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub batch: usize,
    pub heads: usize,
    /// Height of the finest level.
    pub height: usize,
    /// Width of the finest level.
    pub width: usize,
    pub embed_dims: usize,
    pub queries: usize,
    /// Each level after the first halves both sides of the previous one.
    pub levels: usize,
    pub points: usize,
    pub epochs: usize,
    pub lr: f32,
    pub seed: u64,
    pub kernel: KernelConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            batch: 1,
            heads: 1,
            height: 8,
            width: 8,
            embed_dims: 8,
            queries: 32,
            levels: 1,
            points: 4,
            epochs: 5,
            lr: 0.01,
            seed: 102,
            kernel: KernelConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The level pyramid, packed back to back on the key axis.
    pub fn level_descriptor(&self) -> Result<LevelDescriptor> {
        if self.height == 0 || self.width == 0 {
            return Err(MsdaError::InvalidArgument(format!(
                "feature map must be non-empty, got {}x{}",
                self.height, self.width
            )));
        }
        let shapes: Vec<(usize, usize)> = (0..self.levels)
            .map(|level| {
                (
                    (self.height >> level).max(1),
                    (self.width >> level).max(1),
                )
            })
            .collect();
        Ok(LevelDescriptor::contiguous(&shapes))
    }
}
