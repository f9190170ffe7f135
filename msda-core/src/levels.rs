//! Multi-level feature index.
//!
//! The feature store concatenates every level's `height × width` grid along
//! the key axis. A [`LevelDescriptor`] maps `(level, row, col)` to a key
//! index, and refuses cells that fall outside the level's grid.

use crate::{MsdaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub height: usize,
    pub width: usize,
    /// First key index of this level in the feature store.
    pub start: usize,
}

impl Level {
    pub fn cells(&self) -> usize {
        self.height * self.width
    }

    /// Key index of cell `(row, col)`, or `None` when the cell is off the grid.
    #[inline]
    pub fn cell_key(&self, row: i64, col: i64) -> Option<usize> {
        if row < 0 || col < 0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if row >= self.height || col >= self.width {
            return None;
        }
        Some(self.start + row * self.width + col)
    }
}

/// Per-level spatial shapes and start offsets. Immutable for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDescriptor {
    levels: Vec<Level>,
}

impl LevelDescriptor {
    /// Build from `(height, width)` pairs and matching level start offsets.
    pub fn new(shapes: &[(usize, usize)], starts: &[usize]) -> Result<Self> {
        if shapes.len() != starts.len() {
            return Err(MsdaError::ShapeMismatch {
                name: "level_start_index",
                expected: vec![shapes.len()],
                got: vec![starts.len()],
            });
        }
        let levels = shapes
            .iter()
            .zip(starts)
            .map(|(&(height, width), &start)| Level {
                height,
                width,
                start,
            })
            .collect();
        Ok(Self { levels })
    }

    /// Build from shapes alone, packing the levels back to back in order.
    pub fn contiguous(shapes: &[(usize, usize)]) -> Self {
        let mut start = 0;
        let levels = shapes
            .iter()
            .map(|&(height, width)| {
                let level = Level {
                    height,
                    width,
                    start,
                };
                start += height * width;
                level
            })
            .collect();
        Self { levels }
    }

    /// Build from the raw int32 tensors: `spatial_shapes` is `[levels, 2]`
    /// holding `(height, width)` rows, `level_start_index` is `[levels]`.
    pub fn from_raw(spatial_shapes: &[i32], level_start_index: &[i32]) -> Result<Self> {
        if spatial_shapes.len() != 2 * level_start_index.len() {
            return Err(MsdaError::ShapeMismatch {
                name: "spatial_shapes",
                expected: vec![level_start_index.len(), 2],
                got: vec![spatial_shapes.len()],
            });
        }
        let to_usize = |v: i32, what: &str| -> Result<usize> {
            usize::try_from(v)
                .map_err(|_| MsdaError::InvalidArgument(format!("negative {what}: {v}")))
        };
        let mut shapes = Vec::with_capacity(level_start_index.len());
        for hw in spatial_shapes.chunks_exact(2) {
            shapes.push((to_usize(hw[0], "level height")?, to_usize(hw[1], "level width")?));
        }
        let starts = level_start_index
            .iter()
            .map(|&s| to_usize(s, "level start"))
            .collect::<Result<Vec<_>>>()?;
        Self::new(&shapes, &starts)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[inline]
    pub fn level(&self, index: usize) -> &Level {
        &self.levels[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    /// Sum of `height * width` over all levels.
    pub fn total_cells(&self) -> usize {
        self.levels.iter().map(Level::cells).sum()
    }

    /// Checks that the levels are ordered and disjoint, that every level lies
    /// inside a store of `keys` keys, and that together they cover exactly
    /// `keys` cells.
    pub fn check_keys(&self, keys: usize) -> Result<()> {
        let mut previous_end = 0;
        for (index, level) in self.levels.iter().enumerate() {
            if level.start < previous_end {
                return Err(MsdaError::LevelOverlap {
                    level: index,
                    start: level.start,
                    previous_end,
                });
            }
            let end = level.start + level.cells();
            if end > keys {
                return Err(MsdaError::LevelOutOfRange {
                    level: index,
                    start: level.start,
                    end,
                    keys,
                });
            }
            previous_end = end;
        }
        let covered = self.total_cells();
        if covered != keys {
            return Err(MsdaError::KeyCountMismatch { covered, keys });
        }
        Ok(())
    }
}
