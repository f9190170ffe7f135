use crate::{Level, MsdaDims};

/// Read-only view of a `[batch, heads, keys, embed_dims]` feature store.
#[derive(Debug, Clone, Copy)]
pub struct FeatureView<'a> {
    data: &'a [f32],
    dims: MsdaDims,
}

impl<'a> FeatureView<'a> {
    /// `data` must hold `dims.value_len()` floats; callers validate first.
    pub fn new(data: &'a [f32], dims: MsdaDims) -> Self {
        debug_assert_eq!(data.len(), dims.value_len());
        Self { data, dims }
    }

    /// Offset of the cell's feature vector, or `None` when `(row, col)` is off
    /// the level's grid. The same offset addresses the feature-store gradient.
    #[inline]
    pub fn cell_offset(
        &self,
        batch: usize,
        head: usize,
        level: &Level,
        row: i64,
        col: i64,
    ) -> Option<usize> {
        let key = level.cell_key(row, col)?;
        Some(self.dims.value_offset(batch, head, key))
    }

    /// The cell's `embed_dims` vector, or `None` (read as the zero vector) when
    /// the cell is off the grid. Off-grid cells are never clamped.
    #[inline]
    pub fn sample_or_zero(
        &self,
        batch: usize,
        head: usize,
        level: &Level,
        row: i64,
        col: i64,
    ) -> Option<&'a [f32]> {
        let offset = self.cell_offset(batch, head, level, row, col)?;
        Some(self.vector_at(offset))
    }

    #[inline]
    pub fn vector_at(&self, offset: usize) -> &'a [f32] {
        &self.data[offset..offset + self.dims.embed_dims]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LevelDescriptor;

    #[test]
    fn addresses_level_cells_per_head() {
        let levels = LevelDescriptor::contiguous(&[(2, 2), (1, 2)]);
        let dims = MsdaDims {
            batch: 1,
            heads: 2,
            keys: 6,
            embed_dims: 3,
            queries: 1,
            levels: 2,
            points: 1,
        };
        let data: Vec<f32> = (0..dims.value_len()).map(|i| i as f32).collect();
        let view = FeatureView::new(&data, dims);

        // Head 1, level 1, cell (0, 1) is key 4 + 1 = 5.
        let v = view.sample_or_zero(0, 1, levels.level(1), 0, 1).unwrap();
        let base = dims.value_offset(0, 1, 5);
        assert_eq!(v, &[base as f32, (base + 1) as f32, (base + 2) as f32]);

        assert!(view.sample_or_zero(0, 0, levels.level(1), 1, 0).is_none());
        assert!(view.sample_or_zero(0, 0, levels.level(0), -1, 0).is_none());
    }
}
