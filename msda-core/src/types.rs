use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    BF16,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }
}

/// Problem dimensions of one forward/backward call.
///
/// Produced by [`MsdaDims::infer`] from the input shapes; the
/// kernels trust every field and never re-check buffer lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsdaDims {
    pub batch: usize,
    pub heads: usize,
    pub keys: usize,
    pub embed_dims: usize,
    pub queries: usize,
    pub levels: usize,
    pub points: usize,
}

impl MsdaDims {
    /// `[batch, heads, keys, embed_dims]`
    pub fn value_shape(&self) -> Vec<usize> {
        vec![self.batch, self.heads, self.keys, self.embed_dims]
    }

    /// `[batch, queries, heads, levels, points, 2]`
    pub fn sampling_loc_shape(&self) -> Vec<usize> {
        vec![
            self.batch,
            self.queries,
            self.heads,
            self.levels,
            self.points,
            2,
        ]
    }

    /// `[batch, queries, heads, levels, points]`
    pub fn attn_weight_shape(&self) -> Vec<usize> {
        vec![self.batch, self.queries, self.heads, self.levels, self.points]
    }

    /// `[batch, queries, heads * embed_dims]`
    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.batch, self.queries, self.heads * self.embed_dims]
    }

    /// `[batch, queries, heads, embed_dims]`, the same memory as [`Self::output_shape`].
    pub fn grad_output_shape(&self) -> Vec<usize> {
        vec![self.batch, self.queries, self.heads, self.embed_dims]
    }

    pub fn value_len(&self) -> usize {
        self.batch * self.heads * self.keys * self.embed_dims
    }

    pub fn attn_weight_len(&self) -> usize {
        self.batch * self.queries * self.samples_per_query()
    }

    pub fn sampling_loc_len(&self) -> usize {
        2 * self.attn_weight_len()
    }

    pub fn output_len(&self) -> usize {
        self.batch * self.queries * self.output_per_query()
    }

    /// Number of (head, level, point) samples owned by one query.
    pub fn samples_per_query(&self) -> usize {
        self.heads * self.levels * self.points
    }

    /// Output floats owned by one query.
    pub fn output_per_query(&self) -> usize {
        self.heads * self.embed_dims
    }

    /// Offset of the `embed_dims` vector for `key` in the `[batch, head]` plane of the feature store.
    #[inline]
    pub fn value_offset(&self, batch: usize, head: usize, key: usize) -> usize {
        ((batch * self.heads + head) * self.keys + key) * self.embed_dims
    }

    /// Flat index of one sample in the attention-weight layout. The sampling
    /// location pair for the same sample starts at twice this index.
    #[inline]
    pub fn sample_index(
        &self,
        batch: usize,
        query: usize,
        head: usize,
        level: usize,
        point: usize,
    ) -> usize {
        (((batch * self.queries + query) * self.heads + head) * self.levels + level) * self.points
            + point
    }
}

/// The three gradients produced by a backward call.
#[derive(Debug, Clone)]
pub struct MsdaGrads<T> {
    /// `[batch, heads, keys, embed_dims]`
    pub grad_value: T,
    /// `[batch, queries, heads, levels, points, 2]`
    pub grad_sampling_loc: T,
    /// `[batch, queries, heads, levels, points]`
    pub grad_attn_weight: T,
}
