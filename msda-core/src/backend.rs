use crate::tensor::Tensor;
use crate::{DType, LevelDescriptor, MsdaGrads, Result};

pub trait Backend: Send + Sync + 'static {
    type Tensor: Tensor;

    fn name(&self) -> &str;

    /// Number of parallel workers the query axis is split across.
    fn worker_count(&self) -> usize;

    // Allocation
    fn allocate_zeros(&self, shape: &[usize], dtype: DType) -> Result<Self::Tensor>;

    // Data transfer
    fn copy_from_host_f32(&self, data: &[f32], shape: &[usize]) -> Result<Self::Tensor>;
    fn copy_from_host_f16(&self, data: &[half::f16], shape: &[usize]) -> Result<Self::Tensor>;
    fn copy_from_host_bf16(&self, data: &[half::bf16], shape: &[usize]) -> Result<Self::Tensor>;
    fn copy_to_host_f32(&self, tensor: &Self::Tensor) -> Result<Vec<f32>>;

    // Synchronization
    fn synchronize(&self) -> Result<()>;

    /// Multi-scale deformable attention forward.
    ///
    /// `value`: `[batch, heads, keys, embed_dims]`
    /// `sampling_loc`: `[batch, queries, heads, levels, points, 2]`, `(x, y)` in `[0, 1]`
    /// `attn_weight`: `[batch, queries, heads, levels, points]`
    ///
    /// Returns: `[batch, queries, heads * embed_dims]`
    fn msda_forward(
        &self,
        value: &Self::Tensor,
        levels: &LevelDescriptor,
        sampling_loc: &Self::Tensor,
        attn_weight: &Self::Tensor,
    ) -> Result<Self::Tensor>;

    /// Gradients of [`Backend::msda_forward`] given the upstream gradient
    /// `grad_output` (`[batch, queries, heads, embed_dims]` or the flattened
    /// output layout).
    fn msda_backward(
        &self,
        value: &Self::Tensor,
        levels: &LevelDescriptor,
        sampling_loc: &Self::Tensor,
        attn_weight: &Self::Tensor,
        grad_output: &Self::Tensor,
    ) -> Result<MsdaGrads<Self::Tensor>>;

    /// Parse raw int32 level metadata and run the forward pass.
    fn msda_forward_raw_levels(
        &self,
        value: &Self::Tensor,
        spatial_shapes: &[i32],
        level_start_index: &[i32],
        sampling_loc: &Self::Tensor,
        attn_weight: &Self::Tensor,
    ) -> Result<Self::Tensor> {
        let levels = LevelDescriptor::from_raw(spatial_shapes, level_start_index)?;
        self.msda_forward(value, &levels, sampling_loc, attn_weight)
    }

    /// Parse raw int32 level metadata and run the backward pass.
    fn msda_backward_raw_levels(
        &self,
        value: &Self::Tensor,
        spatial_shapes: &[i32],
        level_start_index: &[i32],
        sampling_loc: &Self::Tensor,
        attn_weight: &Self::Tensor,
        grad_output: &Self::Tensor,
    ) -> Result<MsdaGrads<Self::Tensor>> {
        let levels = LevelDescriptor::from_raw(spatial_shapes, level_start_index)?;
        self.msda_backward(value, &levels, sampling_loc, attn_weight, grad_output)
    }
}
