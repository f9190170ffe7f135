use std::sync::Arc;

use msda_core::{
    Backend, DType, GradAccumulation, KernelConfig, LevelDescriptor, MsdaDims, MsdaError,
    MsdaGrads, Result, Tensor, WorkPartition,
};
use tracing::debug;

use crate::tensor::CpuTensor;
use crate::{backward, forward};

/// CPU backend for multi-scale deformable attention.
///
/// All data lives in host memory as `Vec<f32>` wrapped in `Arc`. The query
/// axis is split statically across `worker_count()` workers, which run as
/// rayon tasks on either the global pool or a dedicated one.
#[derive(Clone)]
pub struct CpuBackend {
    pool: Option<Arc<rayon::ThreadPool>>,
    workers: usize,
    accumulation: GradAccumulation,
}

impl CpuBackend {
    /// One worker per thread of the global rayon pool, atomic accumulation.
    pub fn new() -> Self {
        Self {
            pool: None,
            workers: rayon::current_num_threads(),
            accumulation: GradAccumulation::default(),
        }
    }

    pub fn with_config(config: &KernelConfig) -> Result<Self> {
        let mut backend = match config.workers {
            None => Self::new(),
            Some(0) => {
                return Err(MsdaError::InvalidArgument(
                    "worker count must be at least 1".into(),
                ));
            }
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("msda-worker-{i}"))
                    .build()
                    .map_err(|e| MsdaError::ThreadPool(e.to_string()))?;
                Self {
                    pool: Some(Arc::new(pool)),
                    workers,
                    accumulation: GradAccumulation::default(),
                }
            }
        };
        backend.accumulation = config.accumulation;
        debug!(
            workers = backend.workers,
            accumulation = ?backend.accumulation,
            dedicated_pool = backend.pool.is_some(),
            "cpu backend configured"
        );
        Ok(backend)
    }

    pub fn accumulation(&self) -> GradAccumulation {
        self.accumulation
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn infer_dims(
        value: &CpuTensor,
        levels: &LevelDescriptor,
        sampling_loc: &CpuTensor,
        attn_weight: &CpuTensor,
    ) -> Result<MsdaDims> {
        MsdaDims::infer(
            value.shape(),
            levels,
            sampling_loc.shape(),
            attn_weight.shape(),
        )
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    type Tensor = CpuTensor;

    fn name(&self) -> &str {
        "cpu"
    }

    fn worker_count(&self) -> usize {
        self.workers
    }

    // ── Allocation ──────────────────────────────────────────────

    fn allocate_zeros(&self, shape: &[usize], _dtype: DType) -> Result<CpuTensor> {
        // Kernels compute in f32 only; half-precision requests are stored widened.
        Ok(CpuTensor::zeros(shape))
    }

    // ── Data transfer ───────────────────────────────────────────

    fn copy_from_host_f32(&self, data: &[f32], shape: &[usize]) -> Result<CpuTensor> {
        CpuTensor::from_vec(data.to_vec(), shape)
    }

    fn copy_from_host_f16(&self, data: &[half::f16], shape: &[usize]) -> Result<CpuTensor> {
        CpuTensor::from_vec(data.iter().map(|x| x.to_f32()).collect(), shape)
    }

    fn copy_from_host_bf16(&self, data: &[half::bf16], shape: &[usize]) -> Result<CpuTensor> {
        CpuTensor::from_vec(data.iter().map(|x| x.to_f32()).collect(), shape)
    }

    fn copy_to_host_f32(&self, tensor: &CpuTensor) -> Result<Vec<f32>> {
        Ok(tensor.data().to_vec())
    }

    // ── Synchronization ─────────────────────────────────────────

    fn synchronize(&self) -> Result<()> {
        // Kernels return only after every worker has joined.
        Ok(())
    }

    // ── Deformable attention ────────────────────────────────────

    fn msda_forward(
        &self,
        value: &CpuTensor,
        levels: &LevelDescriptor,
        sampling_loc: &CpuTensor,
        attn_weight: &CpuTensor,
    ) -> Result<CpuTensor> {
        let dims = Self::infer_dims(value, levels, sampling_loc, attn_weight)?;
        let partition = WorkPartition::new(dims.queries, self.workers)?;
        let mut output = vec![0.0f32; dims.output_len()];
        self.install(|| {
            forward::msda_forward(
                &dims,
                levels,
                value.data(),
                sampling_loc.data(),
                attn_weight.data(),
                &mut output,
                &partition,
            )
        })?;
        Ok(CpuTensor::new(output, dims.output_shape()))
    }

    fn msda_backward(
        &self,
        value: &CpuTensor,
        levels: &LevelDescriptor,
        sampling_loc: &CpuTensor,
        attn_weight: &CpuTensor,
        grad_output: &CpuTensor,
    ) -> Result<MsdaGrads<CpuTensor>> {
        let dims = Self::infer_dims(value, levels, sampling_loc, attn_weight)?;
        dims.check_grad_output(grad_output.shape())?;
        let partition = WorkPartition::new(dims.queries, self.workers)?;

        // Zeroed again inside the kernel; the allocation just sizes them.
        let mut grad_value = vec![0.0f32; dims.value_len()];
        let mut grad_sampling_loc = vec![0.0f32; dims.sampling_loc_len()];
        let mut grad_attn_weight = vec![0.0f32; dims.attn_weight_len()];
        self.install(|| {
            backward::msda_backward(
                &dims,
                levels,
                value.data(),
                sampling_loc.data(),
                attn_weight.data(),
                grad_output.data(),
                &mut grad_value,
                &mut grad_sampling_loc,
                &mut grad_attn_weight,
                &partition,
                self.accumulation,
            )
        })?;

        Ok(MsdaGrads {
            grad_value: CpuTensor::new(grad_value, dims.value_shape()),
            grad_sampling_loc: CpuTensor::new(grad_sampling_loc, dims.sampling_loc_shape()),
            grad_attn_weight: CpuTensor::new(grad_attn_weight, dims.attn_weight_shape()),
        })
    }
}
