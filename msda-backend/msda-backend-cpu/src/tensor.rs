use std::sync::Arc;

use msda_core::{DType, MsdaError, Result, Tensor};

/// Host-resident f32 tensor. Cloning shares the buffer.
#[derive(Clone, Debug)]
pub struct CpuTensor {
    pub(crate) data: Arc<Vec<f32>>,
    pub(crate) shape: Vec<usize>,
}

impl CpuTensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self {
            data: Arc::new(data),
            shape,
        }
    }

    /// Like [`CpuTensor::new`], but rejects a buffer that does not fill `shape`.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(MsdaError::ShapeMismatch {
                name: "host data",
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Self::new(data, shape.to_vec()))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self::new(vec![0.0; numel], shape.to_vec())
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Take the buffer back, copying only if it is still shared.
    pub fn into_vec(self) -> Vec<f32> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Tensor for CpuTensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> DType {
        DType::F32
    }
}
