use crate::DType;

/// A dense, row-major tensor owned by a [`Backend`](crate::Backend).
pub trait Tensor: Clone + Send + Sync + std::fmt::Debug {
    fn shape(&self) -> &[usize];
    fn dtype(&self) -> DType;

    fn rank(&self) -> usize {
        self.shape().len()
    }

    fn numel(&self) -> usize {
        self.shape().iter().product()
    }

    fn size_bytes(&self) -> usize {
        self.numel() * self.dtype().size_in_bytes()
    }
}
