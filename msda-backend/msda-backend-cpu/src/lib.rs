//! CPU backend for multi-scale deformable attention.

mod accum;
mod backend;
pub mod backward;
pub mod forward;
pub mod tensor;
mod views;

pub use accum::{AtomicGrad, GradSink};
pub use backend::CpuBackend;
pub use backward::msda_backward;
pub use forward::msda_forward;
pub use tensor::CpuTensor;
