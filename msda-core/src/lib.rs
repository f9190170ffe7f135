//! MSDA core types, traits, geometry and error definitions.

pub mod backend;
pub mod bilinear;
pub mod config;
pub mod error;
pub mod feature;
pub mod levels;
pub mod partition;
pub mod tensor;
pub mod types;
pub mod validate;

pub use backend::Backend;
pub use bilinear::{Bilinear, Corner};
pub use config::{GradAccumulation, KernelConfig};
pub use error::{MsdaError, Result};
pub use feature::FeatureView;
pub use levels::{Level, LevelDescriptor};
pub use partition::WorkPartition;
pub use tensor::Tensor;
pub use types::*;
