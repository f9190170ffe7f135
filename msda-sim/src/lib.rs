//! One-layer training simulation driving the deformable attention kernels.

pub mod config;
pub mod sim;

pub use config::SimConfig;
pub use sim::OneLayerSim;
