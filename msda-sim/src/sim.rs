//! A single deformable attention layer fitted to a random target by SGD.
//!
//! Parameters live on the host. Each step uploads them, runs forward and
//! backward on the backend, and applies the update on the host.

use msda_core::{Backend, LevelDescriptor, MsdaDims, Result};
use rand::prelude::*;
use tracing::debug;

use crate::config::SimConfig;

pub struct OneLayerSim<B: Backend> {
    backend: B,
    levels: LevelDescriptor,
    dims: MsdaDims,

    value: Vec<f32>,
    sampling_loc: Vec<f32>,
    attn_weight: Vec<f32>,
    target: Vec<f32>,

    output: Vec<f32>,
    grad_output: Vec<f32>,
    grad_value: Vec<f32>,
    grad_sampling_loc: Vec<f32>,
    grad_attn_weight: Vec<f32>,
}

impl<B: Backend> OneLayerSim<B> {
    /// Seeded initialization: value and target in `[-1, 1)`, attention
    /// weights in `[0.1, 1)`, locations in `[0, 1)`.
    pub fn new(backend: B, config: &SimConfig) -> Result<Self> {
        let levels = config.level_descriptor()?;
        let keys = levels.total_cells();
        let value_shape = [config.batch, config.heads, keys, config.embed_dims];
        let attn_shape = [
            config.batch,
            config.queries,
            config.heads,
            config.levels,
            config.points,
        ];
        let loc_shape = [
            config.batch,
            config.queries,
            config.heads,
            config.levels,
            config.points,
            2,
        ];
        let dims = MsdaDims::infer(&value_shape, &levels, &loc_shape, &attn_shape)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let value: Vec<f32> = (0..dims.value_len())
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();
        let attn_weight: Vec<f32> = (0..dims.attn_weight_len())
            .map(|_| rng.gen_range(0.1f32..1.0))
            .collect();
        let sampling_loc: Vec<f32> = (0..dims.sampling_loc_len())
            .map(|_| rng.gen_range(0.0f32..1.0))
            .collect();
        let target: Vec<f32> = (0..dims.output_len())
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();

        debug!(?dims, seed = config.seed, backend = backend.name(), "sim initialized");

        Ok(Self {
            backend,
            levels,
            dims,
            value,
            sampling_loc,
            attn_weight,
            target,
            output: vec![0.0; dims.output_len()],
            grad_output: vec![0.0; dims.output_len()],
            grad_value: vec![0.0; dims.value_len()],
            grad_sampling_loc: vec![0.0; dims.sampling_loc_len()],
            grad_attn_weight: vec![0.0; dims.attn_weight_len()],
        })
    }

    pub fn dims(&self) -> &MsdaDims {
        &self.dims
    }

    pub fn value(&self) -> &[f32] {
        &self.value
    }

    pub fn sampling_loc(&self) -> &[f32] {
        &self.sampling_loc
    }

    pub fn attn_weight(&self) -> &[f32] {
        &self.attn_weight
    }

    /// Output of the most recent [`Self::forward`].
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    pub fn grad_value(&self) -> &[f32] {
        &self.grad_value
    }

    pub fn grad_sampling_loc(&self) -> &[f32] {
        &self.grad_sampling_loc
    }

    pub fn grad_attn_weight(&self) -> &[f32] {
        &self.grad_attn_weight
    }

    fn upload_inputs(&self) -> Result<(B::Tensor, B::Tensor, B::Tensor)> {
        let value = self
            .backend
            .copy_from_host_f32(&self.value, &self.dims.value_shape())?;
        let sampling_loc = self
            .backend
            .copy_from_host_f32(&self.sampling_loc, &self.dims.sampling_loc_shape())?;
        let attn_weight = self
            .backend
            .copy_from_host_f32(&self.attn_weight, &self.dims.attn_weight_shape())?;
        Ok((value, sampling_loc, attn_weight))
    }

    pub fn forward(&mut self) -> Result<&[f32]> {
        let (value, sampling_loc, attn_weight) = self.upload_inputs()?;
        let output = self
            .backend
            .msda_forward(&value, &self.levels, &sampling_loc, &attn_weight)?;
        self.backend.synchronize()?;
        self.output = self.backend.copy_to_host_f32(&output)?;
        Ok(&self.output)
    }

    /// Mean squared error of the last output against the target. Also sets
    /// the upstream gradient to `2 (output - target) / n`.
    pub fn gradient(&mut self) -> f32 {
        let n = self.output.len() as f32;
        let mut loss = 0.0f64;
        for ((g, &o), &t) in self
            .grad_output
            .iter_mut()
            .zip(&self.output)
            .zip(&self.target)
        {
            let diff = o - t;
            loss += (diff as f64) * (diff as f64);
            *g = 2.0 * diff / n;
        }
        (loss / self.output.len().max(1) as f64) as f32
    }

    pub fn backward(&mut self) -> Result<()> {
        let (value, sampling_loc, attn_weight) = self.upload_inputs()?;
        let grad_output = self
            .backend
            .copy_from_host_f32(&self.grad_output, &self.dims.grad_output_shape())?;
        let grads = self.backend.msda_backward(
            &value,
            &self.levels,
            &sampling_loc,
            &attn_weight,
            &grad_output,
        )?;
        self.backend.synchronize()?;
        self.grad_value = self.backend.copy_to_host_f32(&grads.grad_value)?;
        self.grad_sampling_loc = self.backend.copy_to_host_f32(&grads.grad_sampling_loc)?;
        self.grad_attn_weight = self.backend.copy_to_host_f32(&grads.grad_attn_weight)?;
        Ok(())
    }

    /// Plain SGD on every parameter with the gradients of the last backward.
    pub fn update(&mut self, lr: f32) {
        sgd(&mut self.value, &self.grad_value, lr);
        sgd(&mut self.sampling_loc, &self.grad_sampling_loc, lr);
        sgd(&mut self.attn_weight, &self.grad_attn_weight, lr);
    }

    /// One forward, gradient, backward, update round. Returns the loss
    /// measured before the update.
    pub fn step(&mut self, lr: f32) -> Result<f32> {
        self.forward()?;
        let loss = self.gradient();
        self.backward()?;
        self.update(lr);
        Ok(loss)
    }
}

fn sgd(param: &mut [f32], grad: &[f32], lr: f32) {
    for (p, g) in param.iter_mut().zip(grad) {
        *p -= lr * g;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msda_backend_cpu::CpuBackend;

    fn small_config() -> SimConfig {
        SimConfig {
            height: 4,
            width: 4,
            embed_dims: 2,
            queries: 3,
            points: 2,
            ..SimConfig::default()
        }
    }

    #[test]
    fn gradient_is_scaled_residual() {
        let mut sim = OneLayerSim::new(CpuBackend::new(), &small_config()).unwrap();
        sim.forward().unwrap();
        let loss = sim.gradient();

        let n = sim.output.len() as f32;
        let mut expected = 0.0f32;
        for i in 0..sim.output.len() {
            let diff = sim.output[i] - sim.target[i];
            expected += diff * diff;
            assert_eq!(sim.grad_output[i], 2.0 * diff / n);
        }
        assert!((loss - expected / n).abs() < 1e-5);
    }

    #[test]
    fn zero_learning_rate_keeps_parameters() {
        let mut sim = OneLayerSim::new(CpuBackend::new(), &small_config()).unwrap();
        let before = (
            sim.value().to_vec(),
            sim.sampling_loc().to_vec(),
            sim.attn_weight().to_vec(),
        );
        sim.step(0.0).unwrap();
        assert_eq!(sim.value(), &before.0[..]);
        assert_eq!(sim.sampling_loc(), &before.1[..]);
        assert_eq!(sim.attn_weight(), &before.2[..]);
        assert!(sim.grad_value().iter().any(|&g| g != 0.0));
    }

    #[test]
    fn seed_fixes_initial_state() {
        let a = OneLayerSim::new(CpuBackend::new(), &small_config()).unwrap();
        let b = OneLayerSim::new(CpuBackend::new(), &small_config()).unwrap();
        assert_eq!(a.value(), b.value());
        assert_eq!(a.sampling_loc(), b.sampling_loc());
        assert!(a.sampling_loc().iter().all(|&x| (0.0..1.0).contains(&x)));
        assert!(a.attn_weight().iter().all(|&x| (0.1..1.0).contains(&x)));
    }
}
