//! Trains one deformable attention layer toward a random target and logs the
//! loss per epoch.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use msda_backend_cpu::CpuBackend;
use msda_core::{Backend, GradAccumulation};
use msda_sim::{OneLayerSim, SimConfig};

const PREVIEW_LEN: usize = 8;

#[derive(Clone, Copy, ValueEnum)]
enum Accumulation {
    Atomic,
    PerWorker,
}

impl From<Accumulation> for GradAccumulation {
    fn from(mode: Accumulation) -> Self {
        match mode {
            Accumulation::Atomic => GradAccumulation::Atomic,
            Accumulation::PerWorker => GradAccumulation::PerWorker,
        }
    }
}

#[derive(Parser)]
#[command(name = "msda-sim", about = "One-layer deformable attention training simulation")]
struct Cli {
    /// JSON file with a simulation config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// SGD learning rate
    #[arg(long)]
    lr: Option<f32>,

    /// Seed for parameter and target initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Worker count for the kernels (default: one per rayon thread)
    #[arg(long)]
    workers: Option<usize>,

    /// How backward accumulates the feature-store gradient
    #[arg(long, value_enum)]
    accumulation: Option<Accumulation>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(lr) = self.lr {
            config.lr = lr;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(workers) = self.workers {
            config.kernel.workers = Some(workers);
        }
        if let Some(mode) = self.accumulation {
            config.kernel.accumulation = mode.into();
        }
        Ok(config)
    }
}

fn preview(data: &[f32]) -> String {
    let head: Vec<String> = data
        .iter()
        .take(PREVIEW_LEN)
        .map(|x| format!("{x:.4}"))
        .collect();
    let more = if data.len() > PREVIEW_LEN { ", ..." } else { "" };
    format!("[{}{more}] ({} values)", head.join(", "), data.len())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Cli::parse().into_config()?;

    let backend = CpuBackend::with_config(&config.kernel)?;
    info!(
        "CPU backend ready: {} workers, {:?} accumulation",
        backend.worker_count(),
        backend.accumulation()
    );

    let mut sim = OneLayerSim::new(backend, &config)?;
    let dims = *sim.dims();
    info!(
        "Problem: batch {}, heads {}, keys {}, embed {}, queries {}, levels {}, points {}",
        dims.batch, dims.heads, dims.keys, dims.embed_dims, dims.queries, dims.levels, dims.points,
    );

    for epoch in 1..=config.epochs {
        sim.forward()?;
        debug!("Forward output {}", preview(sim.output()));

        let loss = sim.gradient();
        info!("Epoch {epoch}/{}: MSE loss {loss:.6}", config.epochs);

        sim.backward()?;
        debug!("Grad value {}", preview(sim.grad_value()));
        debug!("Grad location {}", preview(sim.grad_sampling_loc()));
        debug!("Grad attention {}", preview(sim.grad_attn_weight()));

        sim.update(config.lr);
    }

    info!("Final output {}", preview(sim.output()));
    Ok(())
}
