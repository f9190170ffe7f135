//! Backward differentiator.
//!
//! Runs in two phases. The zero-fill phase clears all three gradient buffers
//! and is joined before the accumulate phase launches any worker, so no late
//! zero-write can race an early accumulation. In the accumulate phase the
//! location and attention-weight gradients are query-indexed and owned by one
//! worker each; the feature-store gradient is addressed by spatial cell and
//! shared, so it goes through a [`GradSink`].

use std::ops::Range;

use msda_core::validate::expect_len;
use msda_core::{
    Bilinear, FeatureView, GradAccumulation, LevelDescriptor, MsdaDims, Result, WorkPartition,
};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::accum::{AtomicGrad, GradSink};
use crate::views::split_by_worker;

const FILL_CHUNK: usize = 1 << 14;

struct BackwardInputs<'a> {
    dims: MsdaDims,
    levels: &'a LevelDescriptor,
    features: FeatureView<'a>,
    sampling_loc: &'a [f32],
    attn_weight: &'a [f32],
    grad_output: &'a [f32],
}

/// Multi-scale deformable attention backward over raw row-major buffers.
///
/// `grad_output` is `[batch, queries, heads, embed_dims]`. The three gradient
/// buffers are zeroed here before accumulation starts; their previous
/// contents are ignored. Runs on the current rayon pool.
#[allow(clippy::too_many_arguments)]
pub fn msda_backward(
    dims: &MsdaDims,
    levels: &LevelDescriptor,
    value: &[f32],
    sampling_loc: &[f32],
    attn_weight: &[f32],
    grad_output: &[f32],
    grad_value: &mut [f32],
    grad_sampling_loc: &mut [f32],
    grad_attn_weight: &mut [f32],
    partition: &WorkPartition,
    accumulation: GradAccumulation,
) -> Result<()> {
    dims.check_levels(levels)?;
    expect_len("value", value.len(), dims.value_len())?;
    expect_len("sampling_loc", sampling_loc.len(), dims.sampling_loc_len())?;
    expect_len("attn_weight", attn_weight.len(), dims.attn_weight_len())?;
    expect_len("grad_output", grad_output.len(), dims.output_len())?;
    expect_len("grad_value", grad_value.len(), dims.value_len())?;
    expect_len("grad_sampling_loc", grad_sampling_loc.len(), dims.sampling_loc_len())?;
    expect_len("grad_attn_weight", grad_attn_weight.len(), dims.attn_weight_len())?;
    expect_len("partition", partition.total(), dims.queries)?;

    debug!(
        ?dims,
        workers = partition.workers(),
        chunk = partition.chunk_len(),
        ?accumulation,
        "msda backward"
    );

    // Phase 1: zero-fill. `join` returns only once every chunk is cleared.
    rayon::join(
        || zero_fill(grad_value),
        || rayon::join(|| zero_fill(grad_sampling_loc), || zero_fill(grad_attn_weight)),
    );

    // Phase 2: accumulate.
    let inputs = BackwardInputs {
        dims: *dims,
        levels,
        features: FeatureView::new(value, *dims),
        sampling_loc,
        attn_weight,
        grad_output,
    };
    let spq = dims.samples_per_query();
    let loc_views = split_by_worker(grad_sampling_loc, dims.batch, dims.queries, 2 * spq, partition);
    let attn_views = split_by_worker(grad_attn_weight, dims.batch, dims.queries, spq, partition);
    let work = loc_views.into_par_iter().zip(attn_views).enumerate();

    match accumulation {
        GradAccumulation::Atomic => {
            let shared = AtomicGrad::new(grad_value);
            work.for_each(|(worker, (loc, attn))| {
                let queries = partition.range(worker);
                trace!(worker, ?queries, "backward worker");
                let mut sink = shared;
                backward_worker(&inputs, queries, loc, attn, &mut sink);
            });
        }
        GradAccumulation::PerWorker => {
            let privates: Vec<Vec<f32>> = work
                .map(|(worker, (loc, attn))| {
                    let queries = partition.range(worker);
                    if queries.is_empty() {
                        return Vec::new();
                    }
                    trace!(worker, ?queries, "backward worker");
                    let mut sink = vec![0.0f32; dims.value_len()];
                    backward_worker(&inputs, queries, loc, attn, &mut sink);
                    sink
                })
                .collect();
            reduce_in_worker_order(grad_value, &privates);
        }
    }
    Ok(())
}

fn zero_fill(buf: &mut [f32]) {
    buf.par_chunks_mut(FILL_CHUNK).for_each(|chunk| chunk.fill(0.0));
}

/// `dst += privates[0] + privates[1] + ...`, summed in worker order for every
/// element so the result does not depend on scheduling.
fn reduce_in_worker_order(dst: &mut [f32], privates: &[Vec<f32>]) {
    dst.par_chunks_mut(FILL_CHUNK)
        .enumerate()
        .for_each(|(chunk_index, out)| {
            let base = chunk_index * FILL_CHUNK;
            let n = out.len();
            for private in privates.iter().filter(|p| !p.is_empty()) {
                for (o, &g) in out.iter_mut().zip(&private[base..base + n]) {
                    *o += g;
                }
            }
        });
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn backward_worker<S: GradSink>(
    inputs: &BackwardInputs<'_>,
    queries: Range<usize>,
    loc_pieces: Vec<&mut [f32]>,
    attn_pieces: Vec<&mut [f32]>,
    sink: &mut S,
) {
    let dims = &inputs.dims;
    let embed = dims.embed_dims;
    let spq = dims.samples_per_query();

    for (batch, (loc_piece, attn_piece)) in loc_pieces.into_iter().zip(attn_pieces).enumerate() {
        let per_query = loc_piece
            .chunks_exact_mut(2 * spq)
            .zip(attn_piece.chunks_exact_mut(spq));
        for (local, (grad_loc, grad_attn)) in per_query.enumerate() {
            let query = queries.start + local;
            for head in 0..dims.heads {
                let top = ((batch * dims.queries + query) * dims.heads + head) * embed;
                let top_grad = &inputs.grad_output[top..top + embed];

                for level_index in 0..dims.levels {
                    let level = inputs.levels.level(level_index);
                    for point in 0..dims.points {
                        let sample = dims.sample_index(batch, query, head, level_index, point);
                        let slot = (head * dims.levels + level_index) * dims.points + point;
                        let attn = inputs.attn_weight[sample];
                        let geometry = Bilinear::locate(
                            inputs.sampling_loc[2 * sample],
                            inputs.sampling_loc[2 * sample + 1],
                            level.height,
                            level.width,
                        );
                        if geometry.is_outside(level.height, level.width) {
                            continue;
                        }

                        let mut grad_weight = 0.0f32;
                        let mut grad_x = 0.0f32;
                        let mut grad_y = 0.0f32;
                        for corner in geometry.corners() {
                            let Some(offset) = inputs.features.cell_offset(
                                batch, head, level, corner.row, corner.col,
                            ) else {
                                continue;
                            };
                            let projected = dot(top_grad, inputs.features.vector_at(offset));
                            grad_weight += corner.weight * projected;
                            grad_x += corner.dweight_dx * projected;
                            grad_y += corner.dweight_dy * projected;
                            sink.accumulate(offset, attn * corner.weight, top_grad);
                        }

                        grad_attn[slot] += grad_weight;
                        grad_loc[2 * slot] += grad_x * attn * level.width as f32;
                        grad_loc[2 * slot + 1] += grad_y * attn * level.height as f32;
                    }
                }
            }
        }
    }
}
