//! Forward sampler.
//!
//! Each worker walks `batch × query × head × level × point` over its own query
//! range and writes only that range of the output, so the forward pass has no
//! cross-worker hazard and is bit-reproducible.

use std::ops::Range;

use msda_core::validate::expect_len;
use msda_core::{Bilinear, FeatureView, LevelDescriptor, MsdaDims, Result, WorkPartition};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::views::split_by_worker;

struct ForwardInputs<'a> {
    dims: MsdaDims,
    levels: &'a LevelDescriptor,
    features: FeatureView<'a>,
    sampling_loc: &'a [f32],
    attn_weight: &'a [f32],
}

/// Multi-scale deformable attention forward over raw row-major buffers.
///
/// `output` is `[batch, queries, heads * embed_dims]` and is fully
/// overwritten. Runs on the current rayon pool, one task per worker of
/// `partition`.
pub fn msda_forward(
    dims: &MsdaDims,
    levels: &LevelDescriptor,
    value: &[f32],
    sampling_loc: &[f32],
    attn_weight: &[f32],
    output: &mut [f32],
    partition: &WorkPartition,
) -> Result<()> {
    dims.check_levels(levels)?;
    expect_len("value", value.len(), dims.value_len())?;
    expect_len("sampling_loc", sampling_loc.len(), dims.sampling_loc_len())?;
    expect_len("attn_weight", attn_weight.len(), dims.attn_weight_len())?;
    expect_len("output", output.len(), dims.output_len())?;
    expect_len("partition", partition.total(), dims.queries)?;

    debug!(
        ?dims,
        workers = partition.workers(),
        chunk = partition.chunk_len(),
        "msda forward"
    );

    let inputs = ForwardInputs {
        dims: *dims,
        levels,
        features: FeatureView::new(value, *dims),
        sampling_loc,
        attn_weight,
    };
    let views = split_by_worker(
        output,
        dims.batch,
        dims.queries,
        dims.output_per_query(),
        partition,
    );
    views
        .into_par_iter()
        .enumerate()
        .for_each(|(worker, pieces)| {
            let queries = partition.range(worker);
            trace!(worker, ?queries, "forward worker");
            forward_worker(&inputs, queries, pieces);
        });
    Ok(())
}

fn forward_worker(inputs: &ForwardInputs<'_>, queries: Range<usize>, pieces: Vec<&mut [f32]>) {
    let dims = &inputs.dims;
    let embed = dims.embed_dims;
    for (batch, piece) in pieces.into_iter().enumerate() {
        // Every head accumulates over all levels and points; start from zero.
        piece.fill(0.0);
        for (local, out_query) in piece.chunks_exact_mut(dims.output_per_query()).enumerate() {
            let query = queries.start + local;
            for (head, out) in out_query.chunks_exact_mut(embed).enumerate() {
                for level_index in 0..dims.levels {
                    let level = inputs.levels.level(level_index);
                    for point in 0..dims.points {
                        let sample = dims.sample_index(batch, query, head, level_index, point);
                        let attn = inputs.attn_weight[sample];
                        let geometry = Bilinear::locate(
                            inputs.sampling_loc[2 * sample],
                            inputs.sampling_loc[2 * sample + 1],
                            level.height,
                            level.width,
                        );
                        for corner in geometry.corners() {
                            let Some(v) = inputs.features.sample_or_zero(
                                batch, head, level, corner.row, corner.col,
                            ) else {
                                continue;
                            };
                            let w = attn * corner.weight;
                            for (o, &x) in out.iter_mut().zip(v) {
                                *o += w * x;
                            }
                        }
                    }
                }
            }
        }
    }
}
