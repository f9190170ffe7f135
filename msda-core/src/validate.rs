//! Boundary validation.
//!
//! The kernels index without bounds reasoning of their own, so every shape
//! agreement is checked here once, before any worker starts.

use crate::{LevelDescriptor, MsdaDims, MsdaError, Result};

fn expect_rank(name: &'static str, shape: &[usize], rank: usize) -> Result<()> {
    if shape.len() != rank {
        return Err(MsdaError::InvalidArgument(format!(
            "{name} must be rank {rank}, got shape {shape:?}"
        )));
    }
    Ok(())
}

fn expect_shape(name: &'static str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got != expected {
        return Err(MsdaError::ShapeMismatch {
            name,
            expected: expected.to_vec(),
            got: got.to_vec(),
        });
    }
    Ok(())
}

/// Checks a raw buffer length against the element count it must hold.
pub fn expect_len(name: &'static str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(MsdaError::ShapeMismatch {
            name,
            expected: vec![expected],
            got: vec![len],
        });
    }
    Ok(())
}

impl MsdaDims {
    /// Derive the problem dimensions from the input shapes and check that
    /// they agree with each other and with the level descriptor.
    ///
    /// - `value`: `[batch, heads, keys, embed_dims]`
    /// - `sampling_loc`: `[batch, queries, heads, levels, points, 2]`
    /// - `attn_weight`: `[batch, queries, heads, levels, points]`
    pub fn infer(
        value: &[usize],
        levels: &LevelDescriptor,
        sampling_loc: &[usize],
        attn_weight: &[usize],
    ) -> Result<Self> {
        expect_rank("value", value, 4)?;
        expect_rank("sampling_loc", sampling_loc, 6)?;

        let dims = Self {
            batch: value[0],
            heads: value[1],
            keys: value[2],
            embed_dims: value[3],
            queries: sampling_loc[1],
            levels: sampling_loc[3],
            points: sampling_loc[4],
        };

        for (name, size) in [
            ("batch", dims.batch),
            ("heads", dims.heads),
            ("embed_dims", dims.embed_dims),
            ("levels", dims.levels),
            ("points", dims.points),
        ] {
            if size == 0 {
                return Err(MsdaError::InvalidArgument(format!("{name} must be non-zero")));
            }
        }

        dims.check_levels(levels)?;

        expect_shape("sampling_loc", sampling_loc, &dims.sampling_loc_shape())?;
        expect_shape("attn_weight", attn_weight, &dims.attn_weight_shape())?;
        Ok(dims)
    }

    /// Checks that `levels` has one entry per level of these dims and tiles
    /// the key axis. The raw kernels call this too, since `MsdaDims` can be
    /// built by hand.
    pub fn check_levels(&self, levels: &LevelDescriptor) -> Result<()> {
        if levels.len() != self.levels {
            return Err(MsdaError::ShapeMismatch {
                name: "spatial_shapes",
                expected: vec![self.levels, 2],
                got: vec![levels.len(), 2],
            });
        }
        levels.check_keys(self.keys)
    }

    /// Accepts the upstream gradient as `[batch, queries, heads, embed_dims]`
    /// or in the flattened output layout `[batch, queries, heads * embed_dims]`.
    pub fn check_grad_output(&self, grad_output: &[usize]) -> Result<()> {
        if grad_output == self.output_shape().as_slice() {
            return Ok(());
        }
        expect_shape("grad_output", grad_output, &self.grad_output_shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> LevelDescriptor {
        LevelDescriptor::contiguous(&[(4, 4), (2, 2)])
    }

    #[test]
    fn infers_dims() {
        let dims = MsdaDims::infer(
            &[2, 3, 20, 8],
            &levels(),
            &[2, 5, 3, 2, 4, 2],
            &[2, 5, 3, 2, 4],
        )
        .unwrap();
        assert_eq!(dims.queries, 5);
        assert_eq!(dims.output_shape(), vec![2, 5, 24]);
        assert!(dims.check_grad_output(&[2, 5, 3, 8]).is_ok());
        assert!(dims.check_grad_output(&[2, 5, 24]).is_ok());
        assert!(dims.check_grad_output(&[2, 5, 8, 3]).is_err());
    }

    #[test]
    fn rejects_head_mismatch() {
        let err = MsdaDims::infer(
            &[2, 3, 20, 8],
            &levels(),
            &[2, 5, 4, 2, 4, 2],
            &[2, 5, 4, 2, 4],
        )
        .unwrap_err();
        assert!(matches!(err, MsdaError::ShapeMismatch { name: "sampling_loc", .. }));
    }

    #[test]
    fn rejects_point_mismatch_between_loc_and_weight() {
        let err = MsdaDims::infer(
            &[2, 3, 20, 8],
            &levels(),
            &[2, 5, 3, 2, 4, 2],
            &[2, 5, 3, 2, 3],
        )
        .unwrap_err();
        assert!(matches!(err, MsdaError::ShapeMismatch { name: "attn_weight", .. }));
    }

    #[test]
    fn rejects_key_count_mismatch() {
        let err = MsdaDims::infer(
            &[1, 1, 21, 8],
            &levels(),
            &[1, 5, 1, 2, 4, 2],
            &[1, 5, 1, 2, 4],
        )
        .unwrap_err();
        assert!(matches!(err, MsdaError::KeyCountMismatch { covered: 20, keys: 21 }));
    }

    #[test]
    fn rejects_level_count_mismatch() {
        let err = MsdaDims::infer(
            &[1, 1, 20, 8],
            &levels(),
            &[1, 5, 1, 3, 4, 2],
            &[1, 5, 1, 3, 4],
        )
        .unwrap_err();
        assert!(matches!(err, MsdaError::ShapeMismatch { name: "spatial_shapes", .. }));
    }

    #[test]
    fn rejects_bad_coordinate_dim() {
        assert!(MsdaDims::infer(
            &[1, 1, 20, 8],
            &levels(),
            &[1, 5, 1, 2, 4, 3],
            &[1, 5, 1, 2, 4],
        )
        .is_err());
    }
}
