//! Half-pixel bilinear sampling geometry.
//!
//! Forward and backward both call [`Bilinear::locate`], so the corner set and
//! weights of a sample are bit-identical between the two passes.

/// One of the four grid cells around a fractional sampling location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub row: i64,
    pub col: i64,
    /// Interpolation weight `fy * fx`.
    pub weight: f32,
    /// `d weight / d pixel_x`: `±fy`.
    pub dweight_dx: f32,
    /// `d weight / d pixel_y`: `±fx`.
    pub dweight_dy: f32,
}

/// Corner grid and fractional offsets of one sample within one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bilinear {
    /// Low corner column; the high column is `x0 + 1`.
    pub x0: i64,
    /// Low corner row; the high row is `y0 + 1`.
    pub y0: i64,
    /// Distance from the high column, in pixels (`pixel_x - floor(pixel_x)`).
    pub lx: f32,
    pub ly: f32,
}

impl Bilinear {
    /// Map normalized `(x, y)` onto a `height × width` level.
    ///
    /// `pixel = norm * extent + 0.5`; the high corner is `floor(pixel)` and the
    /// low corner sits one cell before it. Pixels are clamped to
    /// `[-1, extent + 1]` first: anything past that is off the grid either
    /// way, and the clamp keeps the corner indices far from `i64` overflow.
    #[inline]
    pub fn locate(norm_x: f32, norm_y: f32, height: usize, width: usize) -> Self {
        let pixel_x = clamp_pixel(norm_x * width as f32 + 0.5, width);
        let pixel_y = clamp_pixel(norm_y * height as f32 + 0.5, height);
        let fx = pixel_x.floor();
        let fy = pixel_y.floor();
        Self {
            x0: fx as i64 - 1,
            y0: fy as i64 - 1,
            lx: pixel_x - fx,
            ly: pixel_y - fy,
        }
    }

    #[inline]
    pub fn hx(&self) -> f32 {
        1.0 - self.lx
    }

    #[inline]
    pub fn hy(&self) -> f32 {
        1.0 - self.ly
    }

    /// The four corners in `(y0,x0), (y0,x1), (y1,x0), (y1,x1)` order. Validity
    /// is not checked here; callers drop corners that are off the grid.
    #[inline]
    pub fn corners(&self) -> [Corner; 4] {
        let (lx, ly, hx, hy) = (self.lx, self.ly, self.hx(), self.hy());
        let (x1, y1) = (self.x0 + 1, self.y0 + 1);
        [
            Corner {
                row: self.y0,
                col: self.x0,
                weight: hy * hx,
                dweight_dx: -hy,
                dweight_dy: -hx,
            },
            Corner {
                row: self.y0,
                col: x1,
                weight: hy * lx,
                dweight_dx: hy,
                dweight_dy: -lx,
            },
            Corner {
                row: y1,
                col: self.x0,
                weight: ly * hx,
                dweight_dx: -ly,
                dweight_dy: hx,
            },
            Corner {
                row: y1,
                col: x1,
                weight: ly * lx,
                dweight_dx: ly,
                dweight_dy: lx,
            },
        ]
    }

    /// True when no corner can land on a `height × width` grid, so the sample
    /// contributes nothing.
    #[inline]
    pub fn is_outside(&self, height: usize, width: usize) -> bool {
        self.y0 + 1 < 0 || self.x0 + 1 < 0 || self.y0 >= height as i64 || self.x0 >= width as i64
    }
}

#[inline]
fn clamp_pixel(pixel: f32, extent: usize) -> f32 {
    pixel.clamp(-1.0, extent as f32 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_center_has_unit_weight() {
        // Column 3 of 8 has its center at (3 + 0.5) / 8.
        let b = Bilinear::locate(3.5 / 8.0, 5.5 / 8.0, 8, 8);
        assert_eq!((b.x0, b.y0), (3, 5));
        let corners = b.corners();
        assert_eq!(corners[0].weight, 1.0);
        assert!(corners[1..].iter().all(|c| c.weight == 0.0));
    }

    #[test]
    fn weights_sum_to_one() {
        for &(x, y) in &[(0.13f32, 0.77f32), (0.5, 0.5), (0.91, 0.02), (0.0, 1.0)] {
            let sum: f32 = Bilinear::locate(x, y, 7, 5)
                .corners()
                .iter()
                .map(|c| c.weight)
                .sum();
            assert!((sum - 1.0).abs() < 1e-6, "sum {sum} at ({x}, {y})");
        }
    }

    #[test]
    fn derivative_signs_follow_side() {
        let b = Bilinear::locate(0.3, 0.6, 4, 4);
        let [low_low, low_high, high_low, high_high] = b.corners();
        assert!(low_low.dweight_dx <= 0.0 && low_low.dweight_dy <= 0.0);
        assert!(low_high.dweight_dx >= 0.0 && low_high.dweight_dy <= 0.0);
        assert!(high_low.dweight_dx <= 0.0 && high_low.dweight_dy >= 0.0);
        assert!(high_high.dweight_dx >= 0.0 && high_high.dweight_dy >= 0.0);
        let dx: f32 = b.corners().iter().map(|c| c.dweight_dx).sum();
        let dy: f32 = b.corners().iter().map(|c| c.dweight_dy).sum();
        assert!(dx.abs() < 1e-6 && dy.abs() < 1e-6);
    }

    #[test]
    fn outside_detection() {
        assert!(!Bilinear::locate(0.0, 0.0, 4, 4).is_outside(4, 4));
        assert!(!Bilinear::locate(1.0, 1.0, 4, 4).is_outside(4, 4));
        assert!(Bilinear::locate(-0.5, 0.5, 4, 4).is_outside(4, 4));
        assert!(Bilinear::locate(0.5, 1.3, 4, 4).is_outside(4, 4));
    }

    #[test]
    fn infinite_coordinates_land_outside() {
        for (x, y) in [
            (f32::NEG_INFINITY, 0.5),
            (0.5, f32::NEG_INFINITY),
            (f32::INFINITY, 0.5),
            (-1e30, 1e30),
        ] {
            let b = Bilinear::locate(x, y, 4, 6);
            assert!(b.is_outside(4, 6), "({x}, {y}) -> {b:?}");
        }
    }

    #[test]
    fn clamp_keeps_in_range_corners() {
        // Just inside the padded border on both sides.
        let low = Bilinear::locate(-0.4 / 6.0, 0.5, 4, 6);
        assert_eq!(low.x0, -1);
        assert!(!low.is_outside(4, 6));
        let high = Bilinear::locate(6.4 / 6.0, 0.5, 4, 6);
        assert_eq!(high.x0, 5);
        assert!(!high.is_outside(4, 6));
    }
}
