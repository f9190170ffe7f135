use std::sync::atomic::{AtomicU32, Ordering};

/// Destination of the feature-store gradient scatter.
pub trait GradSink {
    /// `self[offset + e] += scale * grad[e]` for every `e`.
    fn accumulate(&mut self, offset: usize, scale: f32, grad: &[f32]);
}

/// Private per-worker accumulator.
impl GradSink for Vec<f32> {
    #[inline]
    fn accumulate(&mut self, offset: usize, scale: f32, grad: &[f32]) {
        let dst = &mut self[offset..offset + grad.len()];
        for (d, &g) in dst.iter_mut().zip(grad) {
            *d += scale * g;
        }
    }
}

/// A float buffer shared by every worker, updated with atomic adds.
#[derive(Debug, Clone, Copy)]
pub struct AtomicGrad<'a> {
    cells: &'a [AtomicU32],
}

impl<'a> AtomicGrad<'a> {
    pub fn new(buf: &'a mut [f32]) -> Self {
        // SAFETY: `AtomicU32` has the size and alignment of `u32`, which match
        // `f32`, and the exclusive borrow keeps every other access out for `'a`.
        let cells = unsafe { &*(buf as *mut [f32] as *const [AtomicU32]) };
        Self { cells }
    }

    /// Atomic `cells[index] += value` on the f32 bit pattern.
    #[inline]
    pub fn fetch_add(&self, index: usize, value: f32) {
        let cell = &self.cells[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + value).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn load(&self, index: usize) -> f32 {
        f32::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl GradSink for AtomicGrad<'_> {
    #[inline]
    fn accumulate(&mut self, offset: usize, scale: f32, grad: &[f32]) {
        for (e, &g) in grad.iter().enumerate() {
            self.fetch_add(offset + e, scale * g);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_adds_are_not_lost() {
        let mut buf = vec![0.0f32; 4];
        {
            let grad = AtomicGrad::new(&mut buf);
            (0..1000).into_par_iter().for_each(|i| grad.fetch_add(i % 4, 1.0));
            assert_eq!(grad.load(0), 250.0);
        }
        assert_eq!(buf, vec![250.0; 4]);
    }

    #[test]
    fn sinks_agree() {
        let grad = [1.0f32, -2.0, 0.5];
        let mut private = vec![0.0f32; 5];
        private.accumulate(2, 2.0, &grad);

        let mut shared_buf = vec![0.0f32; 5];
        let mut shared = AtomicGrad::new(&mut shared_buf);
        shared.accumulate(2, 2.0, &grad);

        assert_eq!(private, vec![0.0, 0.0, 2.0, -4.0, 1.0]);
        assert_eq!(shared_buf, private);
    }
}
