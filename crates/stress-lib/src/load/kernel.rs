//! Constant-cost CPU work unit
//!
//! An escape-time Mandelbrot pass over a small square domain. Only the cost
//! matters: one pass over the default half-unit domain takes a few
//! milliseconds, which sets the granularity of the duty cycle.

use std::hint::black_box;
use tokio_util::sync::CancellationToken;

/// Half-width of the sampled square used in production
pub const DEFAULT_HALF_EXTENT: f64 = 0.5;

const PIXEL_STEP: f64 = 0.01;
const MAX_ITERATIONS: u32 = 50;
const ESCAPE_MODULUS_SQ: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MandelbrotKernel {
    half_extent: f64,
}

impl Default for MandelbrotKernel {
    fn default() -> Self {
        Self::new(DEFAULT_HALF_EXTENT)
    }
}

impl MandelbrotKernel {
    pub fn new(half_extent: f64) -> Self {
        Self {
            half_extent: half_extent.abs(),
        }
    }

    /// Samples along one axis
    fn steps(&self) -> usize {
        ((2.0 * self.half_extent) / PIXEL_STEP).round() as usize
    }

    /// Run one pass and return the total iteration count.
    ///
    /// Checks `cancel` once per row and returns `None` if it fired.
    pub fn compute(&self, cancel: &CancellationToken) -> Option<u64> {
        let steps = self.steps();
        let mut total = 0u64;

        for row in 0..steps {
            if cancel.is_cancelled() {
                return None;
            }
            let ci = -self.half_extent + row as f64 * PIXEL_STEP;

            for col in 0..steps {
                let cr = -self.half_extent + col as f64 * PIXEL_STEP;
                total += escape_iterations(cr, ci) as u64;
            }
        }

        Some(black_box(total))
    }
}

/// Iterate z = z² + c from zero until |z|² > 4 or the iteration cap
fn escape_iterations(cr: f64, ci: f64) -> u32 {
    let (mut zr, mut zi) = (0.0f64, 0.0f64);
    let mut k = 0;

    loop {
        let next_r = zr * zr - zi * zi + cr;
        zi = 2.0 * zr * zi + ci;
        zr = next_r;
        k += 1;

        if zr * zr + zi * zi > ESCAPE_MODULUS_SQ || k >= MAX_ITERATIONS {
            return k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_never_escapes() {
        assert_eq!(escape_iterations(0.0, 0.0), MAX_ITERATIONS);
    }

    #[test]
    fn test_far_point_escapes_immediately() {
        assert_eq!(escape_iterations(3.0, 3.0), 1);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let kernel = MandelbrotKernel::new(0.1);
        let cancel = CancellationToken::new();

        let first = kernel.compute(&cancel);
        let second = kernel.compute(&cancel);

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_compute_stops_when_cancelled() {
        let kernel = MandelbrotKernel::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(kernel.compute(&cancel), None);
    }

    #[test]
    fn test_default_domain_size() {
        assert_eq!(MandelbrotKernel::default().steps(), 100);
    }
}
