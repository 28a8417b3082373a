use std::sync::Arc;

use num::{
    Complex,
    Zero,
};
use parking_lot::Mutex;
use pstd_util::cache::SharedCache;
use rustfft::{
    Fft,
    FftPlanner,
};

use crate::error::KernelError;

/// Forward and inverse transforms for `batch_size` lines of `fft_length`
/// real samples each.
///
/// The forward transform is real-to-complex and produces
/// [`spectrum_len`](Self::spectrum_len) bins per line. The inverse is
/// complex-to-real and normalized, so applying both reproduces the input.
#[derive(derive_more::Debug)]
pub struct TransformPlanSet {
    pub fft_length: usize,
    pub batch_size: usize,
    #[debug(ignore)]
    forward: Arc<dyn Fft<f64>>,
    #[debug(ignore)]
    inverse: Arc<dyn Fft<f64>>,
}

impl TransformPlanSet {
    pub fn spectrum_len(&self) -> usize {
        self.fft_length / 2 + 1
    }

    pub fn forward(&self, input: &[f64], output: &mut [Complex<f64>]) {
        let n = self.fft_length;
        let m = self.spectrum_len();
        assert_eq!(input.len(), n * self.batch_size, "forward input size");
        assert_eq!(output.len(), m * self.batch_size, "forward output size");

        let mut buffer = vec![Complex::zero(); n];
        let mut scratch = vec![Complex::zero(); self.forward.get_inplace_scratch_len()];

        for (line_in, line_out) in input.chunks_exact(n).zip(output.chunks_exact_mut(m)) {
            for (x, y) in line_in.iter().zip(&mut buffer) {
                *y = Complex::new(*x, 0.0);
            }
            self.forward.process_with_scratch(&mut buffer, &mut scratch);
            line_out.copy_from_slice(&buffer[..m]);
        }
    }

    pub fn inverse(&self, input: &[Complex<f64>], output: &mut [f64]) {
        let n = self.fft_length;
        let m = self.spectrum_len();
        assert_eq!(input.len(), m * self.batch_size, "inverse input size");
        assert_eq!(output.len(), n * self.batch_size, "inverse output size");

        let normalization = 1.0 / n as f64;
        let mut buffer = vec![Complex::zero(); n];
        let mut scratch = vec![Complex::zero(); self.inverse.get_inplace_scratch_len()];

        for (line_in, line_out) in input.chunks_exact(m).zip(output.chunks_exact_mut(n)) {
            // rebuild the full hermitian spectrum
            buffer[..m].copy_from_slice(line_in);
            for k in m..n {
                buffer[k] = line_in[n - k].conj();
            }
            buffer[0].im = 0.0;
            if n % 2 == 0 {
                buffer[n / 2].im = 0.0;
            }

            self.inverse.process_with_scratch(&mut buffer, &mut scratch);

            for (x, y) in buffer.iter().zip(line_out) {
                *y = x.re * normalization;
            }
        }
    }
}

#[derive(derive_more::Debug)]
pub struct PlanCache {
    plans: SharedCache<(usize, usize), TransformPlanSet>,

    /// Plan creation is serialized through this planner.
    #[debug(ignore)]
    planner: Mutex<FftPlanner<f64>>,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self {
            plans: SharedCache::default(),
            planner: Mutex::new(FftPlanner::new()),
        }
    }
}

impl PlanCache {
    pub fn get_plan(
        &self,
        fft_length: usize,
        batch_size: usize,
    ) -> Result<Arc<TransformPlanSet>, KernelError> {
        self.plans
            .get_or_try_insert_with((fft_length, batch_size), || {
                if fft_length == 0 || batch_size == 0 {
                    return Err(KernelError::TransformPlanFailure {
                        fft_length,
                        batch_size,
                        reason: "length and batch size must be non-zero".to_owned(),
                    });
                }

                tracing::debug!(fft_length, batch_size, "creating transform plan");

                let mut planner = self.planner.lock();
                let forward = planner.plan_fft_forward(fft_length);
                let inverse = planner.plan_fft_inverse(fft_length);

                Ok(TransformPlanSet {
                    fft_length,
                    batch_size,
                    forward,
                    inverse,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use num::{
        Complex,
        Zero,
    };

    use crate::{
        error::KernelError,
        wisdom::plan::PlanCache,
    };

    fn signal(n: usize, batch: usize) -> Vec<f64> {
        (0..n * batch)
            .map(|i| {
                let t = i as f64 * 0.37;
                1.5 + t.sin() + 0.25 * (3.0 * t).cos()
            })
            .collect()
    }

    #[test]
    fn it_round_trips() {
        let cache = PlanCache::default();

        for n in [16, 64, 256] {
            let batch = 3;
            let plan = cache.get_plan(n, batch).unwrap();
            let input = signal(n, batch);

            let mut spectrum = vec![Complex::zero(); plan.spectrum_len() * batch];
            plan.forward(&input, &mut spectrum);

            let mut output = vec![0.0; n * batch];
            plan.inverse(&spectrum, &mut output);

            for (a, b) in input.iter().zip(&output) {
                assert_relative_eq!(*a, *b, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn it_computes_the_dc_bin() {
        let cache = PlanCache::default();
        let plan = cache.get_plan(8, 1).unwrap();
        let mut spectrum = vec![Complex::zero(); plan.spectrum_len()];
        plan.forward(&[1.0; 8], &mut spectrum);
        assert_relative_eq!(spectrum[0].re, 8.0);
        for bin in &spectrum[1..] {
            assert!(bin.norm() < 1e-12);
        }
    }

    #[test]
    fn it_caches_plans_by_length_and_batch() {
        let cache = PlanCache::default();
        let a = cache.get_plan(64, 2).unwrap();
        let b = cache.get_plan(64, 2).unwrap();
        let c = cache.get_plan(64, 3).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn it_rejects_empty_plans() {
        let cache = PlanCache::default();
        assert!(matches!(
            cache.get_plan(0, 1),
            Err(KernelError::TransformPlanFailure { fft_length: 0, .. })
        ));
        assert!(cache.is_empty());
    }
}
