//! Radix-2 FFT with pre-computed twiddle factors.
//!
//! - Cooley-Tukey in-place butterflies, O(n log n)
//! - Inputs are zero-padded up to the next power of two
//! - One context is reused for every transform of the same size

use std::f64::consts::PI;

#[derive(Clone, Debug)]
pub struct FftContext {
    twiddles_re: Vec<f64>,
    twiddles_im: Vec<f64>,
    size: usize,
}

impl FftContext {
    /// Create a context for transforms of `size` (rounded up to a power of two).
    pub fn new(size: usize) -> Self {
        let n = size.max(2).next_power_of_two();
        let half_n = n / 2;
        let mut twiddles_re = Vec::with_capacity(half_n);
        let mut twiddles_im = Vec::with_capacity(half_n);

        for k in 0..half_n {
            let angle = -2.0 * PI * (k as f64) / (n as f64);
            twiddles_re.push(angle.cos());
            twiddles_im.push(angle.sin());
        }

        Self {
            twiddles_re,
            twiddles_im,
            size: n,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// In-place forward transform. Both slices must have length `size()`.
    pub fn fft(&self, re: &mut [f64], im: &mut [f64]) {
        let n = re.len();
        debug_assert_eq!(n, self.size);
        debug_assert_eq!(re.len(), im.len());

        // Bit reversal permutation
        let mut j = 0usize;
        for i in 1..n {
            let mut m = n >> 1;
            while j >= m && m > 0 {
                j -= m;
                m >>= 1;
            }
            j += m;
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let half_len = len / 2;
            let step = n / len;

            for i in (0..n).step_by(len) {
                for k in 0..half_len {
                    let twiddle_idx = k * step;
                    let tw_re = self.twiddles_re.get(twiddle_idx).copied().unwrap_or(1.0);
                    let tw_im = self.twiddles_im.get(twiddle_idx).copied().unwrap_or(0.0);

                    let idx1 = i + k;
                    let idx2 = i + k + half_len;

                    let t_re = re[idx2] * tw_re - im[idx2] * tw_im;
                    let t_im = re[idx2] * tw_im + im[idx2] * tw_re;

                    re[idx2] = re[idx1] - t_re;
                    im[idx2] = im[idx1] - t_im;
                    re[idx1] += t_re;
                    im[idx1] += t_im;
                }
            }
            len <<= 1;
        }
    }

    /// One-sided power spectrum `|X_k|^2 / n` for `k = 0..=n/2` of a real signal.
    pub fn power_spectrum(&self, signal: &[f64]) -> Vec<f64> {
        let n = self.size;
        let mut re: Vec<f64> = signal
            .iter()
            .copied()
            .chain(std::iter::repeat(0.0))
            .take(n)
            .collect();
        let mut im = vec![0.0; n];
        self.fft(&mut re, &mut im);

        (0..=n / 2)
            .map(|k| (re[k] * re[k] + im[k] * im[k]) / n as f64)
            .collect()
    }
}

/// Hann taper coefficients of length `n`.
pub fn hann(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos()))
        .collect()
}

/// Multiply `signal` by a Hann taper.
pub fn apply_hann(signal: &[f64]) -> Vec<f64> {
    signal
        .iter()
        .zip(hann(signal.len()))
        .map(|(&x, w)| x * w)
        .collect()
}
