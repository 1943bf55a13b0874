//! Signal conditioning: least-squares detrending, Butterworth design and
//! zero-phase (forward-backward) IIR filtering.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use realfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Pass band of a Butterworth design, cutoffs in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Band {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
}

/// IIR filter in transfer-function form, `a[0] == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

struct Zpk {
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
}

impl TransferFunction {
    /// Digital Butterworth filter of the given order.
    ///
    /// Analog prototype → pre-warped frequency transform → bilinear
    /// transform → polynomial expansion. A band-pass design has `2 * order`
    /// poles.
    pub fn butterworth(order: usize, band: Band, fs: f64) -> PipelineResult<Self> {
        if order == 0 {
            return Err(PipelineError::InvalidInput("filter order must be at least 1".into()));
        }
        let nyq = fs / 2.0;
        let check = |f: f64| {
            if f > 0.0 && f < nyq {
                Ok(f)
            } else {
                Err(PipelineError::InvalidInput(format!(
                    "cutoff {f} Hz outside (0, {nyq}) Hz"
                )))
            }
        };
        // Work on the normalized axis where Nyquist is 1 and the digital fs is 2.
        let warp = |f: f64| 4.0 * (PI * (f / nyq) / 2.0).tan();
        let prototype = butter_prototype(order);
        let analog = match band {
            Band::Lowpass(fc) => lowpass_to_lowpass(prototype, warp(check(fc)?)),
            Band::Highpass(fc) => lowpass_to_highpass(prototype, warp(check(fc)?)),
            Band::Bandpass(lo, hi) => {
                let (lo, hi) = (check(lo)?, check(hi)?);
                if lo >= hi {
                    return Err(PipelineError::InvalidInput(format!(
                        "band-pass edges inverted: {lo} >= {hi} Hz"
                    )));
                }
                let (wl, wh) = (warp(lo), warp(hi));
                lowpass_to_bandpass(prototype, (wl * wh).sqrt(), wh - wl)
            }
        };
        let digital = bilinear(analog, 2.0);
        let b = poly(&digital.zeros)
            .into_iter()
            .map(|c| c.re * digital.gain)
            .collect();
        let a = poly(&digital.poles).into_iter().map(|c| c.re).collect();
        Ok(Self { b, a })
    }

    fn order(&self) -> usize {
        self.a.len().max(self.b.len())
    }

    /// Edge padding used by [`TransferFunction::filtfilt`].
    pub fn padlen(&self) -> usize {
        3 * self.order()
    }

    fn padded(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.order();
        let a0 = self.a[0];
        let mut b: Vec<f64> = self.b.iter().map(|v| v / a0).collect();
        let mut a: Vec<f64> = self.a.iter().map(|v| v / a0).collect();
        b.resize(n, 0.0);
        a.resize(n, 0.0);
        (b, a)
    }

    /// Direct-form II transposed filtering with optional initial state.
    pub fn lfilter(&self, x: &[f64], zi: Option<&[f64]>) -> Vec<f64> {
        let (b, a) = self.padded();
        let n = b.len();
        if n == 1 {
            return x.iter().map(|v| v * b[0]).collect();
        }
        let mut z = match zi {
            Some(zi) => zi.to_vec(),
            None => vec![0.0; n - 1],
        };
        let mut out = Vec::with_capacity(x.len());
        for &xv in x {
            let y = b[0] * xv + z[0];
            for i in 0..n - 2 {
                z[i] = b[i + 1] * xv + z[i + 1] - a[i + 1] * y;
            }
            z[n - 2] = b[n - 1] * xv - a[n - 1] * y;
            out.push(y);
        }
        out
    }

    /// Filter state for a unit step input at steady state.
    pub fn steady_state(&self) -> Vec<f64> {
        let (b, a) = self.padded();
        let n = b.len();
        if n < 2 {
            return Vec::new();
        }
        let m = n - 1;
        let mut matrix = vec![vec![0.0; m]; m];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = 1.0;
            row[0] += a[i + 1];
            if i + 1 < m {
                row[i + 1] -= 1.0;
            }
        }
        let rhs: Vec<f64> = (0..m).map(|i| b[i + 1] - a[i + 1] * b[0]).collect();
        solve_linear(matrix, rhs)
    }

    /// Zero-phase filtering with odd-extension padding on both edges.
    ///
    /// Signals not longer than [`TransferFunction::padlen`] are rejected with
    /// [`PipelineError::InsufficientData`].
    pub fn filtfilt(&self, x: &[f64]) -> PipelineResult<Vec<f64>> {
        let edge = self.padlen();
        if x.len() <= edge {
            return Err(PipelineError::InsufficientData {
                needed: edge,
                got: x.len(),
            });
        }
        let ext = odd_extend(x, edge);
        let zi = self.steady_state();
        let scaled = |x0: f64| zi.iter().map(|z| z * x0).collect::<Vec<_>>();

        let mut forward = self.lfilter(&ext, Some(&scaled(ext[0])));
        forward.reverse();
        let mut backward = self.lfilter(&forward, Some(&scaled(forward[0])));
        backward.reverse();
        Ok(backward[edge..backward.len() - edge].to_vec())
    }
}

fn odd_extend(x: &[f64], n: usize) -> Vec<f64> {
    let len = x.len();
    let (first, last) = (x[0], x[len - 1]);
    let mut ext = Vec::with_capacity(len + 2 * n);
    ext.extend((1..=n).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((0..n).map(|i| 2.0 * last - x[len - 2 - i]));
    ext
}

fn butter_prototype(order: usize) -> Zpk {
    let n = order as i64;
    let poles = (0..order as i64)
        .map(|k| {
            let m = -n + 1 + 2 * k;
            -Complex64::new(0.0, PI * m as f64 / (2.0 * n as f64)).exp()
        })
        .collect();
    Zpk {
        zeros: Vec::new(),
        poles,
        gain: 1.0,
    }
}

fn lowpass_to_lowpass(zpk: Zpk, wo: f64) -> Zpk {
    let degree = zpk.poles.len() - zpk.zeros.len();
    Zpk {
        zeros: zpk.zeros.iter().map(|&z| z * wo).collect(),
        poles: zpk.poles.iter().map(|&p| p * wo).collect(),
        gain: zpk.gain * wo.powi(degree as i32),
    }
}

fn lowpass_to_highpass(zpk: Zpk, wo: f64) -> Zpk {
    let degree = zpk.poles.len() - zpk.zeros.len();
    let num: Complex64 = zpk.zeros.iter().map(|&z| -z).product();
    let den: Complex64 = zpk.poles.iter().map(|&p| -p).product();
    let mut zeros: Vec<Complex64> = zpk.zeros.iter().map(|&z| wo / z).collect();
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: zpk.poles.iter().map(|&p| wo / p).collect(),
        gain: zpk.gain * (num / den).re,
    }
}

fn lowpass_to_bandpass(zpk: Zpk, wo: f64, bw: f64) -> Zpk {
    let degree = zpk.poles.len() - zpk.zeros.len();
    let split = |roots: &[Complex64]| {
        let scaled: Vec<Complex64> = roots.iter().map(|&r| r * (bw / 2.0)).collect();
        let offsets: Vec<Complex64> = scaled.iter().map(|&r| (r * r - wo * wo).sqrt()).collect();
        let mut out: Vec<Complex64> = scaled.iter().zip(&offsets).map(|(&r, &d)| r + d).collect();
        out.extend(scaled.iter().zip(&offsets).map(|(&r, &d)| r - d));
        out
    };
    let mut zeros = split(&zpk.zeros);
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: split(&zpk.poles),
        gain: zpk.gain * bw.powi(degree as i32),
    }
}

fn bilinear(zpk: Zpk, fs: f64) -> Zpk {
    let degree = zpk.poles.len() - zpk.zeros.len();
    let fs2 = Complex64::new(2.0 * fs, 0.0);
    let num: Complex64 = zpk.zeros.iter().map(|&z| fs2 - z).product();
    let den: Complex64 = zpk.poles.iter().map(|&p| fs2 - p).product();
    let mut zeros: Vec<Complex64> = zpk.zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: zpk.poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect(),
        gain: zpk.gain * (num / den).re,
    }
}

/// Monic polynomial coefficients (highest power first) with the given roots.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = coeffs.clone();
        next.push(Complex64::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= root * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs
}

fn solve_linear(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Vec<f64> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let acc: f64 = (i + 1..n).map(|j| m[i][j] * x[j]).sum();
        x[i] = (rhs[i] - acc) / m[i][i];
    }
    x
}

/// Least-squares line over sample index: `(slope, intercept)`.
pub fn linear_fit(segment: &[f64]) -> (f64, f64) {
    let n = segment.len();
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (i, &y) in segment.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n_f = n as f64;
    let denom = n_f * sum_xx - sum_x * sum_x;
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    (slope, intercept)
}

/// Subtract the least-squares line from the samples.
pub fn detrend(samples: &[f64]) -> PipelineResult<Vec<f64>> {
    if samples.len() < 2 {
        return Err(PipelineError::InvalidInput(format!(
            "detrend needs at least 2 samples, got {}",
            samples.len()
        )));
    }
    let (slope, intercept) = linear_fit(samples);
    Ok(samples
        .iter()
        .enumerate()
        .map(|(i, y)| y - (slope * i as f64 + intercept))
        .collect())
}

/// Detrend + band-pass stage applied to whole recordings.
#[derive(Debug, Clone)]
pub struct Conditioner {
    detrend: bool,
    bandpass: TransferFunction,
}

impl Conditioner {
    pub fn new(detrend: bool, bandpass: TransferFunction) -> Self {
        Self { detrend, bandpass }
    }

    pub fn from_config(cfg: &PipelineConfig) -> PipelineResult<Self> {
        let bandpass = TransferFunction::butterworth(
            cfg.filter.order,
            Band::Bandpass(cfg.filter.low_hz, cfg.filter.high_hz),
            cfg.sample_rate_hz,
        )?;
        Ok(Self::new(cfg.filter.detrend, bandpass))
    }

    pub fn condition(&self, samples: &[f64]) -> PipelineResult<Vec<f64>> {
        if self.detrend {
            let flat = detrend(samples)?;
            self.bandpass.filtfilt(&flat)
        } else {
            self.bandpass.filtfilt(samples)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gain_at(tf: &TransferFunction, f: f64, fs: f64) -> f64 {
        let w = 2.0 * PI * f / fs;
        let eval = |c: &[f64]| -> Complex64 {
            c.iter()
                .enumerate()
                .map(|(i, v)| Complex64::new(0.0, -w * i as f64).exp() * *v)
                .sum()
        };
        (eval(&tf.b) / eval(&tf.a)).norm()
    }

    #[test]
    fn highpass_matches_reference_coefficients() {
        let tf = TransferFunction::butterworth(2, Band::Highpass(5.0), 25.0).unwrap();
        let b = [0.39133577250176854, -0.7826715450035371, 0.39133577250176854];
        let a = [1.0, -0.36952737735124136, 0.19581571265583303];
        for (x, y) in tf.b.iter().zip(b) {
            assert!((x - y).abs() < 1e-12, "{x} vs {y}");
        }
        for (x, y) in tf.a.iter().zip(a) {
            assert!((x - y).abs() < 1e-12, "{x} vs {y}");
        }
    }

    #[test]
    fn bandpass_gain_shape() {
        let tf = TransferFunction::butterworth(3, Band::Bandpass(0.5, 5.0), 25.0).unwrap();
        assert_eq!(tf.a.len(), 7);
        assert_eq!(tf.padlen(), 21);
        let center = (0.5f64 * 5.0).sqrt();
        assert!((gain_at(&tf, center, 25.0) - 1.0).abs() < 0.05);
        assert!((gain_at(&tf, 0.5, 25.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((gain_at(&tf, 5.0, 25.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(gain_at(&tf, 0.01, 25.0) < 1e-3);
        assert!(gain_at(&tf, 12.0, 25.0) < 0.01);
    }

    #[test]
    fn lowpass_has_unit_dc_gain() {
        let tf = TransferFunction::butterworth(4, Band::Lowpass(2.0), 25.0).unwrap();
        let dc = tf.b.iter().sum::<f64>() / tf.a.iter().sum::<f64>();
        assert!((dc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_cutoff_at_nyquist() {
        let err = TransferFunction::butterworth(2, Band::Lowpass(12.5), 25.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        let err = TransferFunction::butterworth(2, Band::Bandpass(3.0, 1.0), 25.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn filtfilt_removes_constant_under_highpass() {
        let tf = TransferFunction::butterworth(2, Band::Highpass(5.0), 25.0).unwrap();
        let out = tf.filtfilt(&[3.0; 50]).unwrap();
        assert_eq!(out.len(), 50);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn filtfilt_keeps_passband_sinusoid() {
        let fs = 25.0;
        let tf = TransferFunction::butterworth(3, Band::Bandpass(0.5, 5.0), fs).unwrap();
        let x: Vec<f64> = (0..500)
            .map(|i| (2.0 * PI * 1.5 * i as f64 / fs).sin())
            .collect();
        let y = tf.filtfilt(&x).unwrap();
        // zero-phase: the middle of the output tracks the input closely
        for i in 100..400 {
            assert!((x[i] - y[i]).abs() < 0.05, "sample {i}: {} vs {}", x[i], y[i]);
        }
    }

    #[test]
    fn filtfilt_reports_short_input() {
        let tf = TransferFunction::butterworth(3, Band::Bandpass(0.5, 5.0), 25.0).unwrap();
        match tf.filtfilt(&[0.0; 21]) {
            Err(PipelineError::InsufficientData { needed, got }) => {
                assert_eq!(needed, 21);
                assert_eq!(got, 21);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(tf.filtfilt(&[0.0; 22]).is_ok());
    }

    #[test]
    fn steady_state_matches_step_response() {
        let tf = TransferFunction::butterworth(2, Band::Highpass(5.0), 25.0).unwrap();
        let zi = tf.steady_state();
        assert!((zi[0] + 0.39133577250176843).abs() < 1e-12);
        assert!((zi[1] - 0.39133577250176854).abs() < 1e-12);
        let y = tf.lfilter(&[1.0; 10], Some(&zi));
        assert!(y.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn detrend_removes_line() {
        let x: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        let y = detrend(&x).unwrap();
        assert!(y.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn detrend_needs_two_samples() {
        assert!(matches!(detrend(&[1.0]), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(detrend(&[]), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn conditioner_preserves_length() {
        let cfg = PipelineConfig::default();
        let conditioner = Conditioner::from_config(&cfg).unwrap();
        let x: Vec<f64> = (0..300).map(|i| (i as f64 * 0.3).sin() + i as f64 * 0.01).collect();
        assert_eq!(conditioner.condition(&x).unwrap().len(), 300);
        assert!(conditioner.condition(&x[..10]).is_err());
    }
}
