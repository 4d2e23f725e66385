//! Filter primitives for the modem: Butterworth lowpass design with
//! zero-phase (forward-backward) application, root-raised-cosine taps and
//! causal FIR convolution.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Multiply out a monic polynomial from its roots.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}

/// Digital 4th-order Butterworth lowpass via the bilinear transform.
/// Returns `(b, a)` with `a[0] == 1`.
pub fn butter4_lowpass(cutoff_hz: f64, sample_rate: f64) -> (Vec<f64>, Vec<f64>) {
    const ORDER: usize = 4;
    let wn = cutoff_hz / (sample_rate / 2.0);
    let warped = 4.0 * (PI * wn / 2.0).tan();

    // Analog prototype poles scaled to the warped cutoff.
    let poles: Vec<Complex64> = (0..ORDER)
        .map(|k| {
            let theta = PI * (2 * k + 1) as f64 / (2 * ORDER) as f64 + PI / 2.0;
            warped * Complex64::from_polar(1.0, theta)
        })
        .collect();
    let gain = warped.powi(ORDER as i32);

    // Bilinear transform at fs2 = 4; all zeros map to z = -1.
    let fs2 = 4.0;
    let z_poles: Vec<Complex64> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    let denom: Complex64 = poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (fs2 - p));
    let k_digital = (gain / denom).re;

    let z_zeros = vec![Complex64::new(-1.0, 0.0); ORDER];
    let b: Vec<f64> = poly(&z_zeros).iter().map(|c| (k_digital * c).re).collect();
    let a: Vec<f64> = poly(&z_poles).iter().map(|c| c.re).collect();
    (b, a)
}

/// Direct-form II transposed IIR filter with optional initial state.
pub fn lfilter(b: &[f64], a: &[f64], x: &[f64], zi: Option<&[f64]>) -> Vec<f64> {
    let order = b.len().max(a.len());
    let mut bn = b.to_vec();
    let mut an = a.to_vec();
    bn.resize(order, 0.0);
    an.resize(order, 0.0);
    let a0 = an[0];
    if a0 != 1.0 {
        for v in bn.iter_mut().chain(an.iter_mut()) {
            *v /= a0;
        }
    }

    if order < 2 {
        return x.iter().map(|&xn| bn[0] * xn).collect();
    }
    let mut state = match zi {
        Some(z) => z.to_vec(),
        None => vec![0.0; order - 1],
    };
    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = bn[0] * xn + state[0];
        for i in 0..order - 2 {
            state[i] = bn[i + 1] * xn + state[i + 1] - an[i + 1] * yn;
        }
        state[order - 2] = bn[order - 1] * xn - an[order - 1] * yn;
        y.push(yn);
    }
    y
}

/// Steady-state initial filter state for a unit step, so that `lfilter`
/// started on a constant input produces a constant output from sample 0.
pub fn lfilter_zi(b: &[f64], a: &[f64]) -> Vec<f64> {
    let order = b.len().max(a.len());
    let mut bn = b.to_vec();
    let mut an = a.to_vec();
    bn.resize(order, 0.0);
    an.resize(order, 0.0);
    let n = order - 1;

    // Solve (I - C^T) zi = B, with C the companion matrix of `a`.
    let mut m = vec![vec![0.0f64; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let companion_ji = if j == 0 {
                -an[i + 1]
            } else if i == j - 1 {
                1.0
            } else {
                0.0
            };
            *cell = (i == j) as u8 as f64 - companion_ji;
        }
    }
    let mut rhs: Vec<f64> = (0..n).map(|i| bn[i + 1] - an[i + 1] * bn[0]).collect();

    // Gaussian elimination with partial pivoting.
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in 0..n {
            if row != col && m[row][col] != 0.0 {
                let factor = m[row][col] / m[col][col];
                for c in col..n {
                    m[row][c] -= factor * m[col][c];
                }
                rhs[row] -= factor * rhs[col];
            }
        }
    }
    (0..n).map(|i| rhs[i] / m[i][i]).collect()
}

/// Zero-phase filtering: forward pass, reverse, backward pass, reverse.
/// The input is odd-extended at both ends and the filter is started from
/// its steady state scaled to the first sample, which keeps the very slow
/// narrowband lowpasses used here transient-free.
pub fn filtfilt(b: &[f64], a: &[f64], x: &[f64]) -> Vec<f64> {
    let pad = 3 * b.len().max(a.len());
    assert!(x.len() > pad, "signal too short for zero-phase filtering");

    let n = x.len();
    let mut ext = Vec::with_capacity(n + 2 * pad);
    for i in 0..pad {
        ext.push(2.0 * x[0] - x[pad - i]);
    }
    ext.extend_from_slice(x);
    for i in 0..pad {
        ext.push(2.0 * x[n - 1] - x[n - 2 - i]);
    }

    let zi = lfilter_zi(b, a);
    let scaled: Vec<f64> = zi.iter().map(|z| z * ext[0]).collect();
    let mut y = lfilter(b, a, &ext, Some(&scaled));
    y.reverse();
    let scaled: Vec<f64> = zi.iter().map(|z| z * y[0]).collect();
    let mut y = lfilter(b, a, &y, Some(&scaled));
    y.reverse();
    y[pad..y.len() - pad].to_vec()
}

/// Root-raised-cosine taps, normalized to unit Euclidean norm. The two
/// singularities at t = +-1/(2 beta) are replaced by zero before
/// normalization.
pub fn rrc_taps(num_taps: usize, samples_per_symbol: f64, beta: f64) -> Vec<f64> {
    let half = (num_taps / 2) as isize;
    let mut taps: Vec<f64> = (-half..=half)
        .map(|i| {
            let t = i as f64 / samples_per_symbol;
            if t == 0.0 {
                return 1.0;
            }
            let denom = 1.0 - (2.0 * beta * t).powi(2);
            if denom.abs() < 1e-12 {
                return 0.0;
            }
            let sinc = (PI * t).sin() / (PI * t);
            sinc * (PI * beta * t).cos() / denom
        })
        .collect();
    let norm = taps.iter().map(|v| v * v).sum::<f64>().sqrt();
    for tap in &mut taps {
        *tap /= norm;
    }
    taps
}

/// Causal FIR convolution of a complex signal with real taps.
pub fn fir_filter(taps: &[f64], input: &[Complex64]) -> Vec<Complex64> {
    let mut output = Vec::with_capacity(input.len());
    for n in 0..input.len() {
        let mut acc = Complex64::new(0.0, 0.0);
        let reach = taps.len().min(n + 1);
        for (k, &tap) in taps.iter().enumerate().take(reach) {
            acc += tap * input[n - k];
        }
        output.push(acc);
    }
    output
}
