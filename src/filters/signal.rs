//! Numeric kernels behind the column operations.

use crate::filters::spec::Align;

/// Linear filter `a[0]*y[n] = sum(b[k]*x[n-k]) - sum(a[k]*y[n-k], k >= 1)`,
/// evaluated in transposed direct form II.
///
/// `a` must be non-empty with `a[0] != 0`. `zi` is the initial delay-line
/// state; missing entries are treated as zero.
pub fn lfilter(b: &[f64], a: &[f64], x: &[f64], zi: Option<&[f64]>) -> Vec<f64> {
    let order = b.len().max(a.len());
    let a0 = a[0];

    let mut bn = vec![0.0; order];
    let mut an = vec![0.0; order];
    for (dst, &v) in bn.iter_mut().zip(b) {
        *dst = v / a0;
    }
    for (dst, &v) in an.iter_mut().zip(a) {
        *dst = v / a0;
    }

    let mut z = vec![0.0; order - 1];
    if let Some(zi) = zi {
        for (dst, &v) in z.iter_mut().zip(zi) {
            *dst = v;
        }
    }

    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = bn[0] * xn + z.first().copied().unwrap_or(0.0);
        for k in 0..z.len() {
            let next = z.get(k + 1).copied().unwrap_or(0.0);
            z[k] = bn[k + 1] * xn + next - an[k + 1] * yn;
        }
        y.push(yn);
    }
    y
}

/// Convolution cropped to the input length, centered like the "same" mode of
/// the usual signal libraries. A positive `offset` shifts the window later;
/// samples shifted in from outside the full convolution are zero.
pub fn convolve_same(x: &[f64], window: &[f64], offset: i64) -> Vec<f64> {
    if x.is_empty() || window.is_empty() {
        return vec![0.0; x.len()];
    }

    let full_len = x.len() + window.len() - 1;
    let full = |k: usize| -> f64 {
        let lo = k.saturating_sub(x.len() - 1);
        let hi = k.min(window.len() - 1);
        (lo..=hi).map(|j| x[k - j] * window[j]).sum()
    };

    let start = (((window.len() - 1) / 2) as i64).saturating_add(offset);
    (0..x.len() as i64)
        .map(|i| {
            let k = start.saturating_add(i);
            if k < 0 || k as usize >= full_len {
                0.0
            } else {
                full(k as usize)
            }
        })
        .collect()
}

/// Row-to-row differences padded back to the input length with `zero`.
pub fn adjacent_difference<T, F>(values: &[T], align: Align, zero: T, diff: F) -> Vec<T>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    if values.is_empty() {
        return Vec::new();
    }

    let diffs = values.windows(2).map(|w| diff(w[1], w[0]));
    let mut out = Vec::with_capacity(values.len());
    match align {
        Align::Left => {
            out.extend(diffs);
            out.push(zero);
        }
        Align::Right => {
            out.push(zero);
            out.extend(diffs);
        }
    }
    out
}
