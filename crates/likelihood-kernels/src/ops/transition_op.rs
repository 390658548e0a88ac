// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Transition-probability matrices from an eigen-decomposition.

use crate::{EigenDecomposition, KernelError, Layout};

/// Which derivative of `P(t)` with respect to `t` to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixOrder {
    /// `P(t)`, clamped to `[0, 1]`.
    Probability,
    /// `∂P/∂t`.
    FirstDerivative,
    /// `∂²P/∂t²`.
    SecondDerivative,
}

impl MatrixOrder {
    #[inline]
    fn coefficient(self, rate: f64) -> f64 {
        match self {
            Self::Probability => 1.0,
            Self::FirstDerivative => rate,
            Self::SecondDerivative => rate * rate,
        }
    }
}

/// Fills `out` with one `states × states` matrix per category:
///
/// ```text
/// out[c][i][j] = Σ_k V[i][k] · g(λ_k r_c) · exp(λ_k r_c t) · V⁻¹[k][j]
/// ```
///
/// where `g` is `1`, `x` or `x²` for [`MatrixOrder::Probability`],
/// [`MatrixOrder::FirstDerivative`] and [`MatrixOrder::SecondDerivative`].
/// Only probabilities are clamped; reconstruction error can push raw entries
/// slightly outside `[0, 1]`.
///
/// # Errors
/// Returns [`KernelError::SizeMismatch`] if the decomposition, `rates` or
/// `out` disagree with `layout`.
pub fn transition_matrices(
    eigen: &EigenDecomposition,
    layout: &Layout,
    rates: &[f64],
    edge_length: f64,
    order: MatrixOrder,
    out: &mut [f64],
) -> Result<(), KernelError> {
    let n = layout.states();
    KernelError::check("eigen states", n, eigen.states())?;
    KernelError::check("category rates", layout.categories(), rates.len())?;
    layout.check_matrix("transition matrix", out)?;

    let v = eigen.eigenvectors();
    let v_inv = eigen.inverse_eigenvectors();
    let lambda = eigen.eigenvalues();
    let mut factors = vec![0.0; n];

    for (c, &rate) in rates.iter().enumerate() {
        for (f, &l) in factors.iter_mut().zip(lambda) {
            let scaled = l * rate;
            *f = order.coefficient(scaled) * (scaled * edge_length).exp();
        }
        for i in 0..n {
            let row = layout.row_offset(c, i);
            let v_row = &v[i * n..(i + 1) * n];
            for j in 0..n {
                let mut sum = 0.0;
                for k in 0..n {
                    sum += v_row[k] * factors[k] * v_inv[k * n + j];
                }
                out[row + j] = match order {
                    MatrixOrder::Probability => sum.clamp(0.0, 1.0),
                    _ => sum,
                };
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jc_matrices(layout: &Layout, rates: &[f64], t: f64, order: MatrixOrder) -> Vec<f64> {
        let eigen = EigenDecomposition::jukes_cantor(layout.states());
        let mut out = vec![0.0; layout.matrix_len()];
        transition_matrices(&eigen, layout, rates, t, order, &mut out).unwrap();
        out
    }

    #[test]
    fn test_zero_length_is_identity() {
        let layout = Layout::new(4, 1, 2);
        let p = jc_matrices(&layout, &[0.5, 2.0], 0.0, MatrixOrder::Probability);
        for c in 0..2 {
            for i in 0..4 {
                for j in 0..4 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((p[layout.row_offset(c, i) + j] - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_rows_sum_to_one() {
        let layout = Layout::new(4, 1, 3);
        for &t in &[0.0, 0.01, 0.3, 1.7, 25.0] {
            let p = jc_matrices(&layout, &[0.2, 1.0, 3.5], t, MatrixOrder::Probability);
            for c in 0..3 {
                for i in 0..4 {
                    let off = layout.row_offset(c, i);
                    let sum: f64 = p[off..off + 4].iter().sum();
                    assert!((sum - 1.0).abs() < 1e-10, "t={t} c={c} row {i} sums to {sum}");
                    assert!(p[off..off + 4].iter().all(|&x| (0.0..=1.0).contains(&x)));
                }
            }
        }
    }

    #[test]
    fn test_long_branch_converges_to_uniform() {
        let layout = Layout::new(4, 1, 1);
        let p = jc_matrices(&layout, &[1.0], 200.0, MatrixOrder::Probability);
        assert!(p.iter().all(|&x| (x - 0.25).abs() < 1e-10));
    }

    #[test]
    fn test_jukes_cantor_closed_form() {
        let layout = Layout::new(4, 1, 1);
        let t = 0.4;
        let p = jc_matrices(&layout, &[1.0], t, MatrixOrder::Probability);
        let e = (-4.0 * t / 3.0_f64).exp();
        assert!((p[0] - (0.25 + 0.75 * e)).abs() < 1e-12);
        assert!((p[1] - (0.25 - 0.25 * e)).abs() < 1e-12);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let layout = Layout::new(4, 1, 2);
        let rates = [0.7, 1.6];
        let (t, h) = (0.35, 1e-5);
        let d1 = jc_matrices(&layout, &rates, t, MatrixOrder::FirstDerivative);
        let d2 = jc_matrices(&layout, &rates, t, MatrixOrder::SecondDerivative);
        let lo = jc_matrices(&layout, &rates, t - h, MatrixOrder::Probability);
        let mid = jc_matrices(&layout, &rates, t, MatrixOrder::Probability);
        let hi = jc_matrices(&layout, &rates, t + h, MatrixOrder::Probability);
        for k in 0..layout.matrix_len() {
            let fd1 = (hi[k] - lo[k]) / (2.0 * h);
            let fd2 = (hi[k] - 2.0 * mid[k] + lo[k]) / (h * h);
            assert!((d1[k] - fd1).abs() < 1e-7, "d1[{k}] {} vs {fd1}", d1[k]);
            assert!((d2[k] - fd2).abs() < 1e-3, "d2[{k}] {} vs {fd2}", d2[k]);
        }
    }

    #[test]
    fn test_derivative_rows_sum_to_zero() {
        let layout = Layout::new(4, 1, 1);
        let d1 = jc_matrices(&layout, &[1.0], 0.2, MatrixOrder::FirstDerivative);
        for i in 0..4 {
            let sum: f64 = d1[i * 4..i * 4 + 4].iter().sum();
            assert!(sum.abs() < 1e-12);
        }
        // Off-diagonal derivatives are positive, so no clamping happened.
        assert!(d1[1] > 0.0);
        assert!(d1[0] < 0.0);
    }

    #[test]
    fn test_size_checks() {
        let layout = Layout::new(4, 1, 2);
        let eigen = EigenDecomposition::jukes_cantor(4);
        let mut out = vec![0.0; layout.matrix_len()];
        let err = transition_matrices(&eigen, &layout, &[1.0], 0.1, MatrixOrder::Probability, &mut out)
            .unwrap_err();
        assert!(matches!(err, KernelError::SizeMismatch { what: "category rates", .. }));

        let mut short = vec![0.0; 16];
        assert!(transition_matrices(&eigen, &layout, &[1.0, 1.0], 0.1, MatrixOrder::Probability, &mut short).is_err());
    }
}
