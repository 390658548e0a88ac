// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration of root and edge partials into site log-likelihoods.
//!
//! The work is split so that several buffers, each carrying its own
//! cumulative log-scale, can be mixed without leaving log space too early:
//!
//! 1. [`root_site_likelihoods`] / [`edge_site_likelihoods`] produce the
//!    scaled per-pattern likelihood `ℓ_i(p)` of one buffer.
//! 2. [`max_log_scale`] picks the reference `R[p] = max_i S_i[p]`.
//! 3. [`accumulate_scaled`] adds `weight_i · ℓ_i(p) · e^{S_i[p] − R[p]}`.
//! 4. [`finish_log_likelihoods`] returns to log space; the derivative
//!    helpers apply the chain rule on the accumulated sums.

use crate::{Execution, KernelError, Layout, NodeData};

/// `ℓ(p) = Σ_c w_c Σ_s f[s] · x[c, p, s]`.
///
/// # Errors
/// Returns [`KernelError::SizeMismatch`] on any size disagreement.
pub fn root_site_likelihoods(
    layout: &Layout,
    root: NodeData<'_>,
    category_weights: &[f64],
    frequencies: &[f64],
    out: &mut [f64],
    exec: Execution,
) -> Result<(), KernelError> {
    root.check("root", layout)?;
    KernelError::check("category weights", layout.categories(), category_weights.len())?;
    KernelError::check("state frequencies", layout.states(), frequencies.len())?;
    layout.check_patterns("site likelihoods", out.len())?;

    exec.for_each_value(out, |p, site| {
        *site = category_weights
            .iter()
            .enumerate()
            .map(|(c, w)| {
                let inner: f64 = frequencies
                    .iter()
                    .enumerate()
                    .map(|(s, f)| f * root.value(layout, c, p, s))
                    .sum();
                w * inner
            })
            .sum();
    });
    Ok(())
}

/// `ℓ(p) = Σ_c w_c Σ_i f[i] · x_parent[c, p, i] · Σ_j M_c[i][j] · x_child[c, p, j]`.
///
/// Passing `∂P/∂t` or `∂²P/∂t²` as `matrix` yields the matching derivative
/// of `ℓ` with respect to the edge length.
///
/// # Errors
/// Returns [`KernelError::SizeMismatch`] on any size disagreement.
#[allow(clippy::too_many_arguments)]
pub fn edge_site_likelihoods(
    layout: &Layout,
    parent: NodeData<'_>,
    child: NodeData<'_>,
    matrix: &[f64],
    category_weights: &[f64],
    frequencies: &[f64],
    out: &mut [f64],
    exec: Execution,
) -> Result<(), KernelError> {
    parent.check("parent", layout)?;
    child.check("child", layout)?;
    layout.check_matrix("edge matrix", matrix)?;
    KernelError::check("category weights", layout.categories(), category_weights.len())?;
    KernelError::check("state frequencies", layout.states(), frequencies.len())?;
    layout.check_patterns("site likelihoods", out.len())?;

    let n = layout.states();
    exec.for_each_value(out, |p, site| {
        let mut total = 0.0;
        for (c, w) in category_weights.iter().enumerate() {
            let mut inner = 0.0;
            for (i, f) in frequencies.iter().enumerate() {
                let up = parent.value(layout, c, p, i);
                if up == 0.0 {
                    continue;
                }
                let off = layout.row_offset(c, i);
                inner += f * up * child.weighted_sum(layout, &matrix[off..off + n], c, p);
            }
            total += w * inner;
        }
        *site = total;
    });
    Ok(())
}

/// `out[p] = max_i scales[i][p]`, or `0.0` when `scales` is empty.
pub fn max_log_scale(scales: &[&[f64]], out: &mut [f64]) -> Result<(), KernelError> {
    for s in scales {
        KernelError::check("log scale factors", out.len(), s.len())?;
    }
    for (p, r) in out.iter_mut().enumerate() {
        *r = scales
            .iter()
            .map(|s| s[p])
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0);
    }
    Ok(())
}

/// Adds `weight · values[p] · e^{log_scale[p] − reference[p]}` into `sums`.
pub fn accumulate_scaled(
    weight: f64,
    values: &[f64],
    log_scale: &[f64],
    reference: &[f64],
    sums: &mut [f64],
) -> Result<(), KernelError> {
    KernelError::check("site values", sums.len(), values.len())?;
    KernelError::check("log scale factors", sums.len(), log_scale.len())?;
    KernelError::check("reference scale", sums.len(), reference.len())?;
    for (p, sum) in sums.iter_mut().enumerate() {
        let shift = log_scale[p] - reference[p];
        let term = weight * values[p];
        *sum += if shift == 0.0 { term } else { term * shift.exp() };
    }
    Ok(())
}

/// `out[p] = ln L[p] + R[p]`, with `−∞` wherever `L[p]` is not positive.
///
/// Returns the number of such degenerate patterns.
pub fn finish_log_likelihoods(
    sums: &[f64],
    reference: &[f64],
    out: &mut [f64],
) -> Result<usize, KernelError> {
    KernelError::check("reference scale", sums.len(), reference.len())?;
    KernelError::check("log-likelihoods", sums.len(), out.len())?;
    let mut degenerate = 0;
    for ((o, &l), &r) in out.iter_mut().zip(sums).zip(reference) {
        if l > 0.0 {
            *o = l.ln() + r;
        } else {
            *o = f64::NEG_INFINITY;
            degenerate += 1;
        }
    }
    Ok(degenerate)
}

/// `out[p] = L'[p] / L[p]`, `NaN` where `L[p]` is not positive.
pub fn first_log_derivatives(sums: &[f64], first: &[f64], out: &mut [f64]) -> Result<(), KernelError> {
    KernelError::check("first derivative sums", sums.len(), first.len())?;
    KernelError::check("first derivatives", sums.len(), out.len())?;
    for ((o, &l), &d1) in out.iter_mut().zip(sums).zip(first) {
        *o = if l > 0.0 { d1 / l } else { f64::NAN };
    }
    Ok(())
}

/// `out[p] = L''[p] / L[p] − (L'[p] / L[p])²`, `NaN` where `L[p]` is not
/// positive.
pub fn second_log_derivatives(
    sums: &[f64],
    first: &[f64],
    second: &[f64],
    out: &mut [f64],
) -> Result<(), KernelError> {
    KernelError::check("first derivative sums", sums.len(), first.len())?;
    KernelError::check("second derivative sums", sums.len(), second.len())?;
    KernelError::check("second derivatives", sums.len(), out.len())?;
    for (p, o) in out.iter_mut().enumerate() {
        let l = sums[p];
        *o = if l > 0.0 {
            let d1 = first[p] / l;
            second[p] / l - d1 * d1
        } else {
            f64::NAN
        };
    }
    Ok(())
}
