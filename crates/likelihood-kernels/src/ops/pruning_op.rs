// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The pruning step for one internal node.

use crate::{Execution, KernelError, Layout, NodeData};

/// Computes the partials of a parent from two children:
///
/// ```text
/// out[c, p, i] = (Σ_j M1[c][i][j] · x1[c, p, j]) · (Σ_j M2[c][i][j] · x2[c, p, j])
/// ```
///
/// `out` must not alias either child; callers that overwrite a child write
/// into a workspace first.
///
/// # Errors
/// Returns [`KernelError::SizeMismatch`] if any input disagrees with `layout`.
pub fn update_partials(
    layout: &Layout,
    child1: NodeData<'_>,
    matrix1: &[f64],
    child2: NodeData<'_>,
    matrix2: &[f64],
    out: &mut [f64],
    exec: Execution,
) -> Result<(), KernelError> {
    child1.check("child 1", layout)?;
    child2.check("child 2", layout)?;
    layout.check_matrix("child 1 matrix", matrix1)?;
    layout.check_matrix("child 2 matrix", matrix2)?;
    layout.check_partials("destination", out)?;

    let n = layout.states();
    exec.for_each_chunk(out, n, |site, dst| {
        let (c, p) = layout.site(site);
        for (i, d) in dst.iter_mut().enumerate() {
            let off = layout.row_offset(c, i);
            let left = child1.weighted_sum(layout, &matrix1[off..off + n], c, p);
            let right = child2.weighted_sum(layout, &matrix2[off..off + n], c, p);
            *d = left * right;
        }
    });

    Ok(())
}
