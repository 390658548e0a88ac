// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-pattern rescaling of partials against underflow.

use crate::{Execution, KernelError, Layout};
use serde::{Deserialize, Serialize};

/// Underflow threshold used when none is configured.
pub const DEFAULT_SCALING_THRESHOLD: f64 = 1e-100;

/// When a pattern is divided by its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingPolicy {
    /// Every pattern, every time.
    #[default]
    Always,
    /// Only patterns whose maximum fell below the threshold.
    BelowThreshold(f64),
}

impl ScalingPolicy {
    #[inline]
    fn applies(self, max: f64) -> bool {
        if !(max > 0.0 && max.is_finite()) {
            return false;
        }
        match self {
            Self::Always => true,
            Self::BelowThreshold(threshold) => max < threshold,
        }
    }
}

/// Divides every eligible pattern of `partials` by its maximum over states
/// and categories, writing the natural log of the divisor into
/// `log_factors[p]` (`0.0` for patterns left alone).
///
/// Returns the number of patterns rescaled. A pattern whose maximum is zero
/// or not finite is never touched.
///
/// # Errors
/// Returns [`KernelError::SizeMismatch`] if `partials` or `log_factors`
/// disagree with `layout`.
pub fn rescale_partials(
    layout: &Layout,
    partials: &mut [f64],
    policy: ScalingPolicy,
    log_factors: &mut [f64],
    exec: Execution,
) -> Result<usize, KernelError> {
    layout.check_partials("partials", partials)?;
    layout.check_patterns("log scale factors", log_factors.len())?;

    let n = layout.states();
    // Zero marks a pattern that is left alone.
    let mut divisors = vec![0.0; layout.patterns()];
    {
        let src: &[f64] = partials;
        exec.for_each_value(&mut divisors, |p, d| {
            let max = (0..layout.categories())
                .flat_map(|c| {
                    let off = layout.site_offset(c, p);
                    src[off..off + n].iter().copied()
                })
                .fold(f64::NEG_INFINITY, f64::max);
            *d = if policy.applies(max) { max } else { 0.0 };
        });
    }

    let divisors = &divisors;
    exec.for_each_chunk(partials, n, |site, values| {
        let (_, p) = layout.site(site);
        let d = divisors[p];
        // Divide rather than multiply by 1/d: the reciprocal of a subnormal
        // maximum overflows.
        if d > 0.0 {
            values.iter_mut().for_each(|v| *v /= d);
        }
    });

    let mut rescaled = 0;
    for (f, &d) in log_factors.iter_mut().zip(divisors) {
        if d > 0.0 {
            *f = d.ln();
            rescaled += 1;
        } else {
            *f = 0.0;
        }
    }
    Ok(rescaled)
}
