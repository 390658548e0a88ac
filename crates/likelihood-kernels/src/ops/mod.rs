// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Likelihood kernels.
//!
//! Every kernel writes into a caller-provided output slice and validates
//! sizes against a [`Layout`](crate::Layout) before touching it.

mod integrate_op;
mod pruning_op;
mod scaling_op;
mod transition_op;

pub use integrate_op::{
    accumulate_scaled, edge_site_likelihoods, finish_log_likelihoods, first_log_derivatives,
    max_log_scale, root_site_likelihoods, second_log_derivatives,
};
pub use pruning_op::update_partials;
pub use scaling_op::{rescale_partials, ScalingPolicy, DEFAULT_SCALING_THRESHOLD};
pub use transition_op::{transition_matrices, MatrixOrder};
