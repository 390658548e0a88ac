// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # likelihood-kernels
//!
//! Numeric kernels for phylogenetic likelihood evaluation on flat `f64`
//! buffers.
//!
//! This crate provides:
//! - [`Layout`]: the shared `states × patterns × categories` geometry.
//! - [`EigenDecomposition`]: spectral parts of a rate matrix.
//! - [`transition_matrices`]: `P(t)` and its first two derivatives.
//! - [`update_partials`]: the pruning step, with compact tips expanded on
//!   the fly through [`NodeData`].
//! - [`rescale_partials`]: per-pattern underflow protection.
//! - Root and edge integration with log-scale bookkeeping.
//!
//! Kernels never allocate their outputs and never decide policy; the
//! buffer store and the engine own both.

mod eigen;
mod error;
mod execution;
mod layout;
mod node;
mod ops;

pub use eigen::EigenDecomposition;
pub use error::KernelError;
pub use execution::Execution;
pub use layout::Layout;
pub use node::NodeData;
pub use ops::{
    accumulate_scaled, edge_site_likelihoods, finish_log_likelihoods, first_log_derivatives,
    max_log_scale, rescale_partials, root_site_likelihoods, second_log_derivatives,
    transition_matrices, update_partials, MatrixOrder, ScalingPolicy, DEFAULT_SCALING_THRESHOLD,
};
