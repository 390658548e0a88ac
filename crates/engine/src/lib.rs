// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # engine
//!
//! Coordinates phylogenetic likelihood instances: each one owns a buffer
//! store sized at creation and a backend chosen from the resource registry.
//!
//! A typical evaluation:
//! 1. `create_instance` with fixed buffer counts and capability flags.
//! 2. Load tips (`set_tip_states` / `set_partials`) and an eigen
//!    decomposition.
//! 3. `update_transition_matrices` for every edge length.
//! 4. `update_partials` with a post-order operation list.
//! 5. `calculate_root_log_likelihoods` or `calculate_edge_log_likelihoods`.
//!
//! # Surfaces
//! - [`InstanceTable`] / [`Instance`]: the typed API, with full errors.
//! - [`api`]: integer handles and [`ReturnCode`]s over a process-wide table.
//!
//! # Example
//! ```
//! use buffer_store::Dimensions;
//! use engine::{EngineConfig, InstanceTable, Operation};
//! use likelihood_kernels::EigenDecomposition;
//! use resource_registry::SelectionRequest;
//!
//! let mut table = InstanceTable::new(EngineConfig::default());
//! let h = table
//!     .create_instance(Dimensions::new(2, 3, 2, 4, 1, 1, 2), &SelectionRequest::default())
//!     .unwrap();
//! let inst = table.get_mut(h).unwrap();
//! let jc = EigenDecomposition::jukes_cantor(4);
//! inst.set_eigen_decomposition(0, jc.eigenvectors(), jc.inverse_eigenvectors(), jc.eigenvalues())
//!     .unwrap();
//! inst.set_tip_states(0, &[2]).unwrap();
//! inst.set_tip_states(1, &[2]).unwrap();
//! inst.update_transition_matrices(0, &[0, 1], None, None, &[0.05, 0.05]).unwrap();
//! inst.update_partials(&[Operation::new(2, 0, 0, 1, 1)], false).unwrap();
//!
//! let mut ll = [0.0];
//! inst.calculate_root_log_likelihoods(&[2], &[1.0], &[&[0.25; 4]], &mut ll).unwrap();
//! assert!(ll[0] < 0.25_f64.ln() && ll[0] > 0.0625_f64.ln());
//! ```

pub mod api;
mod backend;
mod config;
mod error;
mod instance;
mod metrics;
mod operation;
mod table;

pub use config::EngineConfig;
pub use error::{EngineError, ReturnCode};
pub use instance::{EdgeOutput, EdgeQuery, Instance, InstanceDetails};
pub use metrics::EngineMetrics;
pub use operation::{Operation, OPERATION_WIDTH};
pub use table::{InstanceHandle, InstanceTable};
