// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integer-handle surface over a process-wide [`InstanceTable`].
//!
//! Every function takes plain integers, flat slices and optional slices,
//! and reports a [`ReturnCode`] instead of an error value. Instances are
//! named by the `i32` returned from [`create_instance`]; `-1` means the
//! instance could not be created.
//!
//! Instances created here always have a single rate category. Use
//! [`InstanceTable`] directly for rate heterogeneity and for the full
//! error detail.
//!
//! One mutex guards the whole table and is held for the duration of each
//! call, kernels included, so calls from different threads run one at a
//! time even on distinct instances. Callers that want instances computing
//! in parallel should own an [`InstanceTable`] per thread.
//!
//! # Example
//! ```
//! use engine::api;
//! use engine::ReturnCode;
//!
//! let h = api::create_instance(2, 3, 2, 4, 1, 1, 2, None, 0, 0);
//! assert!(h >= 0);
//! assert_eq!(api::set_tip_states(h, 0, &[1]), ReturnCode::NoError);
//! assert_eq!(api::finalize(&[h]), ReturnCode::NoError);
//! ```

use crate::{
    EdgeOutput, EdgeQuery, EngineError, Instance, InstanceDetails, InstanceHandle, InstanceTable, Operation, ReturnCode,
};
use buffer_store::{BufferKind, Dimensions};
use resource_registry::{Resource, ResourceFlags, SelectionRequest};
use std::sync::{Mutex, MutexGuard, OnceLock};

fn table() -> MutexGuard<'static, InstanceTable> {
    static TABLE: OnceLock<Mutex<InstanceTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| Mutex::new(InstanceTable::default()))
        .lock()
        .unwrap_or_else(|poisoned| {
            tracing::warn!("instance table lock was poisoned; recovering");
            poisoned.into_inner()
        })
}

fn handle(instance: i32) -> Result<InstanceHandle, EngineError> {
    usize::try_from(instance)
        .map(InstanceHandle::from_index)
        .map_err(|_| EngineError::InvalidHandle(i64::from(instance)))
}

fn count(what: &str, value: i32) -> Result<usize, EngineError> {
    usize::try_from(value).map_err(|_| EngineError::InvalidArgument(format!("{what} {value} is negative")))
}

/// A buffer index of `kind` on `inst`; negative values are out of range.
fn index(inst: &Instance, kind: BufferKind, value: i32) -> Result<usize, EngineError> {
    Ok(inst.dimensions().resolve(kind, i64::from(value))?)
}

fn indices(inst: &Instance, kind: BufferKind, values: &[i32]) -> Result<Vec<usize>, EngineError> {
    values.iter().map(|&v| index(inst, kind, v)).collect()
}

fn optional_indices(
    inst: &Instance,
    kind: BufferKind,
    values: Option<&[i32]>,
) -> Result<Option<Vec<usize>>, EngineError> {
    values.map(|l| indices(inst, kind, l)).transpose()
}

fn outcome(call: &str, result: Result<(), EngineError>) -> ReturnCode {
    match result {
        Ok(()) => ReturnCode::NoError,
        Err(e) => {
            tracing::debug!("{call} failed: {e}");
            e.return_code()
        }
    }
}

/// Runs `f` on the live instance behind `instance`.
fn with_instance(
    call: &str,
    instance: i32,
    f: impl FnOnce(&mut Instance) -> Result<(), EngineError>,
) -> ReturnCode {
    let result = handle(instance).and_then(|h| f(table().get_mut(h)?));
    outcome(call, result)
}

// ── Resources and lifecycle ────────────────────────────────────

/// The process-wide resource list.
pub fn get_resource_list() -> &'static [Resource] {
    resource_registry::list_resources()
}

/// Creates an instance and returns its handle, or `-1` on failure.
///
/// `resource_list` restricts the candidate resources (`None` means any);
/// `preference` and `requirement` are [`ResourceFlags`] bits.
#[allow(clippy::too_many_arguments)]
pub fn create_instance(
    tip_count: i32,
    partials_buffer_count: i32,
    compact_buffer_count: i32,
    state_count: i32,
    pattern_count: i32,
    eigen_buffer_count: i32,
    matrix_buffer_count: i32,
    resource_list: Option<&[i32]>,
    preference: u32,
    requirement: u32,
) -> i32 {
    let build = || -> Result<InstanceHandle, EngineError> {
        let dims = Dimensions::new(
            count("tip count", tip_count)?,
            count("partials buffer count", partials_buffer_count)?,
            count("compact buffer count", compact_buffer_count)?,
            count("state count", state_count)?,
            count("pattern count", pattern_count)?,
            count("eigen buffer count", eigen_buffer_count)?,
            count("matrix buffer count", matrix_buffer_count)?,
        );
        let mut request = SelectionRequest::requiring(ResourceFlags::from_bits(requirement))
            .prefer(ResourceFlags::from_bits(preference));
        if let Some(ids) = resource_list {
            let ids = ids
                .iter()
                .map(|&id| count("resource id", id))
                .collect::<Result<Vec<_>, _>>()?;
            request = request.allow(ids);
        }
        table().create_instance(dims, &request)
    };
    match build() {
        Ok(h) => i32::try_from(h.index()).unwrap_or(-1),
        Err(e) => {
            tracing::debug!("create_instance failed: {e}");
            -1
        }
    }
}

/// Warms up the instance and optionally reports its binding.
pub fn initialize_instance(instance: i32, details: Option<&mut InstanceDetails>) -> ReturnCode {
    with_instance("initialize_instance", instance, |inst| {
        let info = inst.initialize()?;
        if let Some(out) = details {
            *out = info;
        }
        Ok(())
    })
}

/// Destroys every listed instance, or none if any handle is invalid.
pub fn finalize(instances: &[i32]) -> ReturnCode {
    let result = instances
        .iter()
        .map(|&i| handle(i))
        .collect::<Result<Vec<_>, _>>()
        .and_then(|hs| table().destroy_instances(&hs));
    outcome("finalize", result)
}

// ── Buffers ────────────────────────────────────────────────────

/// Overwrites a partials buffer.
pub fn set_partials(instance: i32, buffer: i32, partials: &[f64]) -> ReturnCode {
    with_instance("set_partials", instance, |inst| {
        let buffer = index(inst, BufferKind::Partials, buffer)?;
        inst.set_partials(buffer, partials)
    })
}

/// Copies a partials buffer into `out`.
pub fn get_partials(instance: i32, buffer: i32, out: &mut [f64]) -> ReturnCode {
    with_instance("get_partials", instance, |inst| {
        let buffer = index(inst, BufferKind::Partials, buffer)?;
        inst.get_partials(buffer, out)
    })
}

/// Binds a tip to compact states; `state_count` marks missing data.
pub fn set_tip_states(instance: i32, tip: i32, states: &[i32]) -> ReturnCode {
    with_instance("set_tip_states", instance, |inst| {
        let tip = index(inst, BufferKind::Tip, tip)?;
        let state_count = inst.dimensions().state_count;
        let states = states
            .iter()
            .enumerate()
            .map(|(pattern, &s)| {
                u32::try_from(s).map_err(|_| {
                    EngineError::Store(buffer_store::StoreError::InvalidState {
                        pattern,
                        state: i64::from(s),
                        state_count,
                    })
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        inst.set_tip_states(tip, &states)
    })
}

/// Stores an eigen decomposition; the matrices are row-major `S × S`.
pub fn set_eigen_decomposition(
    instance: i32,
    eigen: i32,
    eigenvectors: &[f64],
    inverse_eigenvectors: &[f64],
    eigenvalues: &[f64],
) -> ReturnCode {
    with_instance("set_eigen_decomposition", instance, |inst| {
        let eigen = index(inst, BufferKind::Eigen, eigen)?;
        inst.set_eigen_decomposition(eigen, eigenvectors, inverse_eigenvectors, eigenvalues)
    })
}

/// Injects a precomputed transition matrix.
pub fn set_transition_matrix(instance: i32, matrix: i32, data: &[f64]) -> ReturnCode {
    with_instance("set_transition_matrix", instance, |inst| {
        let matrix = index(inst, BufferKind::Matrix, matrix)?;
        inst.set_transition_matrix(matrix, data)
    })
}

// ── Computation ────────────────────────────────────────────────

/// Computes one transition matrix per edge length, plus derivatives where
/// index lists are given.
pub fn update_transition_matrices(
    instance: i32,
    eigen: i32,
    probability: &[i32],
    first_derivative: Option<&[i32]>,
    second_derivative: Option<&[i32]>,
    edge_lengths: &[f64],
) -> ReturnCode {
    with_instance("update_transition_matrices", instance, |inst| {
        let eigen = index(inst, BufferKind::Eigen, eigen)?;
        let probability = indices(inst, BufferKind::Matrix, probability)?;
        let first = optional_indices(inst, BufferKind::Matrix, first_derivative)?;
        let second = optional_indices(inst, BufferKind::Matrix, second_derivative)?;
        inst.update_transition_matrices(
            eigen,
            &probability,
            first.as_deref(),
            second.as_deref(),
            edge_lengths,
        )
    })
}

/// Runs flat 5-integer operations on every listed instance.
pub fn update_partials(instances: &[i32], operations: &[i32], rescale: bool) -> ReturnCode {
    let result = (|| {
        let handles = instances
            .iter()
            .map(|&i| handle(i))
            .collect::<Result<Vec<_>, _>>()?;
        let mut table = table();
        let mut parsed = Vec::new();
        for &h in &handles {
            parsed = Operation::parse_flat(operations, table.get(h)?.dimensions())?;
        }
        table.update_partials(&handles, &parsed, rescale)
    })();
    outcome("update_partials", result)
}

/// Site log-likelihoods at one or more root buffers.
pub fn calculate_root_log_likelihoods(
    instance: i32,
    buffers: &[i32],
    weights: &[f64],
    frequencies: &[&[f64]],
    out: &mut [f64],
) -> ReturnCode {
    with_instance("calculate_root_log_likelihoods", instance, |inst| {
        let buffers = indices(inst, BufferKind::Partials, buffers)?;
        inst.calculate_root_log_likelihoods(&buffers, weights, frequencies, out)
    })
}

/// Site log-likelihoods across edges, with optional derivatives.
#[allow(clippy::too_many_arguments)]
pub fn calculate_edge_log_likelihoods(
    instance: i32,
    parents: &[i32],
    children: &[i32],
    probability: &[i32],
    first_derivative: Option<&[i32]>,
    second_derivative: Option<&[i32]>,
    weights: &[f64],
    frequencies: &[&[f64]],
    out: &mut [f64],
    out_first: Option<&mut [f64]>,
    out_second: Option<&mut [f64]>,
) -> ReturnCode {
    with_instance("calculate_edge_log_likelihoods", instance, |inst| {
        let parents = indices(inst, BufferKind::Partials, parents)?;
        let children = indices(inst, BufferKind::Partials, children)?;
        let probability = indices(inst, BufferKind::Matrix, probability)?;
        let first = optional_indices(inst, BufferKind::Matrix, first_derivative)?;
        let second = optional_indices(inst, BufferKind::Matrix, second_derivative)?;
        let query = EdgeQuery {
            parents: &parents,
            children: &children,
            probability: &probability,
            first_derivative: first.as_deref(),
            second_derivative: second.as_deref(),
            weights,
            frequencies,
        };
        let output = EdgeOutput {
            log_likelihoods: out,
            first_derivatives: out_first,
            second_derivatives: out_second,
        };
        inst.calculate_edge_log_likelihoods(&query, output)
    })
}
