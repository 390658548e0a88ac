// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One likelihood instance: a buffer store bound to one resource.
//!
//! # Call Discipline
//!
//! - `update_*` calls validate every index and argument, then hand a job to
//!   the backend. On a synchronous resource the job has finished when the
//!   call returns; on an asynchronous one it may still be queued.
//! - Every call that reads or writes buffers directly (setters, getters,
//!   integration) first waits for all queued jobs, so it observes every
//!   earlier write.
//! - A failing call leaves every buffer untouched.

use crate::backend::{self, Backend, InstanceState, Job, MatrixRequest};
use crate::{EngineConfig, EngineError, EngineMetrics, Operation};
use buffer_store::{BufferStore, Dimensions};
use likelihood_kernels::{
    accumulate_scaled, edge_site_likelihoods, finish_log_likelihoods, first_log_derivatives,
    max_log_scale, root_site_likelihoods, second_log_derivatives, Execution, MatrixOrder,
};
use resource_registry::{Resource, ResourceFlags};
use std::time::Instant;

/// What `initialize` reports about the binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct InstanceDetails {
    /// Registry id of the bound resource.
    pub resource_id: usize,
    /// Name of the bound resource.
    pub resource_name: String,
    /// Capability flags in effect.
    pub flags: ResourceFlags,
}

/// Inputs of an edge integration. The lists are parallel, one entry per
/// parent/child pair.
#[derive(Debug, Clone, Copy)]
pub struct EdgeQuery<'a> {
    pub parents: &'a [usize],
    pub children: &'a [usize],
    pub probability: &'a [usize],
    /// `∂P/∂t` matrices; `None` skips first derivatives.
    pub first_derivative: Option<&'a [usize]>,
    /// `∂²P/∂t²` matrices; `None` skips second derivatives.
    pub second_derivative: Option<&'a [usize]>,
    pub weights: &'a [f64],
    /// One frequency vector per pair, or a single vector shared by all.
    pub frequencies: &'a [&'a [f64]],
}

/// Destinations of an edge integration. A derivative is written only when
/// its slice is present.
#[derive(Debug)]
pub struct EdgeOutput<'o> {
    pub log_likelihoods: &'o mut [f64],
    pub first_derivatives: Option<&'o mut [f64]>,
    pub second_derivatives: Option<&'o mut [f64]>,
}

impl<'o> EdgeOutput<'o> {
    /// Log-likelihoods only.
    pub fn new(log_likelihoods: &'o mut [f64]) -> Self {
        Self {
            log_likelihoods,
            first_derivatives: None,
            second_derivatives: None,
        }
    }
}

/// A buffer store plus the backend executing on it.
#[derive(Debug)]
pub struct Instance {
    resource_id: usize,
    resource: Resource,
    state: InstanceState,
    backend: Box<dyn Backend>,
    initialized: bool,
}

fn argument(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidArgument(msg.into())
}

fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), EngineError> {
    if expected == actual {
        Ok(())
    } else {
        Err(argument(format!("{what} has {actual} entries, expected {expected}")))
    }
}

/// Resolves the frequency vector for entry `i` (single vector broadcast).
fn frequencies<'a>(list: &[&'a [f64]], i: usize) -> &'a [f64] {
    if list.len() == 1 {
        list[0]
    } else {
        list[i]
    }
}

/// Runs `f` in `pool` with parallel kernels, or inline with serial ones.
fn with_kernels<R: Send>(
    pool: Option<&rayon::ThreadPool>,
    f: impl FnOnce(Execution) -> R + Send,
) -> R {
    match pool {
        Some(pool) => pool.install(|| f(Execution::Parallel)),
        None => f(Execution::Serial),
    }
}

impl Instance {
    /// Allocates the store and builds the backend for `resource`.
    pub(crate) fn new(
        resource_id: usize,
        resource: &Resource,
        dims: Dimensions,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let budget = config.parse_budget()?;
        let policy = config.scaling_policy()?;
        let backend = backend::for_resource(resource, config)?;
        let store = BufferStore::new(dims, budget)?;
        Ok(Self {
            resource_id,
            resource: resource.clone(),
            state: InstanceState::new(store, policy, config.enable_metrics),
            backend,
            initialized: false,
        })
    }

    /// Warms the backend up and reports the binding.
    pub fn initialize(&mut self) -> Result<InstanceDetails, EngineError> {
        self.backend.warm_up()?;
        if !self.initialized {
            tracing::info!(
                "instance initialized on {} ({})",
                self.resource.name,
                self.backend.name()
            );
            self.initialized = true;
        }
        Ok(self.details())
    }

    /// The binding, without warming anything up.
    pub fn details(&self) -> InstanceDetails {
        InstanceDetails {
            resource_id: self.resource_id,
            resource_name: self.resource.name.clone(),
            flags: self.resource.flags,
        }
    }

    /// The bound resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Capacities fixed at creation.
    pub fn dimensions(&self) -> &Dimensions {
        self.state.store.dimensions()
    }

    /// Counters, when metrics are enabled.
    pub fn metrics(&self) -> Option<&EngineMetrics> {
        self.state.metrics.as_ref()
    }

    /// Jobs accepted but not yet executed.
    pub fn pending_jobs(&self) -> usize {
        self.backend.pending_jobs()
    }

    /// Waits for every queued job.
    pub fn synchronize(&mut self) -> Result<(), EngineError> {
        self.backend.synchronize(&mut self.state)
    }

    fn submit(&mut self, job: Job) -> Result<(), EngineError> {
        if let Some(m) = self.state.metrics.as_mut() {
            m.record_job();
        }
        self.backend.submit(job, &mut self.state)
    }

    // ── Direct buffer access ───────────────────────────────────

    /// Binds tip `tip` to compact states (`state_count` = missing data).
    pub fn set_tip_states(&mut self, tip: usize, states: &[u32]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_tip_states(tip, states)?)
    }

    /// Overwrites a partials buffer (full, or one category replicated).
    pub fn set_partials(&mut self, index: usize, data: &[f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_partials(index, data)?)
    }

    /// Copies a partials buffer out, expanding compact tips.
    pub fn get_partials(&mut self, index: usize, out: &mut [f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.get_partials(index, out)?)
    }

    /// Copies out the cumulative log-scale factors of a partials buffer.
    pub fn get_log_scale_factors(&mut self, index: usize, out: &mut [f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        let scales = self.state.store.log_scale_factors(index)?;
        check_len("log scale output", scales.len(), out.len())?;
        out.copy_from_slice(scales);
        Ok(())
    }

    /// Stores an eigen decomposition verbatim.
    pub fn set_eigen_decomposition(
        &mut self,
        index: usize,
        eigenvectors: &[f64],
        inverse_eigenvectors: &[f64],
        eigenvalues: &[f64],
    ) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_eigen_decomposition(
            index,
            eigenvectors,
            inverse_eigenvectors,
            eigenvalues,
        )?)
    }

    /// Injects a precomputed transition matrix.
    pub fn set_transition_matrix(&mut self, index: usize, data: &[f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_transition_matrix(index, data)?)
    }

    /// Copies a transition matrix out.
    pub fn get_transition_matrix(&mut self, index: usize, out: &mut [f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.get_transition_matrix(index, out)?)
    }

    /// Sets the relative rate of each category.
    pub fn set_category_rates(&mut self, rates: &[f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_category_rates(rates)?)
    }

    /// Sets the mixture weight of each category.
    pub fn set_category_weights(&mut self, weights: &[f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_category_weights(weights)?)
    }

    /// Sets the multiplicity of each site pattern.
    pub fn set_pattern_weights(&mut self, weights: &[f64]) -> Result<(), EngineError> {
        self.synchronize()?;
        Ok(self.state.store.set_pattern_weights(weights)?)
    }

    // ── Transition matrices ────────────────────────────────────

    /// Computes `P(t)` for each edge length into `probability[i]`, and its
    /// derivatives into `first[i]` / `second[i]` when those lists are given.
    pub fn update_transition_matrices(
        &mut self,
        eigen: usize,
        probability: &[usize],
        first: Option<&[usize]>,
        second: Option<&[usize]>,
        edge_lengths: &[f64],
    ) -> Result<(), EngineError> {
        let count = edge_lengths.len();
        check_len("probability indices", count, probability.len())?;
        if let Some(first) = first {
            check_len("first derivative indices", count, first.len())?;
        }
        if let Some(second) = second {
            check_len("second derivative indices", count, second.len())?;
        }
        let store = &self.state.store;
        store.check_eigen_index(eigen)?;
        if let Some((i, t)) = edge_lengths
            .iter()
            .enumerate()
            .find(|(_, t)| !(t.is_finite() && **t >= 0.0))
        {
            return Err(argument(format!("edge length {i} is {t}")));
        }

        let mut requests = Vec::with_capacity(count * 3);
        let lists = [
            (Some(probability), MatrixOrder::Probability),
            (first, MatrixOrder::FirstDerivative),
            (second, MatrixOrder::SecondDerivative),
        ];
        for (i, &edge_length) in edge_lengths.iter().enumerate() {
            for (list, order) in &lists {
                if let Some(list) = list {
                    store.check_matrix_index(list[i])?;
                    requests.push(MatrixRequest {
                        matrix: list[i],
                        order: *order,
                        edge_length,
                    });
                }
            }
        }
        if requests.is_empty() {
            return Ok(());
        }
        self.submit(Job::Matrices { eigen, requests })
    }

    // ── Propagation ────────────────────────────────────────────

    /// Checks every index of every operation without running anything.
    pub fn validate_operations(&self, operations: &[Operation]) -> Result<(), EngineError> {
        let store = &self.state.store;
        for op in operations {
            store.check_partials_index(op.destination_partials)?;
            for (partials, matrix) in op.children() {
                store.check_partials_index(partials)?;
                store.check_matrix_index(matrix)?;
            }
        }
        Ok(())
    }

    /// Hands an already validated operation list to the backend.
    pub(crate) fn submit_operations(&mut self, operations: Vec<Operation>, rescale: bool) -> Result<(), EngineError> {
        if operations.is_empty() {
            return Ok(());
        }
        self.submit(Job::Partials {
            operations,
            rescale,
        })
    }

    /// Runs a post-order list of pruning operations, in order.
    pub fn update_partials(&mut self, operations: &[Operation], rescale: bool) -> Result<(), EngineError> {
        self.validate_operations(operations)?;
        self.submit_operations(operations.to_vec(), rescale)
    }

    // ── Integration ────────────────────────────────────────────

    fn check_frequencies(&self, count: usize, list: &[&[f64]]) -> Result<(), EngineError> {
        if list.len() != 1 && list.len() != count {
            return Err(argument(format!(
                "{} frequency vectors for {count} buffers (expected 1 or {count})",
                list.len()
            )));
        }
        let states = self.state.store.dimensions().state_count;
        for f in list {
            check_len("state frequencies", states, f.len())?;
        }
        Ok(())
    }

    /// Site log-likelihoods at one or more root buffers:
    /// `out[p] = ln Σ_i weights[i] · ℓ_i(p)` with rescaling undone.
    ///
    /// Sites whose likelihood is not positive report `−∞`.
    pub fn calculate_root_log_likelihoods(
        &mut self,
        buffers: &[usize],
        weights: &[f64],
        frequencies: &[&[f64]],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        self.synchronize()?;
        let count = buffers.len();
        if count == 0 {
            return Err(argument("no buffers to integrate"));
        }
        check_len("weights", count, weights.len())?;
        self.check_frequencies(count, frequencies)?;
        let store = &self.state.store;
        check_len("log-likelihood output", store.dimensions().pattern_count, out.len())?;
        for &b in buffers {
            store.check_partials_index(b)?;
        }

        let start = Instant::now();
        let degenerate = with_kernels(self.backend.thread_pool(), |exec| {
            let layout = store.layout();
            let patterns = layout.patterns();
            let mut site = vec![0.0; patterns];
            let mut sums = vec![0.0; patterns];
            let mut reference = vec![0.0; patterns];
            let scales = buffers
                .iter()
                .map(|&b| store.log_scale_factors(b))
                .collect::<Result<Vec<_>, _>>()?;
            max_log_scale(&scales, &mut reference)?;
            for (i, &b) in buffers.iter().enumerate() {
                root_site_likelihoods(
                    layout,
                    store.node(b)?,
                    store.category_weights(),
                    self::frequencies(frequencies, i),
                    &mut site,
                    exec,
                )?;
                accumulate_scaled(weights[i], &site, scales[i], &reference, &mut sums)?;
            }
            Ok::<_, EngineError>(finish_log_likelihoods(&sums, &reference, out)?)
        })?;
        self.after_integration(degenerate, start);
        Ok(())
    }

    /// Site log-likelihoods across one or more edges, with optional first
    /// and second derivatives with respect to the edge length.
    ///
    /// A derivative needs both its matrices and its output slice. Second
    /// derivatives also need the first-derivative matrices, since
    /// `d²/dt² ln L = L''/L − (L'/L)²`.
    pub fn calculate_edge_log_likelihoods(
        &mut self,
        query: &EdgeQuery<'_>,
        out: EdgeOutput<'_>,
    ) -> Result<(), EngineError> {
        self.synchronize()?;
        let count = query.parents.len();
        if count == 0 {
            return Err(argument("no edges to integrate"));
        }
        check_len("child indices", count, query.children.len())?;
        check_len("probability indices", count, query.probability.len())?;
        check_len("weights", count, query.weights.len())?;
        for list in [query.first_derivative, query.second_derivative].into_iter().flatten() {
            check_len("derivative indices", count, list.len())?;
        }
        self.check_frequencies(count, query.frequencies)?;

        let want_first = out.first_derivatives.is_some();
        let want_second = out.second_derivatives.is_some();
        if want_first && query.first_derivative.is_none() {
            return Err(argument("first derivatives requested without derivative matrices"));
        }
        if want_second && (query.first_derivative.is_none() || query.second_derivative.is_none()) {
            return Err(argument(
                "second derivatives need both first and second derivative matrices",
            ));
        }

        let store = &self.state.store;
        let patterns = store.dimensions().pattern_count;
        check_len("log-likelihood output", patterns, out.log_likelihoods.len())?;
        for d in [&out.first_derivatives, &out.second_derivatives].into_iter().flatten() {
            check_len("derivative output", patterns, d.len())?;
        }
        for i in 0..count {
            store.check_partials_index(query.parents[i])?;
            store.check_partials_index(query.children[i])?;
            store.check_matrix_index(query.probability[i])?;
            for list in [query.first_derivative, query.second_derivative].into_iter().flatten() {
                store.check_matrix_index(list[i])?;
            }
        }

        let start = Instant::now();
        let need_first = want_first || want_second;
        let EdgeOutput {
            log_likelihoods,
            first_derivatives,
            second_derivatives,
        } = out;
        let degenerate = with_kernels(self.backend.thread_pool(), |exec| {
            let layout = store.layout();
            let mut site = vec![0.0; patterns];
            let mut sums = [vec![0.0; patterns], vec![0.0; patterns], vec![0.0; patterns]];
            let mut reference = vec![0.0; patterns];

            let scales = (0..count)
                .map(|i| -> Result<Vec<f64>, EngineError> {
                    let parent = store.log_scale_factors(query.parents[i])?;
                    let child = store.log_scale_factors(query.children[i])?;
                    Ok(parent.iter().zip(child).map(|(a, b)| a + b).collect::<Vec<f64>>())
                })
                .collect::<Result<Vec<_>, _>>()?;
            let views: Vec<&[f64]> = scales.iter().map(Vec::as_slice).collect();
            max_log_scale(&views, &mut reference)?;

            for i in 0..count {
                let parent = store.node(query.parents[i])?;
                let child = store.node(query.children[i])?;
                let freqs = self::frequencies(query.frequencies, i);
                let matrices = [
                    Some(query.probability[i]),
                    query.first_derivative.filter(|_| need_first).map(|l| l[i]),
                    query.second_derivative.filter(|_| want_second).map(|l| l[i]),
                ];
                for (sum, matrix) in sums.iter_mut().zip(matrices) {
                    let Some(matrix) = matrix else { continue };
                    edge_site_likelihoods(
                        layout,
                        parent,
                        child,
                        store.matrix(matrix)?,
                        store.category_weights(),
                        freqs,
                        &mut site,
                        exec,
                    )?;
                    accumulate_scaled(query.weights[i], &site, &scales[i], &reference, sum)?;
                }
            }

            let [l, l1, l2] = &sums;
            let degenerate = finish_log_likelihoods(l, &reference, log_likelihoods)?;
            if let Some(d1) = first_derivatives {
                first_log_derivatives(l, l1, d1)?;
            }
            if let Some(d2) = second_derivatives {
                second_log_derivatives(l, l1, l2, d2)?;
            }
            Ok::<_, EngineError>(degenerate)
        })?;
        self.after_integration(degenerate, start);
        Ok(())
    }

    fn after_integration(&mut self, degenerate: usize, start: Instant) {
        if degenerate > 0 {
            tracing::debug!(degenerate, "sites with non-positive likelihood");
        }
        if let Some(m) = self.state.metrics.as_mut() {
            m.record_integration(degenerate, start.elapsed());
        }
    }

    /// `Σ_p pattern_weight[p] · site_log_likelihoods[p]`.
    pub fn sum_site_log_likelihoods(&self, site_log_likelihoods: &[f64]) -> Result<f64, EngineError> {
        let weights = self.state.store.pattern_weights();
        check_len("site log-likelihoods", weights.len(), site_log_likelihoods.len())?;
        Ok(weights
            .iter()
            .zip(site_log_likelihoods)
            .map(|(w, l)| w * l)
            .sum())
    }
}
