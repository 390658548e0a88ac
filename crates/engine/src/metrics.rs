// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-instance work counters and kernel timings.

use std::time::Duration;

/// Cumulative counters for one instance.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct EngineMetrics {
    /// Transition matrices written (probabilities and derivatives).
    pub matrices_computed: u64,
    /// Pruning operations executed.
    pub operations_executed: u64,
    /// Patterns divided by their maximum during propagation.
    pub patterns_rescaled: u64,
    /// Integrated sites whose likelihood was not positive.
    pub degenerate_sites: u64,
    /// Jobs handed to the backend.
    pub jobs_queued: u64,
    /// Time spent computing transition matrices.
    pub matrix_time: Duration,
    /// Time spent in pruning and rescaling.
    pub propagation_time: Duration,
    /// Time spent integrating likelihoods.
    pub integration_time: Duration,
}

impl EngineMetrics {
    pub(crate) fn record_matrices(&mut self, count: usize, elapsed: Duration) {
        self.matrices_computed += count as u64;
        self.matrix_time += elapsed;
    }

    pub(crate) fn record_operations(&mut self, count: usize, rescaled: usize, elapsed: Duration) {
        self.operations_executed += count as u64;
        self.patterns_rescaled += rescaled as u64;
        self.propagation_time += elapsed;
    }

    pub(crate) fn record_integration(&mut self, degenerate: usize, elapsed: Duration) {
        self.degenerate_sites += degenerate as u64;
        self.integration_time += elapsed;
    }

    pub(crate) fn record_job(&mut self) {
        self.jobs_queued += 1;
    }

    /// Total time spent inside kernels.
    pub fn kernel_time(&self) -> Duration {
        self.matrix_time + self.propagation_time + self.integration_time
    }

    /// Returns a one-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} matrices ({:.2}ms), {} operations ({:.2}ms, {} patterns rescaled), \
             integration {:.2}ms ({} degenerate sites), {} jobs",
            self.matrices_computed,
            self.matrix_time.as_secs_f64() * 1000.0,
            self.operations_executed,
            self.propagation_time.as_secs_f64() * 1000.0,
            self.patterns_rescaled,
            self.integration_time.as_secs_f64() * 1000.0,
            self.degenerate_sites,
            self.jobs_queued,
        )
    }
}
