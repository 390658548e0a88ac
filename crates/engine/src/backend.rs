// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution backends, one per hardware class.
//!
//! ```text
//! Instance ──submit(Job)──► Backend ──run──► InstanceState (store + workspace)
//!          ──synchronize──►    │
//!                              ├─ SerialCpu:   runs every job on submission
//!                              └─ ThreadedCpu: queues jobs, drains them on
//!                                              the next synchronize inside
//!                                              its own rayon pool
//! ```
//!
//! Jobs are validated before they reach a backend, so the only errors a
//! backend reports are its own (pool construction) or kernel size checks
//! that validation already ruled out.

use crate::{EngineConfig, EngineError, EngineMetrics, Operation};
use buffer_store::BufferStore;
use likelihood_kernels::{
    rescale_partials, transition_matrices, update_partials, Execution, MatrixOrder, ScalingPolicy,
};
use resource_registry::{HardwareClass, Resource};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

// ── Jobs ───────────────────────────────────────────────────────

/// One matrix to compute from an eigen buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MatrixRequest {
    pub matrix: usize,
    pub order: MatrixOrder,
    pub edge_length: f64,
}

/// A validated unit of deferred work.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Job {
    Matrices {
        eigen: usize,
        requests: Vec<MatrixRequest>,
    },
    Partials {
        operations: Vec<Operation>,
        rescale: bool,
    },
}

// ── Instance state ─────────────────────────────────────────────

/// Everything a job reads or writes: the store plus reusable workspaces.
#[derive(Debug)]
pub(crate) struct InstanceState {
    pub store: BufferStore,
    pub policy: ScalingPolicy,
    pub metrics: Option<EngineMetrics>,
    scratch_partials: Vec<f64>,
    scratch_scales: Vec<f64>,
    own_scales: Vec<f64>,
}

impl InstanceState {
    pub fn new(store: BufferStore, policy: ScalingPolicy, enable_metrics: bool) -> Self {
        let layout = *store.layout();
        Self {
            store,
            policy,
            metrics: enable_metrics.then(EngineMetrics::default),
            scratch_partials: vec![0.0; layout.partials_len()],
            scratch_scales: vec![0.0; layout.patterns()],
            own_scales: vec![0.0; layout.patterns()],
        }
    }

    /// Runs one job to completion.
    pub fn run(&mut self, job: Job, exec: Execution) -> Result<(), EngineError> {
        match job {
            Job::Matrices { eigen, requests } => self.compute_matrices(eigen, &requests),
            Job::Partials {
                operations,
                rescale,
            } => self.propagate(&operations, rescale, exec),
        }
    }

    fn compute_matrices(&mut self, eigen: usize, requests: &[MatrixRequest]) -> Result<(), EngineError> {
        let start = Instant::now();
        let layout = *self.store.layout();
        let rates = self.store.category_rates().to_vec();
        for req in requests {
            let (decomposition, out) = self.store.eigen_and_matrix_mut(eigen, req.matrix)?;
            transition_matrices(decomposition, &layout, &rates, req.edge_length, req.order, out)?;
        }
        if let Some(m) = self.metrics.as_mut() {
            m.record_matrices(requests.len(), start.elapsed());
        }
        Ok(())
    }

    fn propagate(&mut self, operations: &[Operation], rescale: bool, exec: Execution) -> Result<(), EngineError> {
        let start = Instant::now();
        let Self {
            store,
            policy,
            metrics,
            scratch_partials,
            scratch_scales,
            own_scales,
        } = self;
        let layout = *store.layout();
        let mut rescaled = 0;

        for op in operations {
            {
                let c1 = store.node(op.child1_partials)?;
                let c2 = store.node(op.child2_partials)?;
                let m1 = store.matrix(op.child1_matrix)?;
                let m2 = store.matrix(op.child2_matrix)?;
                update_partials(&layout, c1, m1, c2, m2, scratch_partials, exec)?;

                let s1 = store.log_scale_factors(op.child1_partials)?;
                let s2 = store.log_scale_factors(op.child2_partials)?;
                for ((s, a), b) in scratch_scales.iter_mut().zip(s1).zip(s2) {
                    *s = a + b;
                }
            }
            if rescale {
                rescaled += rescale_partials(&layout, scratch_partials, *policy, own_scales, exec)?;
                for (s, own) in scratch_scales.iter_mut().zip(own_scales.iter()) {
                    *s += own;
                }
            }
            store.commit_partials(op.destination_partials, scratch_partials, scratch_scales)?;
        }

        tracing::debug!(
            operations = operations.len(),
            rescaled,
            "propagated partials"
        );
        if let Some(m) = metrics.as_mut() {
            m.record_operations(operations.len(), rescaled, start.elapsed());
        }
        Ok(())
    }
}

// ── Backend interface ──────────────────────────────────────────

/// The seam between an instance and the hardware it was bound to.
pub(crate) trait Backend: Send + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Resource-specific setup; idempotent.
    fn warm_up(&mut self) -> Result<(), EngineError>;

    /// Runs or enqueues `job`. Jobs of one instance run in submission order.
    fn submit(&mut self, job: Job, state: &mut InstanceState) -> Result<(), EngineError>;

    /// Completes every job submitted so far.
    fn synchronize(&mut self, state: &mut InstanceState) -> Result<(), EngineError>;

    /// Jobs submitted but not yet run.
    fn pending_jobs(&self) -> usize;

    /// Pool that synchronous reads should run their kernels in, if any.
    fn thread_pool(&self) -> Option<&rayon::ThreadPool>;
}

/// Builds the backend for `resource`'s hardware class.
pub(crate) fn for_resource(
    resource: &Resource,
    config: &EngineConfig,
) -> Result<Box<dyn Backend>, EngineError> {
    match resource.hardware_class() {
        HardwareClass::Cpu | HardwareClass::VectorCpu => {
            if resource.is_asynchronous() {
                Ok(Box::new(ThreadedCpu::new(config.resolve_threads(resource.threads))))
            } else {
                Ok(Box::new(SerialCpu))
            }
        }
        HardwareClass::Gpu | HardwareClass::Fpga | HardwareClass::Heterogeneous => {
            Err(EngineError::ResourceUnavailable {
                required: resource.flags,
            })
        }
    }
}

// ── Serial CPU ─────────────────────────────────────────────────

/// Synchronous, single-threaded execution on the calling thread.
#[derive(Debug, Default)]
pub(crate) struct SerialCpu;

impl Backend for SerialCpu {
    fn name(&self) -> &'static str {
        "serial-cpu"
    }

    fn warm_up(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn submit(&mut self, job: Job, state: &mut InstanceState) -> Result<(), EngineError> {
        state.run(job, Execution::Serial)
    }

    fn synchronize(&mut self, _state: &mut InstanceState) -> Result<(), EngineError> {
        Ok(())
    }

    fn pending_jobs(&self) -> usize {
        0
    }

    fn thread_pool(&self) -> Option<&rayon::ThreadPool> {
        None
    }
}

// ── Threaded CPU ───────────────────────────────────────────────

/// Deferred execution: jobs queue up until the next synchronize, then run
/// pattern-parallel on a dedicated rayon pool.
pub(crate) struct ThreadedCpu {
    threads: usize,
    pool: Option<rayon::ThreadPool>,
    queue: VecDeque<Job>,
}

impl ThreadedCpu {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            pool: None,
            queue: VecDeque::new(),
        }
    }
}

impl fmt::Debug for ThreadedCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedCpu")
            .field("threads", &self.threads)
            .field("started", &self.pool.is_some())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Backend for ThreadedCpu {
    fn name(&self) -> &'static str {
        "threaded-cpu"
    }

    fn warm_up(&mut self) -> Result<(), EngineError> {
        if self.pool.is_none() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("likelihood-{i}"))
                .build()
                .map_err(|e| EngineError::Backend(format!("cannot start worker pool: {e}")))?;
            tracing::debug!("started {} worker threads", self.threads);
            self.pool = Some(pool);
        }
        Ok(())
    }

    fn submit(&mut self, job: Job, _state: &mut InstanceState) -> Result<(), EngineError> {
        self.queue.push_back(job);
        Ok(())
    }

    fn synchronize(&mut self, state: &mut InstanceState) -> Result<(), EngineError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        self.warm_up()?;
        let Some(pool) = self.pool.as_ref() else {
            return Err(EngineError::Backend("worker pool not started".into()));
        };
        let queue = &mut self.queue;
        let drained = queue.len();
        let result = pool.install(|| {
            while let Some(job) = queue.pop_front() {
                state.run(job, Execution::Parallel)?;
            }
            Ok::<(), EngineError>(())
        });
        if result.is_err() {
            queue.clear();
        }
        tracing::debug!(jobs = drained, "drained queued jobs");
        result
    }

    fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    fn thread_pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool.as_ref()
    }
}
