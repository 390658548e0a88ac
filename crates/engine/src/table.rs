// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Handle-addressed table of live instances.
//!
//! Handles are indices into a slot list. A destroyed slot is never handed
//! out again, so a stale handle always fails with
//! [`EngineError::InvalidHandle`] instead of reaching a newer instance.

use crate::{EngineConfig, EngineError, Instance, InstanceDetails, Operation};
use buffer_store::Dimensions;
use resource_registry::{ResourceRegistry, SelectionRequest};
use std::collections::HashSet;
use std::fmt;

/// Opaque reference to an instance in an [`InstanceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(usize);

impl InstanceHandle {
    /// The handle's integer form, as used by the flat API.
    pub fn index(self) -> usize {
        self.0
    }

    /// Rebuilds a handle from its integer form. Whether it names a live
    /// instance is checked on use.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owns every instance plus the registry they were selected from.
///
/// Handles are never reused, so the table keeps one small entry per handle
/// it has ever issued for its whole lifetime; destroying an instance frees
/// its buffers but not that entry.
#[derive(Debug)]
pub struct InstanceTable {
    registry: ResourceRegistry,
    config: EngineConfig,
    slots: Vec<Option<Instance>>,
}

impl InstanceTable {
    /// A table selecting from the process-wide registry.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(resource_registry::global().clone(), config)
    }

    /// A table selecting from an explicit registry.
    pub fn with_registry(registry: ResourceRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            slots: Vec::new(),
        }
    }

    /// The resources instances may be bound to.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Settings applied to new instances.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if no instance is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Selects a resource for `request`, allocates every buffer, and
    /// returns the new instance's handle.
    pub fn create_instance(
        &mut self,
        dims: Dimensions,
        request: &SelectionRequest,
    ) -> Result<InstanceHandle, EngineError> {
        let selection = self
            .registry
            .select(request)
            .ok_or(EngineError::ResourceUnavailable {
                required: request.requirement,
            })?;
        let instance = Instance::new(selection.id, selection.resource, dims, &self.config)?;
        let handle = InstanceHandle(self.slots.len());
        tracing::info!(
            "created instance {handle} on {} ({:?}): {} tips, {} partials, {} states, {} patterns, {} categories",
            selection.resource.name,
            selection.reason,
            dims.tip_count,
            dims.partials_buffer_count,
            dims.state_count,
            dims.pattern_count,
            dims.category_count,
        );
        self.slots.push(Some(instance));
        Ok(handle)
    }

    /// Warms up the instance's backend and reports its binding.
    pub fn initialize_instance(&mut self, handle: InstanceHandle) -> Result<InstanceDetails, EngineError> {
        self.get_mut(handle)?.initialize()
    }

    /// Releases an instance. Jobs still queued on it are discarded.
    pub fn destroy_instance(&mut self, handle: InstanceHandle) -> Result<(), EngineError> {
        let instance = self
            .slots
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(EngineError::InvalidHandle(handle.0 as i64))?;
        let pending = instance.pending_jobs();
        if pending > 0 {
            tracing::debug!("instance {handle} discarded {pending} queued jobs");
        }
        tracing::info!("destroyed instance {handle}");
        Ok(())
    }

    /// Releases every listed instance, or none if any handle is invalid.
    pub fn destroy_instances(&mut self, handles: &[InstanceHandle]) -> Result<(), EngineError> {
        for &h in handles {
            self.get(h)?;
        }
        for &h in handles {
            // A repeated handle is already gone on its second visit.
            if self.get(h).is_ok() {
                self.destroy_instance(h)?;
            }
        }
        Ok(())
    }

    /// The live instance behind `handle`.
    pub fn get(&self, handle: InstanceHandle) -> Result<&Instance, EngineError> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(EngineError::InvalidHandle(handle.0 as i64))
    }

    /// The live instance behind `handle`, mutably.
    pub fn get_mut(&mut self, handle: InstanceHandle) -> Result<&mut Instance, EngineError> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(EngineError::InvalidHandle(handle.0 as i64))
    }

    // ── Multi-instance propagation ─────────────────────────────

    /// Applies the same operation list to several instances.
    ///
    /// Every handle and every operation is checked against every instance
    /// before any instance is touched.
    pub fn update_partials(
        &mut self,
        handles: &[InstanceHandle],
        operations: &[Operation],
        rescale: bool,
    ) -> Result<(), EngineError> {
        let mut seen = HashSet::with_capacity(handles.len());
        for &h in handles {
            if !seen.insert(h) {
                return Err(EngineError::InvalidArgument(format!(
                    "instance {h} listed more than once"
                )));
            }
            self.get(h)?.validate_operations(operations)?;
        }
        for &h in handles {
            self.get_mut(h)?.submit_operations(operations.to_vec(), rescale)?;
        }
        Ok(())
    }
}

impl Default for InstanceTable {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
