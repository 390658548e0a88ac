// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The resource list and its process-wide instance.

use crate::select::{select, Selection, SelectionRequest};
use crate::{HostCpu, Resource, ResourceFlags};
use std::sync::OnceLock;

/// An ordered list of resources. Order is default selection priority.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
}

impl ResourceRegistry {
    /// Creates a registry over an explicit resource list.
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Enumerates the resources this build can execute on.
    ///
    /// - `CPU`: serial, synchronous, double precision.
    /// - `CPU-threaded`: queued, asynchronous, double precision, one worker
    ///   per online core.
    pub fn detect() -> Self {
        let host = HostCpu::probe();
        let resources = vec![
            Resource::new(
                "CPU",
                "serial double-precision CPU",
                ResourceFlags::CPU | ResourceFlags::DOUBLE | ResourceFlags::SYNCH,
            ),
            Resource::new(
                "CPU-threaded",
                "pattern-parallel double-precision CPU with deferred execution",
                ResourceFlags::CPU | ResourceFlags::DOUBLE | ResourceFlags::ASYNCH,
            )
            .with_threads(host.online_cores),
        ];
        for (id, r) in resources.iter().enumerate() {
            tracing::debug!("resource {id}: {r}");
        }
        Self { resources }
    }

    /// Returns all resources in priority order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Looks up a resource by id.
    pub fn get(&self, id: usize) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no resource is available.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Selects a resource for `request`. See [`crate::select`].
    pub fn select(&self, request: &SelectionRequest) -> Option<Selection<'_>> {
        select(&self.resources, request)
    }
}

/// The process-wide registry, detected on first use.
pub fn global() -> &'static ResourceRegistry {
    static REGISTRY: OnceLock<ResourceRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ResourceRegistry::detect)
}
