// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Capability-based resource selection.
//!
//! Selection order:
//! 1. Drop resources outside the caller's allow-list (if one is given).
//! 2. Drop resources missing any required flag.
//! 3. Keep the resource sharing the most flags with the preference set.
//! 4. Break ties by registry order, which is the default priority.

use crate::{Resource, ResourceFlags};

/// What an instance asks of the resource it will be bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    /// Registry ids the instance may run on; `None` means no restriction.
    pub allowed: Option<Vec<usize>>,
    /// Flags that are nice to have.
    pub preference: ResourceFlags,
    /// Flags that must all be present.
    pub requirement: ResourceFlags,
}

/// Why a resource was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The resource matched at least one preferred flag better than any other.
    Preferred,
    /// No candidate matched a preference; the highest-priority one won.
    DefaultPriority,
}

/// The outcome of a successful selection.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    /// Registry id of the chosen resource.
    pub id: usize,
    /// The chosen resource.
    pub resource: &'a Resource,
    /// Why it was chosen.
    pub reason: Reason,
}

impl SelectionRequest {
    /// A request with only required flags.
    pub fn requiring(requirement: ResourceFlags) -> Self {
        Self {
            requirement,
            ..Self::default()
        }
    }

    /// Adds preferred flags.
    #[must_use]
    pub fn prefer(mut self, preference: ResourceFlags) -> Self {
        self.preference |= preference;
        self
    }

    /// Restricts selection to the given registry ids.
    #[must_use]
    pub fn allow(mut self, ids: impl Into<Vec<usize>>) -> Self {
        self.allowed = Some(ids.into());
        self
    }
}

/// Picks the best resource for `request`, or `None` if nothing qualifies.
pub fn select<'a>(resources: &'a [Resource], request: &SelectionRequest) -> Option<Selection<'a>> {
    let mut best: Option<(usize, &Resource, u32)> = None;

    for (id, resource) in resources.iter().enumerate() {
        if let Some(allowed) = &request.allowed {
            if !allowed.contains(&id) {
                continue;
            }
        }
        if !resource.supports(request.requirement) {
            continue;
        }
        let score = resource.flags.overlap(request.preference);
        // Strictly greater: earlier (higher-priority) resources keep ties.
        if best.map_or(true, |(_, _, s)| score > s) {
            best = Some((id, resource, score));
        }
    }

    best.map(|(id, resource, score)| Selection {
        id,
        resource,
        reason: if score > 0 {
            Reason::Preferred
        } else {
            Reason::DefaultPriority
        },
    })
}
