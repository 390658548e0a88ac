// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # resource-registry
//!
//! Enumerates the compute resources a likelihood instance can be bound to
//! and picks one from a caller's required and preferred capabilities.
//!
//! The list is computed once per process and cached; it is read-only
//! afterwards, so no teardown is needed. "No resources" is an empty list,
//! not an error.
//!
//! # Example
//! ```
//! use resource_registry::{list_resources, ResourceFlags, SelectionRequest};
//!
//! for (id, r) in list_resources().iter().enumerate() {
//!     println!("{id}: {r}");
//! }
//!
//! let req = SelectionRequest::requiring(ResourceFlags::DOUBLE).prefer(ResourceFlags::ASYNCH);
//! let chosen = resource_registry::global().select(&req).expect("a CPU is always listed");
//! assert!(chosen.resource.supports(ResourceFlags::DOUBLE));
//! ```

mod error;
mod flags;
mod host;
mod registry;
mod resource;
pub mod select;

pub use error::RegistryError;
pub use flags::ResourceFlags;
pub use host::HostCpu;
pub use registry::{global, ResourceRegistry};
pub use resource::{HardwareClass, Resource};
pub use select::{Reason, Selection, SelectionRequest};

/// Returns the process-wide resource list, detecting it on first call.
pub fn list_resources() -> &'static [Resource] {
    global().resources()
}
