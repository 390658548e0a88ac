// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Resource descriptors.
//!
//! A resource is a place an instance can run. What matters for selection is
//! its capability set, not its name: callers ask "can you do double
//! precision asynchronously?" rather than "are you resource #1?".

use crate::ResourceFlags;
use std::fmt;

/// The hardware class a resource belongs to, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum HardwareClass {
    /// General-purpose CPU.
    Cpu,
    /// Vectorised CPU.
    VectorCpu,
    /// Graphics processor.
    Gpu,
    /// Field-programmable gate array.
    Fpga,
    /// Heterogeneous processor.
    Heterogeneous,
}

/// A compute resource known to the registry. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Resource {
    /// Short name, e.g. `"CPU"`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Capability bit-set.
    pub flags: ResourceFlags,
    /// Worker threads the resource may use (1 for serial resources).
    pub threads: u32,
}

impl Resource {
    /// Creates a single-threaded resource.
    pub fn new(name: impl Into<String>, description: impl Into<String>, flags: ResourceFlags) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            flags,
            threads: 1,
        }
    }

    /// Sets the worker thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Returns `true` if every flag in `required` is supported.
    pub fn supports(&self, required: ResourceFlags) -> bool {
        self.flags.contains(required)
    }

    /// Returns `true` if calls on this resource may complete asynchronously.
    pub fn is_asynchronous(&self) -> bool {
        self.flags.contains(ResourceFlags::ASYNCH)
    }

    /// Derives the hardware class. Accelerator bits win over `CPU`.
    pub fn hardware_class(&self) -> HardwareClass {
        if self.flags.contains(ResourceFlags::GPU) {
            HardwareClass::Gpu
        } else if self.flags.contains(ResourceFlags::FPGA) {
            HardwareClass::Fpga
        } else if self.flags.contains(ResourceFlags::CELL) {
            HardwareClass::Heterogeneous
        } else if self.flags.contains(ResourceFlags::SSE) {
            HardwareClass::VectorCpu
        } else {
            HardwareClass::Cpu
        }
    }
}

impl fmt::Display for HardwareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::VectorCpu => write!(f, "vector CPU"),
            Self::Gpu => write!(f, "GPU"),
            Self::Fpga => write!(f, "FPGA"),
            Self::Heterogeneous => write!(f, "heterogeneous"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.hardware_class(), self.flags)?;
        if self.threads > 1 {
            write!(f, " ({} threads)", self.threads)?;
        }
        Ok(())
    }
}
