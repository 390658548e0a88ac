// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Capability bit-sets.
//!
//! [`ResourceFlags`] keeps the bit values of the original C interface so a
//! flat caller can pass raw integers through [`ResourceFlags::from_bits`],
//! while Rust callers compose named constants with `|`.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of resource characteristics: precision, execution mode and
/// hardware class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ResourceFlags(u32);

impl ResourceFlags {
    /// No characteristics.
    pub const NONE: Self = Self(0);
    /// Double-precision arithmetic.
    pub const DOUBLE: Self = Self(1 << 0);
    /// Single-precision arithmetic.
    pub const SINGLE: Self = Self(1 << 1);
    /// Calls may return before their work completes.
    pub const ASYNCH: Self = Self(1 << 2);
    /// Every call completes its work before returning.
    pub const SYNCH: Self = Self(1 << 3);
    /// General-purpose CPU.
    pub const CPU: Self = Self(1 << 16);
    /// Graphics processor.
    pub const GPU: Self = Self(1 << 17);
    /// Field-programmable gate array.
    pub const FPGA: Self = Self(1 << 18);
    /// Vectorised CPU (SSE-class SIMD).
    pub const SSE: Self = Self(1 << 19);
    /// Heterogeneous (Cell-class) processor.
    pub const CELL: Self = Self(1 << 20);

    const NAMED: [(Self, &'static str); 9] = [
        (Self::DOUBLE, "DOUBLE"),
        (Self::SINGLE, "SINGLE"),
        (Self::ASYNCH, "ASYNCH"),
        (Self::SYNCH, "SYNCH"),
        (Self::CPU, "CPU"),
        (Self::GPU, "GPU"),
        (Self::FPGA, "FPGA"),
        (Self::SSE, "SSE"),
        (Self::CELL, "CELL"),
    ];

    /// Every bit this type knows about.
    pub const ALL: Self = Self(
        Self::DOUBLE.0
            | Self::SINGLE.0
            | Self::ASYNCH.0
            | Self::SYNCH.0
            | Self::CPU.0
            | Self::GPU.0
            | Self::FPGA.0
            | Self::SSE.0
            | Self::CELL.0,
    );

    /// Builds a set from raw bits, dropping bits with no meaning.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if at least one flag is shared.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Number of flags shared with `other`.
    pub const fn overlap(self, other: Self) -> u32 {
        (self.0 & other.0).count_ones()
    }

    /// Iterates the names of the set flags, lowest bit first.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for ResourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResourceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ResourceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ResourceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = self.names().collect();
        write!(f, "{}", names.join(" | "))
    }
}

impl fmt::Debug for ResourceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceFlags({self})")
    }
}
