// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory ceiling for buffer-store allocations.

use crate::StoreError;
use std::fmt;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// Longest suffixes first so `"MB"` is not read as `"B"`.
const SUFFIXES: [(&str, usize); 7] = [
    ("GB", GIB),
    ("MB", MIB),
    ("KB", KIB),
    ("G", GIB),
    ("M", MIB),
    ("K", KIB),
    ("B", 1),
];

/// An upper bound on the bytes one instance may allocate.
///
/// Serialized as a plain byte count; [`MemoryBudget::parse`] accepts the
/// human-readable forms used in configuration files.
///
/// # Examples
/// ```
/// use buffer_store::MemoryBudget;
///
/// assert_eq!(MemoryBudget::parse("512M").unwrap().as_bytes(), 512 << 20);
/// assert_eq!(MemoryBudget::parse("64kb").unwrap().to_string(), "64 KB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    /// A budget of exactly `bytes`.
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    /// A budget of `mb` mebibytes.
    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MIB }
    }

    /// The budget in bytes.
    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Whether `bytes` fits under the ceiling.
    pub fn admits(&self, bytes: usize) -> bool {
        bytes <= self.bytes
    }

    /// Parses `"<n>"`, `"<n>B"`, `"<n>K"`, `"<n>KB"`, `"<n>M"`, `"<n>MB"`,
    /// `"<n>G"` or `"<n>GB"`, case-insensitively. Zero is rejected.
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let upper = input.trim().to_ascii_uppercase();
        let (digits, unit) = SUFFIXES
            .iter()
            .find_map(|&(suffix, unit)| upper.strip_suffix(suffix).map(|d| (d, unit)))
            .unwrap_or((upper.as_str(), 1));

        let count: usize = digits
            .trim()
            .parse()
            .map_err(|_| StoreError::InvalidBudget(format!("'{input}' is not a size")))?;
        let bytes = count
            .checked_mul(unit)
            .ok_or_else(|| StoreError::InvalidBudget(format!("'{input}' overflows")))?;
        if bytes == 0 {
            return Err(StoreError::InvalidBudget("budget must be non-zero".into()));
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        match [(GIB, "GB"), (MIB, "MB"), (KIB, "KB")]
            .into_iter()
            .find(|&(unit, _)| b >= unit && b % unit == 0)
        {
            Some((unit, name)) => write!(f, "{} {name}", b / unit),
            None => write!(f, "{b} B"),
        }
    }
}
