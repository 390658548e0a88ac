// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host CPU probing.
//!
//! Reads the online core set from `/sys/devices/system/cpu/online`, falling
//! back to counting `cpu[0-9]+` directories and finally to
//! `std::thread::available_parallelism()`. The result sizes the worker pool
//! of the threaded CPU resource.

use crate::RegistryError;
use std::path::Path;

/// Base sysfs path for CPU information.
const CPU_BASE: &str = "/sys/devices/system/cpu";

/// What the registry needs to know about the host CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HostCpu {
    /// Number of online logical cores, at least 1.
    pub online_cores: u32,
}

impl HostCpu {
    /// Probes the host, never failing: any probe error degrades to a
    /// single core.
    pub fn probe() -> Self {
        match read_online_cores() {
            Ok(online_cores) => Self { online_cores },
            Err(e) => {
                tracing::warn!("host probe failed, assuming one core: {e}");
                Self { online_cores: 1 }
            }
        }
    }
}

fn read_online_cores() -> Result<u32, RegistryError> {
    let online_path = format!("{CPU_BASE}/online");
    if let Ok(content) = std::fs::read_to_string(&online_path) {
        if let Some(count) = parse_cpu_range(content.trim()) {
            return Ok(count);
        }
    }

    if let Ok(entries) = std::fs::read_dir(CPU_BASE) {
        let count = entries
            .filter_map(|e| e.ok())
            .filter(|e| is_cpu_dir(&e.file_name().to_string_lossy()))
            .count();
        if count > 0 {
            return Ok(count as u32);
        }
    }

    if !Path::new(CPU_BASE).exists() {
        tracing::debug!("{CPU_BASE} not present, using available_parallelism");
    }

    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .map_err(|e| RegistryError::ReadError {
            path: CPU_BASE.to_string(),
            source: e,
        })
}

fn is_cpu_dir(name: &str) -> bool {
    name.len() > 3 && name.starts_with("cpu") && name[3..].chars().all(|c| c.is_ascii_digit())
}

/// Counts the cores in a kernel CPU list such as `"0-3"` or `"0,2-3"`.
pub(crate) fn parse_cpu_range(s: &str) -> Option<u32> {
    let mut total = 0u32;
    for part in s.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().ok()?;
                let end: u32 = end.trim().parse().ok()?;
                total += end.checked_sub(start)? + 1;
            }
            None => {
                let _: u32 = part.parse().ok()?;
                total += 1;
            }
        }
    }
    (total > 0).then_some(total)
}
