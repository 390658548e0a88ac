// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for host probing.

/// Errors that can occur while probing the host for compute resources.
///
/// These never escape [`crate::list_resources`]; the registry falls back to
/// conservative defaults instead.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Failed to read a sysfs or procfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },
}
