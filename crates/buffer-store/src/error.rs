// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for buffer storage.

use likelihood_kernels::KernelError;
use std::fmt;

/// The family of buffer an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Dense partials buffers.
    Partials,
    /// Tip slots (the first `tip_count` partials indices).
    Tip,
    /// Compact state buffers.
    Compact,
    /// Eigen-decomposition buffers.
    Eigen,
    /// Transition-matrix buffers.
    Matrix,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Partials => "partials buffer",
            Self::Tip => "tip",
            Self::Compact => "compact buffer",
            Self::Eigen => "eigen buffer",
            Self::Matrix => "matrix buffer",
        };
        f.write_str(name)
    }
}

/// Errors raised by [`BufferStore`](crate::BufferStore) accessors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// An index outside the capacity declared at creation.
    #[error("{kind} index {index} out of range (count {count})")]
    InvalidIndex {
        kind: BufferKind,
        index: i64,
        count: usize,
    },

    /// A tip state outside `[0, state_count]`.
    #[error("invalid state {state} at pattern {pattern} (valid: 0..={state_count})")]
    InvalidState {
        pattern: usize,
        state: i64,
        state_count: usize,
    },

    /// Input or output slice of the wrong length.
    #[error("length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A model parameter that must be finite and non-negative.
    #[error("invalid {what} at position {index}: {value}")]
    InvalidValue {
        what: &'static str,
        index: usize,
        value: f64,
    },

    /// Reading a buffer that was never written.
    #[error("{kind} {index} has not been set")]
    EmptyBuffer { kind: BufferKind, index: usize },

    /// Allocation refused by the allocator or by the memory budget.
    #[error("out of memory: requested {requested_bytes} bytes, {available_bytes} available")]
    OutOfMemory {
        requested_bytes: usize,
        available_bytes: usize,
    },

    /// Creation-time dimensions that cannot describe a valid instance.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// A memory budget string that could not be parsed.
    #[error("invalid memory budget: {0}")]
    InvalidBudget(String),
}

impl From<KernelError> for StoreError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::SizeMismatch {
                what,
                expected,
                actual,
            } => Self::LengthMismatch {
                what,
                expected,
                actual,
            },
        }
    }
}
