// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the likelihood engine.

use buffer_store::StoreError;
use likelihood_kernels::KernelError;
use resource_registry::ResourceFlags;

/// Outcome codes of the integer-handle API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(i32)]
pub enum ReturnCode {
    /// Success.
    NoError = 0,
    /// An allocation failed or exceeded the memory budget.
    OutOfMemoryError = 1,
    /// Any other failure.
    GeneralError = 2,
}

impl ReturnCode {
    /// The integer value callers see.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors that can occur while creating or driving an instance.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No resource satisfies the requirement flags.
    #[error("no resource provides {required}")]
    ResourceUnavailable { required: ResourceFlags },

    /// A handle that was never issued or has been destroyed.
    #[error("invalid instance handle {0}")]
    InvalidHandle(i64),

    /// Inconsistent argument lists or values.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A backend could not be brought up or failed while executing.
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A buffer-store accessor rejected the call.
    #[error("buffer store: {0}")]
    Store(#[from] StoreError),

    /// A kernel was handed mis-sized buffers.
    #[error("kernel: {0}")]
    Kernel(#[from] KernelError),
}

impl EngineError {
    /// Collapses the error into the flat API's outcome code.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Self::Store(StoreError::OutOfMemory { .. }) => ReturnCode::OutOfMemoryError,
            _ => ReturnCode::GeneralError,
        }
    }

    /// `true` for an out-of-range buffer, matrix or tip index.
    pub fn is_invalid_index(&self) -> bool {
        matches!(self, Self::Store(StoreError::InvalidIndex { .. }))
    }

    /// `true` for a tip state outside `[0, state_count]`.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Store(StoreError::InvalidState { .. }))
    }

    /// `true` for allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::Store(StoreError::OutOfMemory { .. }))
    }
}
