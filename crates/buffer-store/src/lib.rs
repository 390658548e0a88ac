// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # buffer-store
//!
//! Owned, fixed-capacity storage for everything one likelihood instance
//! computes on.
//!
//! # Key Components
//!
//! - [`Dimensions`]: buffer counts and problem size, validated once.
//! - [`BufferStore`]: partials with their log-scale factors, compact tip
//!   states, eigen decompositions, transition matrices and the model-level
//!   category and pattern weights.
//! - [`MemoryBudget`]: an optional ceiling checked before allocation.
//!
//! # Example
//! ```
//! use buffer_store::{BufferStore, Dimensions};
//!
//! // 2 tips, 3 partials buffers, 2 compact slots, DNA, 5 patterns,
//! // 1 eigen buffer, 2 matrices.
//! let dims = Dimensions::new(2, 3, 2, 4, 5, 1, 2);
//! let mut store = BufferStore::new(dims, None).unwrap();
//!
//! store.set_tip_states(0, &[0, 1, 2, 3, 4]).unwrap();
//! let mut partials = vec![0.0; 20];
//! store.get_partials(0, &mut partials).unwrap();
//! assert_eq!(&partials[..4], &[1.0, 0.0, 0.0, 0.0]);
//! assert!(store.get_partials(3, &mut partials).is_err());
//! ```

mod budget;
mod dims;
mod error;
mod store;

pub use budget::MemoryBudget;
pub use dims::Dimensions;
pub use error::{BufferKind, StoreError};
pub use store::BufferStore;
