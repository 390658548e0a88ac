// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pruning operations and their flat wire format.
//!
//! On the wire an operation is five integers, in this order:
//!
//! ```text
//! { destination_partials, child1_partials, child1_matrix, child2_partials, child2_matrix }
//! ```

use crate::EngineError;
use buffer_store::{BufferKind, Dimensions};
use std::fmt;

/// Number of integers per operation in the flat format.
pub const OPERATION_WIDTH: usize = 5;

/// One node's pruning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Operation {
    pub destination_partials: usize,
    pub child1_partials: usize,
    pub child1_matrix: usize,
    pub child2_partials: usize,
    pub child2_matrix: usize,
}

impl Operation {
    /// Creates an operation; argument order matches the wire format.
    pub fn new(
        destination_partials: usize,
        child1_partials: usize,
        child1_matrix: usize,
        child2_partials: usize,
        child2_matrix: usize,
    ) -> Self {
        Self {
            destination_partials,
            child1_partials,
            child1_matrix,
            child2_partials,
            child2_matrix,
        }
    }

    /// Decodes a flat list of 5-tuples addressed to an instance of `dims`.
    ///
    /// # Errors
    /// [`EngineError::InvalidArgument`] if the length is not a multiple of
    /// five; an invalid-index store error if any index is negative or past
    /// its buffer count. Tip and aliasing rules are checked on submission.
    pub fn parse_flat(flat: &[i32], dims: &Dimensions) -> Result<Vec<Self>, EngineError> {
        if flat.len() % OPERATION_WIDTH != 0 {
            return Err(EngineError::InvalidArgument(format!(
                "operation list has {} integers, not a multiple of {OPERATION_WIDTH}",
                flat.len()
            )));
        }
        flat.chunks_exact(OPERATION_WIDTH)
            .map(|t| -> Result<Self, EngineError> {
                let partials = |v: i32| dims.resolve(BufferKind::Partials, i64::from(v));
                let matrix = |v: i32| dims.resolve(BufferKind::Matrix, i64::from(v));
                Ok(Self::new(
                    partials(t[0])?,
                    partials(t[1])?,
                    matrix(t[2])?,
                    partials(t[3])?,
                    matrix(t[4])?,
                ))
            })
            .collect()
    }

    /// Encodes operations back into the flat format.
    pub fn to_flat(operations: &[Self]) -> Vec<i32> {
        operations
            .iter()
            .flat_map(|op| {
                [
                    op.destination_partials,
                    op.child1_partials,
                    op.child1_matrix,
                    op.child2_partials,
                    op.child2_matrix,
                ]
            })
            .map(|v| v as i32)
            .collect()
    }

    /// The two children as `(partials, matrix)` pairs.
    pub fn children(&self) -> [(usize, usize); 2] {
        [
            (self.child1_partials, self.child1_matrix),
            (self.child2_partials, self.child2_matrix),
        ]
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- ({} via P{}) x ({} via P{})",
            self.destination_partials,
            self.child1_partials,
            self.child1_matrix,
            self.child2_partials,
            self.child2_matrix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dimensions {
        Dimensions::new(3, 6, 3, 4, 1, 1, 5)
    }

    #[test]
    fn test_parse_flat() {
        let ops = Operation::parse_flat(&[4, 0, 0, 1, 1, 5, 4, 4, 2, 2], &dims()).unwrap();
        assert_eq!(ops, vec![Operation::new(4, 0, 0, 1, 1), Operation::new(5, 4, 4, 2, 2)]);
        assert_eq!(Operation::to_flat(&ops), vec![4, 0, 0, 1, 1, 5, 4, 4, 2, 2]);
    }

    #[test]
    fn test_parse_flat_rejects_bad_input() {
        assert!(matches!(
            Operation::parse_flat(&[1, 2, 3], &dims()),
            Err(EngineError::InvalidArgument(_))
        ));
        let err = Operation::parse_flat(&[3, 0, -1, 1, 1], &dims()).unwrap_err();
        assert!(err.is_invalid_index());
        assert!(err.to_string().contains("matrix buffer index -1"));
        let err = Operation::parse_flat(&[6, 0, 0, 1, 1], &dims()).unwrap_err();
        assert!(err.to_string().contains("partials buffer index 6"));
        assert!(Operation::parse_flat(&[], &dims()).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Operation::new(3, 0, 0, 1, 1).to_string(), "3 <- (0 via P0) x (1 via P1)");
    }
}
