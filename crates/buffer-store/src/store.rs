// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The buffer store: every numeric buffer owned by one instance.
//!
//! # Index Spaces
//!
//! ```text
//! partials   0 ............ tip_count ............ partials_buffer_count
//!            └── tip slots ──┘└──── internal nodes ────┘
//!                 │
//!                 └─ optionally bound to a compact slot (0..compact_buffer_count)
//! ```
//!
//! A tip slot bound to compact states reads as expanded one-hot partials.
//! Writing dense partials into it (directly or as an operation
//! destination) releases the compact slot.
//!
//! # Capacity
//! Every buffer is allocated once in [`BufferStore::new`]. Nothing grows
//! afterwards.

use crate::{BufferKind, Dimensions, MemoryBudget, StoreError};
use likelihood_kernels::{EigenDecomposition, Layout, NodeData};

/// All buffers of one instance.
#[derive(Debug)]
pub struct BufferStore {
    dims: Dimensions,
    layout: Layout,
    footprint: usize,
    partials: Vec<Vec<f64>>,
    log_scales: Vec<Vec<f64>>,
    /// Compact slot bound to each tip.
    tip_binding: Vec<Option<usize>>,
    compact: Vec<Vec<u32>>,
    /// Tip bound to each compact slot.
    compact_owner: Vec<Option<usize>>,
    eigen: Vec<Option<EigenDecomposition>>,
    matrices: Vec<Vec<f64>>,
    category_rates: Vec<f64>,
    category_weights: Vec<f64>,
    pattern_weights: Vec<f64>,
}

fn allocate<T: Clone>(len: usize, value: T, requested: usize) -> Result<Vec<T>, StoreError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| StoreError::OutOfMemory {
        requested_bytes: requested,
        available_bytes: 0,
    })?;
    v.resize(len, value);
    Ok(v)
}

fn allocate_many<T: Clone>(
    count: usize,
    len: usize,
    value: T,
    requested: usize,
) -> Result<Vec<Vec<T>>, StoreError> {
    let mut outer = Vec::new();
    outer.try_reserve_exact(count).map_err(|_| StoreError::OutOfMemory {
        requested_bytes: requested,
        available_bytes: 0,
    })?;
    for _ in 0..count {
        outer.push(allocate(len, value.clone(), requested)?);
    }
    Ok(outer)
}

fn check_values(what: &'static str, values: &[f64]) -> Result<(), StoreError> {
    match values.iter().position(|v| !(v.is_finite() && *v >= 0.0)) {
        Some(index) => Err(StoreError::InvalidValue {
            what,
            index,
            value: values[index],
        }),
        None => Ok(()),
    }
}

/// Copies `src` into `dst`, replicating a one-block `src` across every block.
fn fill_replicated(
    what: &'static str,
    dst: &mut [f64],
    block: usize,
    src: &[f64],
) -> Result<(), StoreError> {
    if src.len() == dst.len() {
        dst.copy_from_slice(src);
    } else if src.len() == block {
        dst.chunks_exact_mut(block).for_each(|c| c.copy_from_slice(src));
    } else {
        return Err(StoreError::LengthMismatch {
            what,
            expected: dst.len(),
            actual: src.len(),
        });
    }
    Ok(())
}

impl BufferStore {
    /// Validates `dims` and allocates every buffer up front.
    ///
    /// # Errors
    /// - [`StoreError::InvalidDimensions`] for unusable dimensions.
    /// - [`StoreError::OutOfMemory`] if the footprint overflows, exceeds
    ///   `budget`, or the allocator refuses it.
    pub fn new(dims: Dimensions, budget: Option<MemoryBudget>) -> Result<Self, StoreError> {
        dims.validate()?;
        let footprint = dims.footprint_bytes().ok_or(StoreError::OutOfMemory {
            requested_bytes: usize::MAX,
            available_bytes: budget.map_or(0, |b| b.as_bytes()),
        })?;
        if let Some(budget) = budget {
            if !budget.admits(footprint) {
                return Err(StoreError::OutOfMemory {
                    requested_bytes: footprint,
                    available_bytes: budget.as_bytes(),
                });
            }
        }

        let layout = dims.layout();
        let c = dims.category_count;
        let store = Self {
            dims,
            layout,
            footprint,
            partials: allocate_many(dims.partials_buffer_count, layout.partials_len(), 0.0, footprint)?,
            log_scales: allocate_many(dims.partials_buffer_count, dims.pattern_count, 0.0, footprint)?,
            tip_binding: allocate(dims.tip_count, None, footprint)?,
            compact: allocate_many(dims.compact_buffer_count, dims.pattern_count, 0, footprint)?,
            compact_owner: allocate(dims.compact_buffer_count, None, footprint)?,
            eigen: allocate(dims.eigen_buffer_count, None, footprint)?,
            matrices: allocate_many(dims.matrix_buffer_count, layout.matrix_len(), 0.0, footprint)?,
            category_rates: allocate(c, 1.0, footprint)?,
            category_weights: allocate(c, 1.0 / c as f64, footprint)?,
            pattern_weights: allocate(dims.pattern_count, 1.0, footprint)?,
        };
        tracing::debug!(%layout, bytes = footprint, "buffer store allocated");
        Ok(store)
    }

    /// The dimensions this store was created with.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    /// The kernel layout of every partials and matrix buffer.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Bytes reserved at creation.
    pub fn footprint_bytes(&self) -> usize {
        self.footprint
    }

    // ── Index checks ─────────────────────────────────────────────

    fn check(kind: BufferKind, index: usize, count: usize) -> Result<(), StoreError> {
        if index < count {
            Ok(())
        } else {
            Err(StoreError::InvalidIndex {
                kind,
                index: i64::try_from(index).unwrap_or(i64::MAX),
                count,
            })
        }
    }

    /// Fails unless `index` names a partials buffer.
    pub fn check_partials_index(&self, index: usize) -> Result<(), StoreError> {
        Self::check(BufferKind::Partials, index, self.dims.partials_buffer_count)
    }

    /// Fails unless `index` names a transition-matrix buffer.
    pub fn check_matrix_index(&self, index: usize) -> Result<(), StoreError> {
        Self::check(BufferKind::Matrix, index, self.dims.matrix_buffer_count)
    }

    /// Fails unless `index` names an eigen buffer that has been set.
    pub fn check_eigen_index(&self, index: usize) -> Result<(), StoreError> {
        self.eigen(index).map(|_| ())
    }

    // ── Partials ─────────────────────────────────────────────────

    /// What kernels read for partials index `index`: compact states for a
    /// bound tip, the dense buffer otherwise.
    pub fn node(&self, index: usize) -> Result<NodeData<'_>, StoreError> {
        self.check_partials_index(index)?;
        match self.compact_slot(index) {
            Some(slot) => Ok(NodeData::States(&self.compact[slot])),
            None => Ok(NodeData::Partials(&self.partials[index])),
        }
    }

    /// Overwrites partials buffer `index` and resets its scale factors.
    ///
    /// Accepts a full buffer or one category's worth, which is copied into
    /// every category. A tip bound to compact states is released.
    pub fn set_partials(&mut self, index: usize, data: &[f64]) -> Result<(), StoreError> {
        self.check_partials_index(index)?;
        let block = self.layout.category_partials_len();
        fill_replicated("partials", &mut self.partials[index], block, data)?;
        self.log_scales[index].fill(0.0);
        self.release_compact(index);
        Ok(())
    }

    /// Copies partials buffer `index` into `out`, expanding compact tips.
    pub fn get_partials(&self, index: usize, out: &mut [f64]) -> Result<(), StoreError> {
        let node = self.node(index)?;
        if out.len() != self.layout.partials_len() {
            return Err(StoreError::LengthMismatch {
                what: "partials",
                expected: self.layout.partials_len(),
                actual: out.len(),
            });
        }
        match node {
            NodeData::Partials(p) => out.copy_from_slice(p),
            NodeData::States(_) => {
                let l = &self.layout;
                for c in 0..l.categories() {
                    for p in 0..l.patterns() {
                        let off = l.site_offset(c, p);
                        for s in 0..l.states() {
                            out[off + s] = node.value(l, c, p, s);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Per-pattern cumulative log-scale factors of partials buffer `index`.
    pub fn log_scale_factors(&self, index: usize) -> Result<&[f64], StoreError> {
        self.check_partials_index(index)?;
        Ok(&self.log_scales[index])
    }

    /// Stores a computed result into `index` by swapping it with `partials`
    /// and `log_scales`, which receive the previous contents.
    ///
    /// Swapping lets callers compute into a workspace while still reading the
    /// old destination, so an operation may overwrite one of its own
    /// children.
    pub fn commit_partials(
        &mut self,
        index: usize,
        partials: &mut Vec<f64>,
        log_scales: &mut Vec<f64>,
    ) -> Result<(), StoreError> {
        self.check_partials_index(index)?;
        if partials.len() != self.layout.partials_len() {
            return Err(StoreError::LengthMismatch {
                what: "partials",
                expected: self.layout.partials_len(),
                actual: partials.len(),
            });
        }
        if log_scales.len() != self.dims.pattern_count {
            return Err(StoreError::LengthMismatch {
                what: "log scale factors",
                expected: self.dims.pattern_count,
                actual: log_scales.len(),
            });
        }
        std::mem::swap(&mut self.partials[index], partials);
        std::mem::swap(&mut self.log_scales[index], log_scales);
        self.release_compact(index);
        Ok(())
    }

    // ── Compact tips ─────────────────────────────────────────────

    /// Compact slot bound to partials index `index`, if any.
    pub fn compact_slot(&self, index: usize) -> Option<usize> {
        self.tip_binding.get(index).copied().flatten()
    }

    /// The compact states of tip `tip`, if it is bound.
    pub fn tip_states(&self, tip: usize) -> Option<&[u32]> {
        self.compact_slot(tip).map(|slot| self.compact[slot].as_slice())
    }

    /// Binds tip `tip` to `states`, one per pattern, each in
    /// `0..=state_count`. `state_count` marks missing data.
    ///
    /// Reuses the tip's current compact slot or claims a free one. Nothing
    /// is stored on failure.
    pub fn set_tip_states(&mut self, tip: usize, states: &[u32]) -> Result<(), StoreError> {
        Self::check(BufferKind::Tip, tip, self.dims.tip_count)?;
        if states.len() != self.dims.pattern_count {
            return Err(StoreError::LengthMismatch {
                what: "tip states",
                expected: self.dims.pattern_count,
                actual: states.len(),
            });
        }
        let max = self.dims.state_count;
        if let Some(pattern) = states.iter().position(|&s| s as usize > max) {
            return Err(StoreError::InvalidState {
                pattern,
                state: i64::from(states[pattern]),
                state_count: max,
            });
        }

        let slot = match self.tip_binding[tip] {
            Some(slot) => slot,
            None => self
                .compact_owner
                .iter()
                .position(Option::is_none)
                .ok_or(StoreError::InvalidIndex {
                    kind: BufferKind::Compact,
                    index: i64::try_from(self.dims.compact_buffer_count).unwrap_or(i64::MAX),
                    count: self.dims.compact_buffer_count,
                })?,
        };
        self.compact[slot].copy_from_slice(states);
        self.compact_owner[slot] = Some(tip);
        self.tip_binding[tip] = Some(slot);
        self.log_scales[tip].fill(0.0);
        Ok(())
    }

    fn release_compact(&mut self, index: usize) {
        if let Some(binding) = self.tip_binding.get_mut(index) {
            if let Some(slot) = binding.take() {
                self.compact_owner[slot] = None;
            }
        }
    }

    // ── Eigen decompositions ─────────────────────────────────────

    /// Stores the spectral parts of a rate matrix verbatim.
    pub fn set_eigen_decomposition(
        &mut self,
        index: usize,
        eigenvectors: &[f64],
        inverse_eigenvectors: &[f64],
        eigenvalues: &[f64],
    ) -> Result<(), StoreError> {
        Self::check(BufferKind::Eigen, index, self.dims.eigen_buffer_count)?;
        let eigen = EigenDecomposition::new(
            self.dims.state_count,
            eigenvectors.to_vec(),
            inverse_eigenvectors.to_vec(),
            eigenvalues.to_vec(),
        )?;
        self.eigen[index] = Some(eigen);
        Ok(())
    }

    /// Eigen buffer `index`.
    pub fn eigen(&self, index: usize) -> Result<&EigenDecomposition, StoreError> {
        Self::check(BufferKind::Eigen, index, self.dims.eigen_buffer_count)?;
        self.eigen[index].as_ref().ok_or(StoreError::EmptyBuffer {
            kind: BufferKind::Eigen,
            index,
        })
    }

    // ── Transition matrices ──────────────────────────────────────

    /// Overwrites matrix buffer `index` with one `S × S` block per category,
    /// or a single block copied into every category.
    pub fn set_transition_matrix(&mut self, index: usize, data: &[f64]) -> Result<(), StoreError> {
        self.check_matrix_index(index)?;
        let block = self.layout.square_len();
        fill_replicated("transition matrix", &mut self.matrices[index], block, data)
    }

    /// Copies matrix buffer `index` into `out`.
    pub fn get_transition_matrix(&self, index: usize, out: &mut [f64]) -> Result<(), StoreError> {
        let m = self.matrix(index)?;
        if out.len() != m.len() {
            return Err(StoreError::LengthMismatch {
                what: "transition matrix",
                expected: m.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(m);
        Ok(())
    }

    /// Matrix buffer `index`.
    pub fn matrix(&self, index: usize) -> Result<&[f64], StoreError> {
        self.check_matrix_index(index)?;
        Ok(&self.matrices[index])
    }

    /// Eigen buffer `eigen` together with writable matrix buffer `matrix`.
    pub fn eigen_and_matrix_mut(
        &mut self,
        eigen: usize,
        matrix: usize,
    ) -> Result<(&EigenDecomposition, &mut [f64]), StoreError> {
        self.check_matrix_index(matrix)?;
        Self::check(BufferKind::Eigen, eigen, self.dims.eigen_buffer_count)?;
        let e = self.eigen[eigen].as_ref().ok_or(StoreError::EmptyBuffer {
            kind: BufferKind::Eigen,
            index: eigen,
        })?;
        Ok((e, &mut self.matrices[matrix]))
    }

    // ── Model-level parameters ───────────────────────────────────

    /// Relative rate of each category.
    pub fn category_rates(&self) -> &[f64] {
        &self.category_rates
    }

    /// Sets the relative rate of each category.
    pub fn set_category_rates(&mut self, rates: &[f64]) -> Result<(), StoreError> {
        Self::set_model_values("category rates", &mut self.category_rates, rates)
    }

    /// Mixture weight of each category.
    pub fn category_weights(&self) -> &[f64] {
        &self.category_weights
    }

    /// Sets the mixture weight of each category.
    pub fn set_category_weights(&mut self, weights: &[f64]) -> Result<(), StoreError> {
        Self::set_model_values("category weights", &mut self.category_weights, weights)
    }

    /// Multiplicity of each site pattern.
    pub fn pattern_weights(&self) -> &[f64] {
        &self.pattern_weights
    }

    /// Sets the multiplicity of each site pattern.
    pub fn set_pattern_weights(&mut self, weights: &[f64]) -> Result<(), StoreError> {
        Self::set_model_values("pattern weights", &mut self.pattern_weights, weights)
    }

    fn set_model_values(what: &'static str, dst: &mut [f64], src: &[f64]) -> Result<(), StoreError> {
        if src.len() != dst.len() {
            return Err(StoreError::LengthMismatch {
                what,
                expected: dst.len(),
                actual: src.len(),
            });
        }
        check_values(what, src)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
