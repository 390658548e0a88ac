// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Spectral decomposition of an instantaneous rate matrix.

use crate::KernelError;

/// `Q = V · diag(λ) · V⁻¹`, stored verbatim.
///
/// The reconstruction is a caller contract: nothing here checks that the
/// three parts actually belong to the same `Q`.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenDecomposition {
    states: usize,
    eigenvectors: Vec<f64>,
    inverse_eigenvectors: Vec<f64>,
    eigenvalues: Vec<f64>,
}

impl EigenDecomposition {
    /// Bundles the spectral parts of a `states`-state model.
    ///
    /// `eigenvectors` and `inverse_eigenvectors` are row-major
    /// `states × states`; `eigenvalues` has `states` entries.
    pub fn new(
        states: usize,
        eigenvectors: Vec<f64>,
        inverse_eigenvectors: Vec<f64>,
        eigenvalues: Vec<f64>,
    ) -> Result<Self, KernelError> {
        KernelError::check("eigenvectors", states * states, eigenvectors.len())?;
        KernelError::check("inverse eigenvectors", states * states, inverse_eigenvectors.len())?;
        KernelError::check("eigenvalues", states, eigenvalues.len())?;
        Ok(Self {
            states,
            eigenvectors,
            inverse_eigenvectors,
            eigenvalues,
        })
    }

    /// The Jukes–Cantor model on `states` states with unit mean rate.
    ///
    /// `Q = μ (J/n − I)` with `μ = n/(n−1)`; eigenvalues are `0` once and
    /// `−μ` otherwise. The eigenvectors are an orthonormal Helmert basis,
    /// so `V⁻¹ = Vᵀ`.
    pub fn jukes_cantor(states: usize) -> Self {
        let n = states;
        let nf = n as f64;
        let mut v = vec![0.0; n * n];
        // Column 0: the constant vector.
        for i in 0..n {
            v[i * n] = 1.0 / nf.sqrt();
        }
        // Column k: Helmert contrast of the first k+1 coordinates.
        for k in 1..n {
            let kf = k as f64;
            let norm = (kf * (kf + 1.0)).sqrt();
            for i in 0..k {
                v[i * n + k] = 1.0 / norm;
            }
            v[k * n + k] = -kf / norm;
        }
        let mut v_inv = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                v_inv[j * n + i] = v[i * n + j];
            }
        }
        let mu = nf / (nf - 1.0);
        let mut lambda = vec![-mu; n];
        lambda[0] = 0.0;
        Self {
            states,
            eigenvectors: v,
            inverse_eigenvectors: v_inv,
            eigenvalues: lambda,
        }
    }

    /// Number of states.
    pub fn states(&self) -> usize {
        self.states
    }

    /// Row-major `V`.
    pub fn eigenvectors(&self) -> &[f64] {
        &self.eigenvectors
    }

    /// Row-major `V⁻¹`.
    pub fn inverse_eigenvectors(&self) -> &[f64] {
        &self.inverse_eigenvectors
    }

    /// `λ`.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }
}
