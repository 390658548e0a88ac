// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Evaluates a four-taxon tree under JC69 with gamma-like rate categories,
//! then fits the internal edge by Newton steps on the edge derivatives.
//!
//! ```bash
//! cargo run -p engine --example jc69_quartet
//! RUST_LOG=debug cargo run -p engine --example jc69_quartet
//! ```

use anyhow::{ensure, Context, Result};
use buffer_store::Dimensions;
use engine::{EdgeOutput, EdgeQuery, EngineConfig, InstanceTable, Operation};
use likelihood_kernels::EigenDecomposition;
use resource_registry::{ResourceFlags, SelectionRequest};
use tracing_subscriber::EnvFilter;

/// Columns of a toy alignment (A=0, C=1, G=2, T=3, -=4), one row per taxon.
const ALIGNMENT: [&str; 4] = ["ACGTACGTAA", "ACGTACGAAA", "ACTTACG-AC", "ACTTTCGTAC"];

fn encode(row: &str) -> Vec<u32> {
    row.chars()
        .map(|c| match c {
            'A' => 0,
            'C' => 1,
            'G' => 2,
            'T' => 3,
            _ => 4,
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    for (id, r) in engine::api::get_resource_list().iter().enumerate() {
        println!("resource {id}: {r}");
    }

    let patterns = ALIGNMENT[0].len();
    let mut table = InstanceTable::new(EngineConfig::default());
    // Tips 0..4, cherries 4 and 5, root 6; matrix i belongs to the edge above
    // buffer i, 6..9 hold the fitted edge and its derivatives.
    let dims = Dimensions::new(4, 7, 4, 4, patterns, 1, 9).with_categories(4);
    let request = SelectionRequest::requiring(ResourceFlags::DOUBLE).prefer(ResourceFlags::ASYNCH);
    let handle = table
        .create_instance(dims, &request)
        .context("no double-precision resource")?;
    let details = table.initialize_instance(handle)?;
    println!("bound to {} [{}]", details.resource_name, details.flags);

    let inst = table.get_mut(handle)?;
    let jc = EigenDecomposition::jukes_cantor(4);
    inst.set_eigen_decomposition(0, jc.eigenvectors(), jc.inverse_eigenvectors(), jc.eigenvalues())?;
    inst.set_category_rates(&[0.14, 0.48, 1.0, 2.38])?;
    for (tip, row) in ALIGNMENT.iter().enumerate() {
        inst.set_tip_states(tip, &encode(row))?;
    }

    let lengths = [0.05, 0.08, 0.12, 0.2, 0.1, 0.1];
    inst.update_transition_matrices(0, &[0, 1, 2, 3, 4, 5], None, None, &lengths)?;
    let ops = [
        Operation::new(4, 0, 0, 1, 1),
        Operation::new(5, 2, 2, 3, 3),
        Operation::new(6, 4, 4, 5, 5),
    ];
    inst.update_partials(&ops, true)?;

    let freqs = [0.25; 4];
    let mut site = vec![0.0; patterns];
    inst.calculate_root_log_likelihoods(&[6], &[1.0], &[&freqs], &mut site)?;
    let initial = inst.sum_site_log_likelihoods(&site)?;
    println!("ln L = {initial:.6}");

    // The root's two edges form one internal edge of length t between 4 and 5.
    let mut t = lengths[4] + lengths[5];
    let mut d1 = vec![0.0; patterns];
    let mut d2 = vec![0.0; patterns];
    let (first, second): (&[usize], &[usize]) = (&[7], &[8]);
    for step in 0..20 {
        inst.update_transition_matrices(0, &[6], Some(first), Some(second), &[t])?;
        let query = EdgeQuery {
            parents: &[4],
            children: &[5],
            probability: &[6],
            first_derivative: Some(first),
            second_derivative: Some(second),
            weights: &[1.0],
            frequencies: &[&freqs],
        };
        let out = EdgeOutput {
            log_likelihoods: &mut site,
            first_derivatives: Some(&mut d1[..]),
            second_derivatives: Some(&mut d2[..]),
        };
        inst.calculate_edge_log_likelihoods(&query, out)?;
        let g = inst.sum_site_log_likelihoods(&d1)?;
        let h = inst.sum_site_log_likelihoods(&d2)?;
        let ll = inst.sum_site_log_likelihoods(&site)?;
        println!("step {step:2}: t = {t:.6}  ln L = {ll:.6}  dlnL/dt = {g:+.3e}");
        if g.abs() < 1e-8 {
            break;
        }
        ensure!(h.is_finite(), "degenerate curvature at t = {t}");
        // Newton when concave, otherwise a plain gradient step.
        let next = if h < 0.0 { t - g / h } else { t + 0.1 * g.signum() };
        t = next.clamp(1e-8, 10.0);
    }

    if let Some(m) = inst.metrics() {
        println!("{}", m.summary());
    }
    table.destroy_instance(handle)?;
    Ok(())
}
