// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for whole-tree evaluation: matrices, pruning and root
//! integration on a balanced tree, per backend.

use buffer_store::Dimensions;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use engine::{EngineConfig, InstanceHandle, InstanceTable, Operation};
use likelihood_kernels::EigenDecomposition;
use resource_registry::{ResourceFlags, SelectionRequest};

const TIPS: usize = 64;
const PATTERNS: usize = 2_000;
const CATEGORIES: usize = 4;

/// Post-order operations of a balanced tree over `tips` tips, with one
/// matrix per child buffer (matrix index = child index).
fn balanced_operations(tips: usize) -> (Vec<Operation>, usize) {
    let mut level: Vec<usize> = (0..tips).collect();
    let mut next = tips;
    let mut ops = Vec::with_capacity(tips - 1);
    while level.len() > 1 {
        let mut parents = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            match *pair {
                [a, b] => {
                    ops.push(Operation::new(next, a, a, b, b));
                    parents.push(next);
                    next += 1;
                }
                [a] => parents.push(a),
                _ => unreachable!(),
            }
        }
        level = parents;
    }
    (ops, next - 1)
}

fn setup(table: &mut InstanceTable, request: &SelectionRequest) -> InstanceHandle {
    let buffers = 2 * TIPS - 1;
    let dims = Dimensions::new(TIPS, buffers, TIPS, 4, PATTERNS, 1, buffers).with_categories(CATEGORIES);
    let h = table.create_instance(dims, request).unwrap();
    let inst = table.get_mut(h).unwrap();
    let jc = EigenDecomposition::jukes_cantor(4);
    inst.set_eigen_decomposition(0, jc.eigenvectors(), jc.inverse_eigenvectors(), jc.eigenvalues())
        .unwrap();
    inst.set_category_rates(&[0.1, 0.5, 1.2, 2.2]).unwrap();
    for tip in 0..TIPS {
        let states: Vec<u32> = (0..PATTERNS).map(|p| ((p * 31 + tip * 7) % 5) as u32).collect();
        inst.set_tip_states(tip, &states).unwrap();
    }
    inst.initialize().unwrap();
    h
}

fn bench_full_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_likelihood");
    group.sample_size(20);
    let (ops, root) = balanced_operations(TIPS);
    let matrices: Vec<usize> = (0..root).collect();
    let lengths: Vec<f64> = (0..root).map(|i| 0.01 + 0.002 * i as f64).collect();

    let requests = [
        ("serial", SelectionRequest::requiring(ResourceFlags::SYNCH)),
        ("threaded", SelectionRequest::requiring(ResourceFlags::ASYNCH)),
    ];
    for (name, request) in requests {
        let mut table = InstanceTable::new(EngineConfig::default());
        let h = setup(&mut table, &request);
        let mut ll = vec![0.0; PATTERNS];
        group.bench_with_input(BenchmarkId::new(name, TIPS), &TIPS, |b, _| {
            b.iter(|| {
                let inst = table.get_mut(h).unwrap();
                inst.update_transition_matrices(0, &matrices, None, None, &lengths).unwrap();
                inst.update_partials(&ops, true).unwrap();
                inst.calculate_root_log_likelihoods(&[root], &[1.0], &[&[0.25; 4]], &mut ll)
                    .unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_evaluation);
criterion_main!(benches);
