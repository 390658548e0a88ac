// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: whole-tree evaluation through the public surfaces.
//!
//! Trees are built by hand from tip states, JC69 matrices and post-order
//! operation lists, then checked against closed forms or an independent
//! log-space pruning reference.

use buffer_store::Dimensions;
use engine::{api, EdgeOutput, EdgeQuery, EngineConfig, EngineError, InstanceHandle, InstanceTable, Operation, ReturnCode};
use likelihood_kernels::EigenDecomposition;
use resource_registry::{Resource, ResourceFlags, ResourceRegistry, SelectionRequest};

// ── Helpers ────────────────────────────────────────────────────

const FREQS: [f64; 4] = [0.25; 4];

fn registry() -> ResourceRegistry {
    ResourceRegistry::new(vec![
        Resource::new("CPU", "serial", ResourceFlags::CPU | ResourceFlags::DOUBLE | ResourceFlags::SYNCH),
        Resource::new("CPU-threaded", "pool", ResourceFlags::CPU | ResourceFlags::DOUBLE | ResourceFlags::ASYNCH)
            .with_threads(3),
    ])
}

fn table_with(config: EngineConfig) -> InstanceTable {
    InstanceTable::with_registry(registry(), config)
}

fn table() -> InstanceTable {
    table_with(EngineConfig::default())
}

/// Creates an instance and loads the JC69 decomposition into eigen buffer 0.
fn jc_instance(table: &mut InstanceTable, dims: Dimensions, request: &SelectionRequest) -> InstanceHandle {
    let h = table.create_instance(dims, request).unwrap();
    let jc = EigenDecomposition::jukes_cantor(dims.state_count);
    table
        .get_mut(h)
        .unwrap()
        .set_eigen_decomposition(0, jc.eigenvectors(), jc.inverse_eigenvectors(), jc.eigenvalues())
        .unwrap();
    h
}

/// JC69 transition probabilities for DNA.
fn jc_matrix(t: f64) -> [[f64; 4]; 4] {
    let e = (-4.0 * t / 3.0).exp();
    let same = 0.25 + 0.75 * e;
    let diff = 0.25 - 0.25 * e;
    let mut m = [[diff; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = same;
    }
    m
}

fn log_sum_exp(values: impl IntoIterator<Item = f64>) -> f64 {
    let v: Vec<f64> = values.into_iter().collect();
    let m = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if m == f64::NEG_INFINITY {
        return m;
    }
    m + v.iter().map(|x| (x - m).exp()).sum::<f64>().ln()
}

/// Log-space pruning over a caterpillar whose every edge has length `t`.
fn caterpillar_reference(states: &[u32], t: f64) -> f64 {
    let p = jc_matrix(t);
    let tip = |s: u32| -> [f64; 4] {
        let mut x = [f64::NEG_INFINITY; 4];
        if s >= 4 {
            x = [0.0; 4];
        } else {
            x[s as usize] = 0.0;
        }
        x
    };
    let branch = |x: &[f64; 4], s: usize| log_sum_exp((0..4).map(|j| p[s][j].ln() + x[j]));
    let join = |a: &[f64; 4], b: &[f64; 4]| -> [f64; 4] {
        let mut out = [0.0; 4];
        for (s, o) in out.iter_mut().enumerate() {
            *o = branch(a, s) + branch(b, s);
        }
        out
    };

    let mut node = join(&tip(states[0]), &tip(states[1]));
    for &s in &states[2..] {
        node = join(&node, &tip(s));
    }
    log_sum_exp(node.iter().map(|x| 0.25_f64.ln() + x))
}

/// Post-order operations for a caterpillar over `tips` tips, every edge
/// using matrix 0. The root is buffer `2 * tips - 2`.
fn caterpillar_operations(tips: usize) -> Vec<Operation> {
    let mut ops = vec![Operation::new(tips, 0, 0, 1, 0)];
    for k in 2..tips {
        let dst = tips + k - 1;
        ops.push(Operation::new(dst, dst - 1, 0, k, 0));
    }
    ops
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn test_star_with_identity_matrices() {
    let mut t = table();
    let h = t
        .create_instance(Dimensions::new(3, 5, 3, 4, 1, 1, 1), &SelectionRequest::default())
        .unwrap();
    let inst = t.get_mut(h).unwrap();
    let mut identity = [0.0; 16];
    for i in 0..4 {
        identity[i * 4 + i] = 1.0;
    }
    inst.set_transition_matrix(0, &identity).unwrap();
    for tip in 0..3 {
        inst.set_tip_states(tip, &[0]).unwrap();
    }
    // Star as two binary joins, all through the identity matrix.
    inst.update_partials(&[Operation::new(3, 0, 0, 1, 0), Operation::new(4, 3, 0, 2, 0)], false)
        .unwrap();

    let mut ll = [0.0];
    inst.calculate_root_log_likelihoods(&[4], &[1.0], &[&FREQS], &mut ll)
        .unwrap();
    assert!((ll[0] - 0.25_f64.ln()).abs() < 1e-14);
}

#[test]
fn test_gpu_requirement_is_unavailable() {
    let mut t = table();
    let err = t
        .create_instance(
            Dimensions::new(3, 5, 3, 4, 1, 1, 1),
            &SelectionRequest::requiring(ResourceFlags::GPU),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::ResourceUnavailable { .. }));
    assert_eq!(err.return_code(), ReturnCode::GeneralError);

    let handle = api::create_instance(3, 5, 3, 4, 1, 1, 1, None, 0, ResourceFlags::GPU.bits());
    assert_eq!(handle, -1);
}

#[test]
fn test_get_partials_one_past_the_end() {
    let mut t = table();
    let h = t
        .create_instance(Dimensions::new(3, 5, 3, 4, 2, 1, 1), &SelectionRequest::default())
        .unwrap();
    let mut out = vec![0.0; 8];
    let err = t.get_mut(h).unwrap().get_partials(5, &mut out).unwrap_err();
    assert!(err.is_invalid_index());
    assert!(t.get_mut(h).unwrap().get_partials(4, &mut out).is_ok());
}

// ── Rescaling ──────────────────────────────────────────────────

fn caterpillar_log_likelihoods(config: EngineConfig, rescale: bool) -> (Vec<f64>, Vec<Vec<u32>>) {
    const TIPS: usize = 2000;
    const PATTERNS: usize = 3;
    let mut t = table_with(config);
    let dims = Dimensions::new(TIPS, 2 * TIPS - 1, TIPS, 4, PATTERNS, 1, 1);
    let h = jc_instance(&mut t, dims, &SelectionRequest::default());
    let inst = t.get_mut(h).unwrap();

    let columns: Vec<Vec<u32>> = vec![
        (0..TIPS).map(|i| (i % 4) as u32).collect(),
        // Every tenth tip is missing data.
        (0..TIPS)
            .map(|i| if i % 10 == 0 { 4 } else { ((i / 3) % 4) as u32 })
            .collect(),
        vec![2; TIPS],
    ];
    for tip in 0..TIPS {
        let states: Vec<u32> = columns.iter().map(|c| c[tip]).collect();
        inst.set_tip_states(tip, &states).unwrap();
    }
    inst.update_transition_matrices(0, &[0], None, None, &[1.0]).unwrap();
    inst.update_partials(&caterpillar_operations(TIPS), rescale).unwrap();

    let mut ll = vec![0.0; PATTERNS];
    inst.calculate_root_log_likelihoods(&[2 * TIPS - 2], &[1.0], &[&FREQS], &mut ll)
        .unwrap();
    (ll, columns)
}

#[test]
fn test_deep_caterpillar_rescaled_matches_log_space_reference() {
    let (ll, columns) = caterpillar_log_likelihoods(EngineConfig::default(), true);
    for (p, column) in columns.iter().enumerate() {
        let expected = caterpillar_reference(column, 1.0);
        assert!(expected < -1000.0, "pattern {p} does not underflow: {expected}");
        assert!(
            (ll[p] - expected).abs() < 1e-8 * expected.abs(),
            "pattern {p}: {} vs {expected}",
            ll[p]
        );
    }
}

#[test]
fn test_deep_caterpillar_without_rescaling_underflows() {
    let (ll, _) = caterpillar_log_likelihoods(EngineConfig::default(), false);
    assert!(ll.iter().all(|&v| v == f64::NEG_INFINITY), "{ll:?}");
}

#[test]
fn test_threshold_scaling_matches_always() {
    let config = EngineConfig::from_toml("scaling = \"threshold\"\nscaling_threshold = 1e-100\n").unwrap();
    let (threshold, _) = caterpillar_log_likelihoods(config, true);
    let (always, _) = caterpillar_log_likelihoods(EngineConfig::default(), true);
    for (a, b) in threshold.iter().zip(&always) {
        assert!((a - b).abs() < 1e-8 * b.abs(), "{a} vs {b}");
    }
}

/// Root log-likelihood of two dense tips at `[1e-155, 0, 0, 0]` joined
/// through identity matrices; the parent's only entry is subnormal.
fn subnormal_cherry(config: EngineConfig, rescale: bool) -> (f64, Vec<f64>) {
    let mut t = table_with(config);
    let h = t
        .create_instance(Dimensions::new(2, 3, 0, 4, 1, 1, 1), &SelectionRequest::default())
        .unwrap();
    let inst = t.get_mut(h).unwrap();
    let mut identity = [0.0; 16];
    for i in 0..4 {
        identity[i * 4 + i] = 1.0;
    }
    inst.set_transition_matrix(0, &identity).unwrap();
    inst.set_partials(0, &[1e-155, 0.0, 0.0, 0.0]).unwrap();
    inst.set_partials(1, &[1e-155, 0.0, 0.0, 0.0]).unwrap();
    inst.update_partials(&[Operation::new(2, 0, 0, 1, 0)], rescale).unwrap();

    let mut partials = vec![0.0; 4];
    inst.get_partials(2, &mut partials).unwrap();
    let mut ll = [0.0];
    inst.calculate_root_log_likelihoods(&[2], &[1.0], &[&FREQS], &mut ll)
        .unwrap();
    assert_eq!(inst.metrics().unwrap().degenerate_sites, 0);
    (ll[0], partials)
}

#[test]
fn test_subnormal_partials_rescale_transparently() {
    let (unscaled, raw) = subnormal_cherry(EngineConfig::default(), false);
    assert!(raw[0] > 0.0 && raw[0] < f64::MIN_POSITIVE, "{raw:?}");
    let expected = 0.25_f64.ln() + 2.0 * 1e-155_f64.ln();
    assert!((unscaled - expected).abs() < 1e-9 * expected.abs(), "{unscaled} vs {expected}");

    let threshold = EngineConfig::from_toml("scaling = \"threshold\"\nscaling_threshold = 1e-100\n").unwrap();
    for config in [EngineConfig::default(), threshold] {
        let (rescaled, partials) = subnormal_cherry(config, true);
        assert_eq!(partials, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(
            (rescaled - unscaled).abs() < 1e-12 * unscaled.abs(),
            "rescaled {rescaled} vs unscaled {unscaled}"
        );
    }
}

// ── Propagation properties ─────────────────────────────────────

/// Four tips with dense and compact data, two rate categories.
fn quartet(t: &mut InstanceTable, request: &SelectionRequest) -> InstanceHandle {
    let dims = Dimensions::new(4, 7, 4, 4, 3, 1, 6).with_categories(2);
    let h = jc_instance(t, dims, request);
    let inst = t.get_mut(h).unwrap();
    inst.set_category_rates(&[0.4, 1.6]).unwrap();
    inst.set_category_weights(&[0.5, 0.5]).unwrap();
    inst.set_tip_states(0, &[0, 1, 4]).unwrap();
    inst.set_tip_states(1, &[0, 2, 3]).unwrap();
    // One category's worth, replicated.
    let dense = [
        0.9, 0.1, 0.0, 0.0, //
        0.2, 0.2, 0.3, 0.3, //
        0.0, 0.0, 0.0, 1.0,
    ];
    inst.set_partials(2, &dense).unwrap();
    inst.set_tip_states(3, &[1, 1, 3]).unwrap();
    inst.update_transition_matrices(0, &[0, 1, 2, 3, 4], None, None, &[0.1, 0.2, 0.05, 0.3, 0.15])
        .unwrap();
    h
}

fn quartet_operations() -> Vec<Operation> {
    vec![
        Operation::new(4, 0, 0, 1, 1),
        Operation::new(5, 2, 2, 3, 3),
        Operation::new(6, 4, 4, 5, 4),
    ]
}

fn root_log_likelihoods(t: &mut InstanceTable, h: InstanceHandle, root: usize) -> Vec<f64> {
    let mut ll = vec![0.0; 3];
    t.get_mut(h)
        .unwrap()
        .calculate_root_log_likelihoods(&[root], &[1.0], &[&FREQS], &mut ll)
        .unwrap();
    ll
}

#[test]
fn test_child_order_does_not_matter() {
    let mut t = table();
    let a = quartet(&mut t, &SelectionRequest::default());
    let b = quartet(&mut t, &SelectionRequest::default());
    t.get_mut(a).unwrap().update_partials(&quartet_operations(), true).unwrap();
    let swapped: Vec<Operation> = quartet_operations()
        .into_iter()
        .map(|op| {
            Operation::new(
                op.destination_partials,
                op.child2_partials,
                op.child2_matrix,
                op.child1_partials,
                op.child1_matrix,
            )
        })
        .collect();
    t.get_mut(b).unwrap().update_partials(&swapped, true).unwrap();

    for buffer in 4..7 {
        let mut pa = vec![0.0; 24];
        let mut pb = vec![0.0; 24];
        t.get_mut(a).unwrap().get_partials(buffer, &mut pa).unwrap();
        t.get_mut(b).unwrap().get_partials(buffer, &mut pb).unwrap();
        for (x, y) in pa.iter().zip(&pb) {
            assert!((x - y).abs() < 1e-15, "buffer {buffer}: {x} vs {y}");
        }
    }
    let la = root_log_likelihoods(&mut t, a, 6);
    let lb = root_log_likelihoods(&mut t, b, 6);
    for (x, y) in la.iter().zip(&lb) {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn test_destination_may_alias_a_child() {
    let mut t = table();
    let a = quartet(&mut t, &SelectionRequest::default());
    let b = quartet(&mut t, &SelectionRequest::default());

    // a: 4 = (0, 1); 5 = (4, 2). b: 4 = (0, 1); 4 = (4, 2).
    t.get_mut(a)
        .unwrap()
        .update_partials(&[Operation::new(4, 0, 0, 1, 1), Operation::new(5, 4, 4, 2, 2)], true)
        .unwrap();
    t.get_mut(b)
        .unwrap()
        .update_partials(&[Operation::new(4, 0, 0, 1, 1), Operation::new(4, 4, 4, 2, 2)], true)
        .unwrap();

    let mut expected = vec![0.0; 24];
    let mut aliased = vec![0.0; 24];
    t.get_mut(a).unwrap().get_partials(5, &mut expected).unwrap();
    t.get_mut(b).unwrap().get_partials(4, &mut aliased).unwrap();
    assert_eq!(expected, aliased);

    let mut se = vec![0.0; 3];
    let mut sa = vec![0.0; 3];
    t.get_mut(a).unwrap().get_log_scale_factors(5, &mut se).unwrap();
    t.get_mut(b).unwrap().get_log_scale_factors(4, &mut sa).unwrap();
    assert_eq!(se, sa);
}

#[test]
fn test_queued_backend_matches_serial() {
    let mut t = table();
    let serial = quartet(&mut t, &SelectionRequest::default());
    let queued = quartet(&mut t, &SelectionRequest::default().prefer(ResourceFlags::ASYNCH));
    assert_eq!(t.initialize_instance(queued).unwrap().resource_name, "CPU-threaded");

    t.get_mut(serial).unwrap().update_partials(&quartet_operations(), true).unwrap();
    let inst = t.get_mut(queued).unwrap();
    inst.update_partials(&quartet_operations(), true).unwrap();
    // Matrices and partials are both still waiting.
    assert_eq!(inst.pending_jobs(), 2);

    let expected = root_log_likelihoods(&mut t, serial, 6);
    let actual = root_log_likelihoods(&mut t, queued, 6);
    assert_eq!(t.get(queued).unwrap().pending_jobs(), 0);
    for (x, y) in expected.iter().zip(&actual) {
        assert!((x - y).abs() < 1e-12, "{x} vs {y}");
    }
}

#[test]
fn test_multi_instance_update_is_all_or_nothing() {
    let mut t = table();
    let big = quartet(&mut t, &SelectionRequest::default());
    let small = {
        let dims = Dimensions::new(4, 5, 4, 4, 3, 1, 6).with_categories(2);
        jc_instance(&mut t, dims, &SelectionRequest::default())
    };

    // Buffer 6 exists only in `big`.
    let err = t.update_partials(&[big, small], &quartet_operations(), false).unwrap_err();
    assert!(err.is_invalid_index());
    let mut out = vec![0.0; 24];
    t.get_mut(big).unwrap().get_partials(4, &mut out).unwrap();
    assert!(out.iter().all(|&v| v == 0.0), "big was modified");

    let err = t
        .update_partials(&[big, InstanceHandle::from_index(99)], &quartet_operations(), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidHandle(99)));

    t.update_partials(&[big], &quartet_operations(), false).unwrap();
    t.get_mut(big).unwrap().get_partials(4, &mut out).unwrap();
    assert!(out.iter().any(|&v| v > 0.0));
}

// ── Integration ────────────────────────────────────────────────

#[test]
fn test_edge_derivatives_match_finite_differences() {
    let mut t = table();
    let h = quartet(&mut t, &SelectionRequest::default());
    let inst = t.get_mut(h).unwrap();
    // Integrate across the edge joining cherry 4 (tips 0, 1) and cherry 5
    // (tips 2, 3), matrix 4 carrying its length.
    inst.update_partials(&quartet_operations()[..2], true).unwrap();

    let edge = 0.25;
    let step = 1e-4;
    // Matrix 5 takes dP/dt; matrix 2 is reused for d²P/dt².
    let (first, second): (&[usize], &[usize]) = (&[5], &[2]);
    inst.update_transition_matrices(0, &[4], Some(first), None, &[edge]).unwrap();
    let mut unused = [0.0; 3];
    let mut ll = [0.0; 3];
    let mut d1 = [0.0; 3];
    let mut d2 = [0.0; 3];

    let query = |probability: &'static [usize]| EdgeQuery {
        parents: &[4],
        children: &[5],
        probability,
        first_derivative: Some(first),
        second_derivative: Some(second),
        weights: &[1.0],
        frequencies: &[&FREQS],
    };

    // Second derivatives without first-derivative matrices are refused.
    let partial = EdgeQuery {
        first_derivative: None,
        ..query(&[4])
    };
    let out = EdgeOutput {
        log_likelihoods: &mut ll,
        first_derivatives: None,
        second_derivatives: Some(&mut unused[..]),
    };
    assert!(matches!(
        inst.calculate_edge_log_likelihoods(&partial, out),
        Err(EngineError::InvalidArgument(_))
    ));

    inst.update_transition_matrices(0, &[4], Some(first), Some(second), &[edge])
        .unwrap();
    let out = EdgeOutput {
        log_likelihoods: &mut ll,
        first_derivatives: Some(&mut d1[..]),
        second_derivatives: Some(&mut d2[..]),
    };
    inst.calculate_edge_log_likelihoods(&query(&[4]), out).unwrap();

    let at = |inst: &mut engine::Instance, length: f64| -> [f64; 3] {
        inst.update_transition_matrices(0, &[3], None, None, &[length]).unwrap();
        let mut out = [0.0; 3];
        inst.calculate_edge_log_likelihoods(&query(&[3]), EdgeOutput::new(&mut out))
            .unwrap();
        out
    };
    let lo = at(inst, edge - step);
    let mid = at(inst, edge);
    let hi = at(inst, edge + step);

    for p in 0..3 {
        assert!((mid[p] - ll[p]).abs() < 1e-12);
        let fd1 = (hi[p] - lo[p]) / (2.0 * step);
        let fd2 = (hi[p] - 2.0 * mid[p] + lo[p]) / (step * step);
        assert!((d1[p] - fd1).abs() < 1e-6, "pattern {p}: d1 {} vs {fd1}", d1[p]);
        assert!((d2[p] - fd2).abs() < 1e-3, "pattern {p}: d2 {} vs {fd2}", d2[p]);
    }
}

#[test]
fn test_edge_and_root_agree_on_a_rooted_quartet() {
    let mut t = table();
    let h = quartet(&mut t, &SelectionRequest::default());
    t.get_mut(h).unwrap().update_partials(&quartet_operations(), true).unwrap();
    let root = root_log_likelihoods(&mut t, h, 6);

    // Splitting the root's two edges (0.15 and 0.15) into one 0.3 edge.
    let inst = t.get_mut(h).unwrap();
    inst.update_transition_matrices(0, &[5], None, None, &[0.3]).unwrap();
    let mut edge = [0.0; 3];
    let query = EdgeQuery {
        parents: &[4],
        children: &[5],
        probability: &[5],
        first_derivative: None,
        second_derivative: None,
        weights: &[1.0],
        frequencies: &[&FREQS],
    };
    inst.calculate_edge_log_likelihoods(&query, EdgeOutput::new(&mut edge))
        .unwrap();
    for p in 0..3 {
        assert!((root[p] - edge[p]).abs() < 1e-10, "pattern {p}: {} vs {}", root[p], edge[p]);
    }
}

#[test]
fn test_zero_likelihood_is_negative_infinity() {
    let mut t = table();
    let h = t
        .create_instance(Dimensions::new(2, 3, 2, 4, 2, 1, 1), &SelectionRequest::default())
        .unwrap();
    let inst = t.get_mut(h).unwrap();
    let mut identity = [0.0; 16];
    for i in 0..4 {
        identity[i * 4 + i] = 1.0;
    }
    inst.set_transition_matrix(0, &identity).unwrap();
    // Pattern 0 disagrees across an identity edge: likelihood exactly 0.
    inst.set_tip_states(0, &[0, 1]).unwrap();
    inst.set_tip_states(1, &[3, 1]).unwrap();
    inst.update_partials(&[Operation::new(2, 0, 0, 1, 0)], true).unwrap();
    let mut ll = [0.0; 2];
    inst.calculate_root_log_likelihoods(&[2], &[1.0], &[&FREQS], &mut ll)
        .unwrap();
    assert_eq!(ll[0], f64::NEG_INFINITY);
    assert!((ll[1] - 0.25_f64.ln()).abs() < 1e-14);
    assert_eq!(inst.metrics().unwrap().degenerate_sites, 1);

    let total = inst.sum_site_log_likelihoods(&ll).unwrap();
    assert_eq!(total, f64::NEG_INFINITY);
}

// ── Config ─────────────────────────────────────────────────────

#[test]
fn test_config_toml_roundtrip() {
    let config = EngineConfig {
        memory_budget: Some("64M".into()),
        num_threads: Some(2),
        ..EngineConfig::default()
    };
    let text = config.to_toml().unwrap();
    assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
}
