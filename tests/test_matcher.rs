use microtex::{
    find_neighbors, CancelFlag, LaueClass, LaueOps, MatchConfig, NeighborGraph,
    NeighborGraphBuilder, OrientationService, PhaseContext, PhaseDistributions, PhaseStatistics,
    PhaseStatus, TargetStatistics, TexError, TextureMatcher, VoxelGrid,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const UNIT: (f64, f64, f64) = (1.0, 1.0, 1.0);

/// 4x4x4, grain 1 for x < 2 and grain 2 for x >= 2.
fn two_grain_grid() -> VoxelGrid {
    VoxelGrid::from_fn((4, 4, 4), UNIT, |i, _, _| if i < 2 { 1 } else { 2 }).unwrap()
}

/// 8x8x8 with a one-voxel shell of grain 1 around eight 3x3x3 interior
/// grains (ids 2..=9), all of which are non-surface.
fn shell_grid() -> VoxelGrid {
    VoxelGrid::from_fn((8, 8, 8), UNIT, |i, j, k| {
        let edge = |p: usize| p == 0 || p == 7;
        if edge(i) || edge(j) || edge(k) {
            1
        } else {
            (2 + (i - 1) / 3 + 2 * ((j - 1) / 3) + 4 * ((k - 1) / 3)) as i32
        }
    })
    .unwrap()
}

/// 7x7x7 matrix grain 1 holding eight single-voxel inclusions (ids 2..=9)
/// that never touch each other.
fn inclusion_grid() -> VoxelGrid {
    let mut next = 1;
    let mut ids = vec![0; 7 * 7 * 7];
    for k in 0..7 {
        for j in 0..7 {
            for i in 0..7 {
                let on = |p: usize| p == 2 || p == 4;
                ids[(k * 7 + j) * 7 + i] = if on(i) && on(j) && on(k) {
                    next += 1;
                    next
                } else {
                    1
                };
            }
        }
    }
    VoxelGrid::new((7, 7, 7), UNIT, ids).unwrap()
}

fn cubic_primary(dist: PhaseDistributions) -> TargetStatistics {
    TargetStatistics::new().with_phase(1, PhaseStatistics::Primary(dist))
}

fn phases_all(graph: &NeighborGraph, phase: usize) -> Vec<usize> {
    let mut phases = vec![phase; graph.num_grains() + 1];
    phases[0] = 0;
    phases
}

fn staged_context(matcher: &mut TextureMatcher<'_, StdRng>, phase: usize) -> PhaseContext {
    let mut ctx = matcher.initialize(phase).unwrap();
    matcher.assign(&mut ctx);
    matcher.measure(&mut ctx);
    ctx
}

#[test]
fn test_two_grain_end_to_end() {
    let mut grid = two_grain_grid();
    let graph = find_neighbors(&grid).unwrap();
    let target_bin = 1000;
    let targets = cubic_primary(PhaseDistributions::one_hot(LaueClass::Cubic, target_bin, 0));
    let config = MatchConfig {
        seed: 42,
        ..MatchConfig::default()
    };

    let matcher =
        TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, config).unwrap();
    let report = matcher.run(&mut grid).unwrap();

    assert!(!report.cancelled);
    let phase = report.phase(1).unwrap();
    // both grains touch the outer boundary, so nothing is movable
    assert_eq!(phase.status, PhaseStatus::StoppedEarly);
    assert_eq!(phase.error.as_ref().unwrap().code, -4000);
    assert_eq!(phase.num_grains, 2);
    assert_eq!(phase.movable_grains, 0);

    let expected = LaueOps.euler_from_odf_bin(LaueClass::Cubic, target_bin);
    for g in [1, 2] {
        let grain = report.grains.get(g).unwrap();
        assert_eq!(grain.odf_bin, Some(target_bin));
        assert_eq!(grain.euler, expected);
    }
    for index in 0..grid.npoints() {
        assert_eq!(grid.cell_euler(index), expected);
    }

    let sim = phase.simulated.as_ref().unwrap();
    assert_eq!(sim.odf_sum(), 0.0);
    assert_eq!(sim.mdf_sum(), 0.0);
    assert!(phase.final_odf_error.is_finite());
    assert!(phase.final_mdf_error.is_finite());
}

#[test]
fn test_assign_and_measure_normalize() {
    let grid = shell_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));
    let phases = phases_all(&graph, 1);
    let mut matcher =
        TextureMatcher::from_config(&grid, &graph, &phases, &targets, MatchConfig::default())
            .unwrap();

    let ctx = staged_context(&mut matcher, 1);
    assert_eq!(ctx.members().len(), 9);
    assert!((ctx.unbiased_volume() - 216.0).abs() < 1e-12);
    assert!((ctx.simulated.odf_sum() - 1.0).abs() < 1e-4);

    // 12 interior pairs of 9 faces, 8 grains touching the shell on 27 faces
    assert_eq!(ctx.edges().len(), 20);
    assert!((ctx.total_area() - 324.0).abs() < 1e-9);
    assert!((ctx.simulated.mdf_sum() - 1.0).abs() < 1e-4);

    // shell grain is never counted from its own side
    assert!(ctx.edges().iter().all(|e| e.a != 1));
    assert_eq!(ctx.incident_edges(1).len(), 8);
    assert_eq!(ctx.incident_edges(2).len(), 4);
}

#[test]
fn test_one_hot_target_assigns_target_bin() {
    let grid = shell_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = cubic_primary(PhaseDistributions::one_hot(LaueClass::Cubic, 2500, 10));
    let phases = phases_all(&graph, 1);
    let mut matcher =
        TextureMatcher::from_config(&grid, &graph, &phases, &targets, MatchConfig::default())
            .unwrap();

    let ctx = staged_context(&mut matcher, 1);
    assert!(matcher.grains().iter().all(|g| g.odf_bin == Some(2500)));
    assert!((ctx.simulated.odf[2500] - 1.0).abs() < 1e-12);
    assert!(ctx.odf_error() < 1e-20);
}

#[test]
fn test_incremental_bookkeeping_matches_recount() {
    let grid = shell_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));
    let phases = phases_all(&graph, 1);
    let config = MatchConfig {
        seed: 5,
        max_iterations: Some(3000),
        ..MatchConfig::default()
    };
    let mut matcher = TextureMatcher::from_config(&grid, &graph, &phases, &targets, config).unwrap();

    let mut ctx = staged_context(&mut matcher, 1);
    let report = matcher.optimize(&mut ctx);
    assert!(report.iterations > 0);

    // ODF rebuilt from the committed grain bins
    let mut odf = vec![0.0; ctx.simulated.odf.len()];
    for &g in ctx.members() {
        let grain = matcher.grains().get(g).unwrap();
        let bin = grain.odf_bin.unwrap();
        assert_eq!(
            LaueOps.odf_bin_from_rodrigues(LaueClass::Cubic, &grain.euler.to_rodrigues()),
            bin
        );
        if !grain.surface {
            odf[bin] += grain.volume / ctx.unbiased_volume();
        }
    }
    for (a, b) in odf.iter().zip(ctx.simulated.odf.iter()) {
        assert!((a - b).abs() < 1e-9);
    }

    // MDF rebuilt by a fresh measure pass
    let incremental = ctx.simulated.mdf.clone();
    let edge_bins: Vec<usize> = ctx.edges().iter().map(|e| e.bin).collect();
    matcher.measure(&mut ctx);
    for (a, b) in incremental.iter().zip(ctx.simulated.mdf.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert_eq!(edge_bins, ctx.edges().iter().map(|e| e.bin).collect::<Vec<_>>());
    assert!((ctx.simulated.odf_sum() - 1.0).abs() < 1e-4);
    assert!((ctx.simulated.mdf_sum() - 1.0).abs() < 1e-4);
}

#[test]
fn test_error_non_increasing_over_accepted_moves() {
    let mut grid = inclusion_grid();
    let graph = find_neighbors(&grid).unwrap();
    let mut phases = vec![1; graph.num_grains() + 1];
    phases[0] = 0;
    phases[1] = 2;

    let n = LaueOps.bin_count(LaueClass::Cubic);
    let mut odf = vec![0.0; n];
    odf[100] = 0.5;
    odf[2000] = 0.5;
    let mut mdf = vec![0.0; n];
    mdf[0] = 1.0;
    // phase 2 has no statistics and is skipped
    let targets = cubic_primary(PhaseDistributions::new(LaueClass::Cubic, odf, mdf));
    let config = MatchConfig {
        seed: 11,
        max_iterations: Some(5000),
        record_trace: true,
        ..MatchConfig::default()
    };

    let matcher = TextureMatcher::from_config(&grid, &graph, &phases, &targets, config).unwrap();
    let report = matcher.run(&mut grid).unwrap();

    let skipped = report.phase(2).unwrap();
    assert_eq!(skipped.status, PhaseStatus::Skipped);
    assert_eq!(skipped.error.as_ref().unwrap().code, -3000);

    let phase = report.phase(1).unwrap();
    assert_eq!(phase.status, PhaseStatus::Completed);
    assert_eq!(phase.movable_grains, 8);
    // inclusions share no boundary, so the MDF term never moves
    assert!((phase.initial_mdf_error - 1.0).abs() < 1e-12);
    assert!((phase.final_mdf_error - 1.0).abs() < 1e-12);

    let mut last = f64::INFINITY;
    for entry in &phase.trace {
        let total = entry.odf_error + entry.mdf_error;
        assert!(total <= last + 1e-15);
        assert!(entry.delta > 0.0);
        last = total;
    }
    assert_eq!(phase.trace.len(), phase.accepted);
    assert!(
        phase.final_odf_error + phase.final_mdf_error
            <= phase.initial_odf_error + phase.initial_mdf_error + 1e-15
    );
    assert!(phase.final_odf_error < 1e-12);

    // the matrix grain was never assigned
    assert_eq!(report.grains.get(1).unwrap().odf_bin, None);
}

#[test]
fn test_isolated_grains_do_not_divide_by_zero() {
    let mut grid = VoxelGrid::from_fn((9, 5, 5), UNIT, |i, j, k| match (i, j, k) {
        (2, 2, 2) => 1,
        (6, 2, 2) => 2,
        _ => 0,
    })
    .unwrap();
    let graph = find_neighbors(&grid).unwrap();
    assert!(graph.neighbors(1).is_empty());
    assert!(graph.neighbors(2).is_empty());

    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));
    let mut matcher =
        TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, MatchConfig::default())
            .unwrap();
    let ctx = staged_context(&mut matcher, 1);
    assert_eq!(ctx.total_area(), 0.0);
    assert!(ctx.edges().is_empty());
    assert!(ctx.simulated.odf.iter().all(|v| v.is_finite()));
    assert!(ctx.simulated.mdf.iter().all(|v| *v == 0.0));

    let matcher =
        TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, MatchConfig::default())
            .unwrap();
    let report = matcher.run(&mut grid).unwrap();
    let phase = report.phase(1).unwrap();
    assert!(phase.final_odf_error.is_finite());
    assert!(phase.final_mdf_error.is_finite());
}

#[test]
fn test_fixed_seed_is_deterministic() {
    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));
    let config = MatchConfig {
        seed: 9,
        max_iterations: Some(2000),
        record_trace: true,
        ..MatchConfig::default()
    };

    let run = || {
        let mut grid = shell_grid();
        let graph = find_neighbors(&grid).unwrap();
        let phases = phases_all(&graph, 1);
        let matcher =
            TextureMatcher::from_config(&grid, &graph, &phases, &targets, config.clone()).unwrap();
        let report = matcher.run(&mut grid).unwrap();
        (report, grid)
    };

    let (first, grid_a) = run();
    let (second, grid_b) = run();
    let (a, b) = (first.phase(1).unwrap(), second.phase(1).unwrap());
    assert!(a.iterations > 0);
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.accepted, b.accepted);
    assert_eq!(a.trace, b.trace);
    assert_eq!(grid_a.cell_eulers(), grid_b.cell_eulers());
}

#[test]
fn test_injected_rng() {
    let mut grid = shell_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = TargetStatistics::new().with_phase(
        1,
        PhaseStatistics::Precipitate(PhaseDistributions::uniform(LaueClass::Hexagonal)),
    );
    let phases = phases_all(&graph, 1);
    let config = MatchConfig {
        max_iterations: Some(500),
        ..MatchConfig::default()
    };
    let matcher = TextureMatcher::new(
        &grid,
        &graph,
        &phases,
        &targets,
        LaueOps,
        StdRng::seed_from_u64(3),
        config,
    )
    .unwrap();
    let report = matcher.run(&mut grid).unwrap();
    let phase = report.phase(1).unwrap();
    assert_eq!(phase.status, PhaseStatus::Completed);
    assert!(phase.iterations <= 500);
    let sim = phase.simulated.as_ref().unwrap();
    assert_eq!(sim.odf.len(), 36 * 36 * 12);
    assert!((sim.odf_sum() - 1.0).abs() < 1e-4);
}

#[test]
fn test_unmatched_phases_are_skipped() {
    let mut grid = two_grain_grid();
    let graph = find_neighbors(&grid).unwrap();

    let targets = TargetStatistics::new().with_phase(
        1,
        PhaseStatistics::Transformation(PhaseDistributions::uniform(LaueClass::Cubic)),
    );
    let matcher =
        TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, MatchConfig::default())
            .unwrap();
    let report = matcher.run(&mut grid).unwrap();
    let phase = report.phase(1).unwrap();
    assert_eq!(phase.status, PhaseStatus::Skipped);
    assert_eq!(phase.error.as_ref().unwrap().code, -3001);
    assert!(report.grains.iter().all(|g| g.odf_bin.is_none()));

    let short = PhaseDistributions::new(LaueClass::Cubic, vec![0.1; 10], vec![0.1; 10]);
    let targets = cubic_primary(short);
    let matcher =
        TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, MatchConfig::default())
            .unwrap();
    let report = matcher.run(&mut grid).unwrap();
    assert_eq!(report.phase(1).unwrap().error.as_ref().unwrap().code, -1001);
}

#[test]
fn test_cancelled_run_skips_write_back() {
    let mut grid = shell_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));
    let phases = phases_all(&graph, 1);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let matcher =
        TextureMatcher::from_config(&grid, &graph, &phases, &targets, MatchConfig::default())
            .unwrap()
            .with_cancel_flag(cancel);
    let report = matcher.run(&mut grid).unwrap();
    assert!(report.cancelled);
    assert!(grid.cell_eulers().iter().all(|e| *e == Default::default()));
}

#[test]
fn test_run_prerequisites() {
    let grid = two_grain_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));

    let err = TextureMatcher::from_config(&grid, &graph, &[0, 1], &targets, MatchConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, TexError::MissingPrerequisite(_)));

    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut builder = NeighborGraphBuilder::new().with_cancel_flag(cancel);
    let partial = builder.build(&grid).unwrap();
    let err = TextureMatcher::from_config(&grid, partial, &[0, 1, 1], &targets, MatchConfig::default())
        .err()
        .unwrap();
    assert_eq!(err.code(), -2000);

    let bad = MatchConfig {
        swap_probability: 2.0,
        ..MatchConfig::default()
    };
    let err = TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, bad)
        .err()
        .unwrap();
    assert!(matches!(err, TexError::InvalidInput(_)));
}

#[test]
fn test_report_json() {
    let mut grid = two_grain_grid();
    let graph = find_neighbors(&grid).unwrap();
    let targets = cubic_primary(PhaseDistributions::uniform(LaueClass::Cubic));
    let matcher =
        TextureMatcher::from_config(&grid, &graph, &[0, 1, 1], &targets, MatchConfig::default())
            .unwrap();
    let report = matcher.run(&mut grid).unwrap();
    let json = report.to_json().unwrap();
    println!("{json}");
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["phases"][0]["phase"], 1);
    assert_eq!(value["phases"][0]["status"], "StoppedEarly");
    assert_eq!(value["cancelled"], false);
}
