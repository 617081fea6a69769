//! Monte Carlo texture matching.
//!
//! Each phase runs INIT, ASSIGN, MEASURE and OPTIMIZE in turn against its own
//! [`PhaseContext`]; once every phase is done the grain orientations are
//! written back to the voxel grid.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MatchConfig;
use crate::error::{Result, TexError};
use crate::grains::GrainTable;
use crate::graph::NeighborGraph;
use crate::orientation::Quat;
use crate::stats::{PhaseKind, SimulatedStatistics, TargetStatistics};
use crate::symmetry::{LaueClass, LaueOps, OrientationService};
use crate::trial::{acceptance_delta, probe_select, sample_bin, GrainUpdate, MoveKind, Trial};
use crate::utils::{squared_error, CancelFlag};
use crate::voxel_grid::VoxelGrid;

/// Boundary between two grains of the same phase, counted once.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PhaseEdge {
    pub a: usize,
    pub b: usize,
    /// Shared area divided by the phase's total counted area.
    pub weight: f64,
    /// Current MDF bin of the misorientation across this boundary.
    pub bin: usize,
}

impl PhaseEdge {
    fn other(&self, grain: usize) -> usize {
        if self.a == grain {
            self.b
        } else {
            self.a
        }
    }
}

/// Optimizer state for one phase: targets, running histograms and the
/// counted boundaries with their current bins.
#[derive(Clone, Debug)]
pub struct PhaseContext {
    pub phase: usize,
    pub kind: PhaseKind,
    pub laue: LaueClass,
    target_odf: Vec<f64>,
    target_mdf: Vec<f64>,
    pub simulated: SimulatedStatistics,
    members: Vec<usize>,
    unbiased_volume: f64,
    total_area: f64,
    edges: Vec<PhaseEdge>,
    // edge indices touching grain g: incident[incident_xadj[g]..incident_xadj[g + 1]]
    incident_xadj: Vec<usize>,
    incident: Vec<usize>,
}

impl PhaseContext {
    /// Grain ids in this phase.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn unbiased_volume(&self) -> f64 {
        self.unbiased_volume
    }

    pub fn total_area(&self) -> f64 {
        self.total_area
    }

    pub fn edges(&self) -> &[PhaseEdge] {
        &self.edges
    }

    pub fn incident_edges(&self, grain: usize) -> &[usize] {
        match (self.incident_xadj.get(grain), self.incident_xadj.get(grain + 1)) {
            (Some(&a), Some(&b)) => &self.incident[a..b],
            _ => &[],
        }
    }

    pub fn odf_error(&self) -> f64 {
        squared_error(&self.target_odf, &self.simulated.odf)
    }

    pub fn mdf_error(&self) -> f64 {
        squared_error(&self.target_mdf, &self.simulated.mdf)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PhaseStatus {
    /// Ran until a trial cap was hit.
    Completed,
    /// No qualifying grain could be selected; the search ended early.
    StoppedEarly,
    Cancelled,
    /// The phase could not be matched; see the attached error.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportedError {
    pub code: i32,
    pub message: String,
}

impl From<&TexError> for ReportedError {
    fn from(e: &TexError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// One accepted move.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceEntry {
    pub iteration: usize,
    pub kind: MoveKind,
    pub grains: Vec<usize>,
    /// Errors sampled at the top of the iteration, before the move.
    pub odf_error: f64,
    pub mdf_error: f64,
    pub delta: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PhaseReport {
    pub phase: usize,
    pub status: PhaseStatus,
    pub num_grains: usize,
    pub movable_grains: usize,
    pub iterations: usize,
    pub accepted: usize,
    pub initial_odf_error: f64,
    pub initial_mdf_error: f64,
    pub final_odf_error: f64,
    pub final_mdf_error: f64,
    pub error: Option<ReportedError>,
    pub trace: Vec<TraceEntry>,
    #[serde(skip)]
    pub simulated: Option<SimulatedStatistics>,
}

impl PhaseReport {
    fn empty(phase: usize, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            num_grains: 0,
            movable_grains: 0,
            iterations: 0,
            accepted: 0,
            initial_odf_error: 0.0,
            initial_mdf_error: 0.0,
            final_odf_error: 0.0,
            final_mdf_error: 0.0,
            error: None,
            trace: Vec::new(),
            simulated: None,
        }
    }

    fn skipped(phase: usize, e: &TexError) -> Self {
        let mut report = Self::empty(phase, PhaseStatus::Skipped);
        report.error = Some(e.into());
        report
    }
}

/// Outcome of [`TextureMatcher::run`].
#[derive(Clone, Debug, Serialize)]
pub struct MatchReport {
    pub phases: Vec<PhaseReport>,
    pub cancelled: bool,
    pub grains: GrainTable,
}

impl MatchReport {
    pub fn phase(&self, phase: usize) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Assigns grain orientations so the simulated ODF and MDF of each phase
/// approach their targets.
///
/// The random source is injected; [`TextureMatcher::from_config`] seeds a
/// `StdRng` from the config. An instance runs once: [`TextureMatcher::run`]
/// consumes it.
pub struct TextureMatcher<'a, R, S = LaueOps> {
    graph: &'a NeighborGraph,
    targets: &'a TargetStatistics,
    grains: GrainTable,
    service: S,
    rng: R,
    config: MatchConfig,
    cancel: CancelFlag,
}

impl<'a> TextureMatcher<'a, StdRng, LaueOps> {
    pub fn from_config(
        grid: &VoxelGrid,
        graph: &'a NeighborGraph,
        phases: &[usize],
        targets: &'a TargetStatistics,
        config: MatchConfig,
    ) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::new(grid, graph, phases, targets, LaueOps, rng, config)
    }
}

impl<'a, R: Rng, S: OrientationService> TextureMatcher<'a, R, S> {
    /// `phases[g]` is the phase id of grain `g` (index 0 unused).
    pub fn new(
        grid: &VoxelGrid,
        graph: &'a NeighborGraph,
        phases: &[usize],
        targets: &'a TargetStatistics,
        service: S,
        rng: R,
        config: MatchConfig,
    ) -> Result<Self> {
        config.validate()?;
        if !graph.is_complete() {
            return Err(TexError::missing_prerequisite(
                "neighbor graph scan did not complete",
            ));
        }
        let grains = GrainTable::new(grid, graph, phases)?;
        Ok(Self {
            graph,
            targets,
            grains,
            service,
            rng,
            config,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn grains(&self) -> &GrainTable {
        &self.grains
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match every phase in order, then write orientations back to `grid`.
    ///
    /// Phase-level failures are recorded in the report and do not stop later
    /// phases. A cancelled run skips the write-back.
    pub fn run(mut self, grid: &mut VoxelGrid) -> Result<MatchReport> {
        if grid.npoints() != self.graph.boundary_cells().len() {
            return Err(TexError::missing_prerequisite(
                "neighbor graph was built from a different grid",
            ));
        }
        let last_phase = self
            .grains
            .max_phase()
            .max(self.targets.num_phases().saturating_sub(1));
        let mut phases = Vec::new();
        let mut cancelled = false;

        for phase in 1..=last_phase {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if self.grains.phase_members(phase).is_empty() && self.targets.phase(phase).is_err() {
                continue;
            }
            let report = self.match_phase(phase);
            cancelled = report.status == PhaseStatus::Cancelled;
            phases.push(report);
            if cancelled {
                break;
            }
        }

        if cancelled {
            warn!("texture matching cancelled, orientations not written back");
        } else {
            self.grains.write_back(grid);
            info!(phases = phases.len(), "DONE: orientations written to voxels");
        }
        Ok(MatchReport {
            phases,
            cancelled,
            grains: self.grains,
        })
    }

    fn match_phase(&mut self, phase: usize) -> PhaseReport {
        let mut ctx = match self.initialize(phase) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(phase, code = e.code(), "skipping phase: {e}");
                return PhaseReport::skipped(phase, &e);
            }
        };
        if self.cancel.is_cancelled() {
            return PhaseReport::empty(phase, PhaseStatus::Cancelled);
        }
        self.assign(&mut ctx);
        if self.cancel.is_cancelled() {
            return PhaseReport::empty(phase, PhaseStatus::Cancelled);
        }
        self.measure(&mut ctx);
        self.optimize(&mut ctx)
    }

    /// INIT: validate the phase's targets and allocate zeroed histograms.
    pub fn initialize(&self, phase: usize) -> Result<PhaseContext> {
        let stats = self.targets.phase(phase)?;
        let kind = stats.kind();
        if !kind.is_matched() {
            return Err(TexError::UnsupportedPhase { phase, kind });
        }
        let dist = stats.distributions();
        let bins = self.service.bin_count(dist.laue);
        dist.validate(phase, bins)?;

        let members = self.grains.phase_members(phase);
        let unbiased_volume = self.grains.unbiased_volume(phase);
        info!(phase, ?kind, grains = members.len(), bins, "INIT");
        Ok(PhaseContext {
            phase,
            kind,
            laue: dist.laue,
            target_odf: dist.odf.clone(),
            target_mdf: dist.mdf.clone(),
            simulated: SimulatedStatistics::zeros(bins),
            members,
            unbiased_volume,
            total_area: 0.0,
            edges: Vec::new(),
            incident_xadj: Vec::new(),
            incident: Vec::new(),
        })
    }

    /// ASSIGN: sample an orientation for every grain of the phase and build
    /// the simulated ODF from the non-surface grains.
    pub fn assign(&mut self, ctx: &mut PhaseContext) {
        for &g in &ctx.members {
            let bin = sample_bin(&mut self.rng, &ctx.target_odf);
            let euler = self.service.euler_from_odf_bin(ctx.laue, bin);
            let orientation = self.service.euler_to_quaternion(&euler);
            let grain = self.grains.grain_mut(g);
            grain.euler = euler;
            grain.orientation = orientation;
            grain.odf_bin = Some(bin);
            if !grain.surface && ctx.unbiased_volume > 0.0 {
                ctx.simulated.odf[bin] += grain.volume / ctx.unbiased_volume;
            }
        }
        info!(phase = ctx.phase, odf_sum = ctx.simulated.odf_sum(), "ASSIGN");
    }

    /// MEASURE: collect the phase's counted boundaries and build the
    /// simulated MDF, normalized by the total counted area.
    ///
    /// A boundary is counted from its non-surface side, or from the lower id
    /// when neither grain is a surface grain.
    pub fn measure(&self, ctx: &mut PhaseContext) {
        let mut counted = Vec::new();
        let mut total_area = 0.0;
        for &g in &ctx.members {
            if self.grains.grain(g).surface {
                continue;
            }
            for (n, area) in self.graph.edges(g) {
                let Some(other) = self.grains.get(n) else {
                    continue;
                };
                if other.phase != ctx.phase {
                    continue;
                }
                if n > g || other.surface {
                    counted.push((g, n, area));
                    total_area += area;
                }
            }
        }

        ctx.total_area = total_area;
        ctx.simulated.mdf.iter_mut().for_each(|v| *v = 0.0);
        ctx.edges.clear();
        for (a, b, area) in counted {
            let weight = if total_area > 0.0 { area / total_area } else { 0.0 };
            let bin = self.edge_bin(
                ctx.laue,
                &self.grains.grain(a).orientation,
                &self.grains.grain(b).orientation,
            );
            ctx.simulated.mdf[bin] += weight;
            ctx.edges.push(PhaseEdge { a, b, weight, bin });
        }

        let n = self.grains.num_grains();
        let mut xadj = vec![0usize; n + 2];
        for e in &ctx.edges {
            xadj[e.a + 1] += 1;
            xadj[e.b + 1] += 1;
        }
        for g in 1..xadj.len() {
            xadj[g] += xadj[g - 1];
        }
        let mut fill = xadj.clone();
        let mut incident = vec![0usize; xadj[n + 1]];
        for (idx, e) in ctx.edges.iter().enumerate() {
            for end in [e.a, e.b] {
                incident[fill[end]] = idx;
                fill[end] += 1;
            }
        }
        ctx.incident_xadj = xadj;
        ctx.incident = incident;

        info!(
            phase = ctx.phase,
            edges = ctx.edges.len(),
            total_area,
            mdf_sum = ctx.simulated.mdf_sum(),
            "MEASURE"
        );
    }

    /// OPTIMIZE: greedy swap-out / switch search until a trial cap is hit.
    pub fn optimize(&mut self, ctx: &mut PhaseContext) -> PhaseReport {
        let (bad_try_cap, iteration_cap) = self.config.trial_caps(ctx.members.len());
        let mut report = PhaseReport::empty(ctx.phase, PhaseStatus::Completed);
        report.num_grains = ctx.members.len();
        report.movable_grains = ctx
            .members
            .iter()
            .filter(|&&g| !self.grains.grain(g).surface)
            .count();
        report.initial_odf_error = ctx.odf_error();
        report.initial_mdf_error = ctx.mdf_error();
        info!(
            phase = ctx.phase,
            bad_try_cap,
            iteration_cap,
            odf_error = report.initial_odf_error,
            mdf_error = report.initial_mdf_error,
            "OPTIMIZE"
        );

        let mut bad_tries = 0usize;
        let mut iteration = 0usize;
        while bad_tries < bad_try_cap && iteration < iteration_cap {
            if self.cancel.is_cancelled() {
                warn!(phase = ctx.phase, iteration, "search cancelled");
                report.status = PhaseStatus::Cancelled;
                break;
            }
            let odf_error = ctx.odf_error();
            let mdf_error = ctx.mdf_error();
            iteration += 1;
            bad_tries += 1;
            if iteration % self.config.progress_interval == 0 {
                debug!(
                    phase = ctx.phase,
                    iteration,
                    accepted = report.accepted,
                    odf_error,
                    mdf_error,
                    "search progress"
                );
            }

            let kind = if self.rng.gen::<f64>() < self.config.swap_probability {
                MoveKind::SwapOut
            } else {
                MoveKind::Switch
            };
            let trial = match kind {
                MoveKind::SwapOut => self.swap_out_trial(ctx),
                MoveKind::Switch => self.switch_trial(ctx),
            };
            let trial = match trial {
                Ok(trial) => trial,
                Err(e) => {
                    warn!(phase = ctx.phase, iteration, "stopping search early: {e}");
                    report.status = PhaseStatus::StoppedEarly;
                    report.error = Some((&e).into());
                    break;
                }
            };

            let odf_change = trial.odf.squared_error_change(&ctx.target_odf, &ctx.simulated.odf);
            let mdf_change = trial.mdf.squared_error_change(&ctx.target_mdf, &ctx.simulated.mdf);
            let delta = acceptance_delta(odf_change, odf_error, mdf_change, mdf_error);
            if delta > 0.0 {
                if self.config.record_trace {
                    report.trace.push(TraceEntry {
                        iteration,
                        kind,
                        grains: trial.grains(),
                        odf_error,
                        mdf_error,
                        delta,
                    });
                }
                self.commit(ctx, trial);
                bad_tries = 0;
                report.accepted += 1;
            }
        }

        report.iterations = iteration;
        report.final_odf_error = ctx.odf_error();
        report.final_mdf_error = ctx.mdf_error();
        report.simulated = Some(ctx.simulated.clone());
        info!(
            phase = ctx.phase,
            status = ?report.status,
            iterations = report.iterations,
            accepted = report.accepted,
            odf_error = report.final_odf_error,
            mdf_error = report.final_mdf_error,
            "phase finished"
        );
        report
    }

    fn edge_bin(&self, laue: LaueClass, q1: &Quat, q2: &Quat) -> usize {
        let m = self.service.misorientation(laue, q1, q2);
        self.service.misorientation_bin(laue, m.angle, m.axis)
    }

    /// Volume fraction grain `g` contributes to the simulated ODF.
    fn odf_weight(&self, ctx: &PhaseContext, g: usize) -> f64 {
        let grain = self.grains.grain(g);
        if grain.surface || ctx.unbiased_volume <= 0.0 {
            0.0
        } else {
            grain.volume / ctx.unbiased_volume
        }
    }

    fn select_grain(&mut self, ctx: &PhaseContext, exclude: Option<usize>) -> Result<usize> {
        let grains = &self.grains;
        probe_select(&mut self.rng, &ctx.members, |g| {
            Some(g) != exclude && !grains.grain(g).surface
        })
        .ok_or(TexError::RetryBudgetExhausted {
            phase: ctx.phase,
            attempts: ctx.members.len(),
        })
    }

    fn assigned_bin(&self, g: usize) -> Result<usize> {
        self.grains
            .grain(g)
            .odf_bin
            .ok_or_else(|| TexError::MissingPrerequisite(format!("grain {g} has no orientation")))
    }

    fn swap_out_trial(&mut self, ctx: &PhaseContext) -> Result<Trial> {
        let g = self.select_grain(ctx, None)?;
        let old_bin = self.assigned_bin(g)?;
        let bin = sample_bin(&mut self.rng, &ctx.target_odf);
        let euler = self.service.euler_from_odf_bin(ctx.laue, bin);
        let orientation = self.service.euler_to_quaternion(&euler);

        let mut trial = Trial::new(MoveKind::SwapOut);
        let w = self.odf_weight(ctx, g);
        trial.odf.add(old_bin, -w);
        trial.odf.add(bin, w);
        trial.grain_updates.push(GrainUpdate {
            grain: g,
            odf_bin: bin,
            euler,
            orientation,
        });
        self.reclassify_edges(ctx, &mut trial);
        Ok(trial)
    }

    fn switch_trial(&mut self, ctx: &PhaseContext) -> Result<Trial> {
        let g1 = self.select_grain(ctx, None)?;
        let g2 = self.select_grain(ctx, Some(g1))?;
        let (b1, b2) = (self.assigned_bin(g1)?, self.assigned_bin(g2)?);
        let (w1, w2) = (self.odf_weight(ctx, g1), self.odf_weight(ctx, g2));

        let mut trial = Trial::new(MoveKind::Switch);
        trial.odf.add(b1, -w1);
        trial.odf.add(b2, w1);
        trial.odf.add(b2, -w2);
        trial.odf.add(b1, w2);

        let (first, second) = (self.grains.grain(g1), self.grains.grain(g2));
        trial.grain_updates.push(GrainUpdate {
            grain: g1,
            odf_bin: b2,
            euler: second.euler,
            orientation: second.orientation,
        });
        trial.grain_updates.push(GrainUpdate {
            grain: g2,
            odf_bin: b1,
            euler: first.euler,
            orientation: first.orientation,
        });
        self.reclassify_edges(ctx, &mut trial);
        Ok(trial)
    }

    /// Recompute the MDF bin of every boundary touching a grain in
    /// `trial.grain_updates`, using the trial orientations. A boundary
    /// between two updated grains is visited once.
    fn reclassify_edges(&self, ctx: &PhaseContext, trial: &mut Trial) {
        let orientation_of = |g: usize, trial: &Trial| -> Quat {
            trial
                .grain_updates
                .iter()
                .find(|u| u.grain == g)
                .map(|u| u.orientation)
                .unwrap_or(self.grains.grain(g).orientation)
        };
        for u in 0..trial.grain_updates.len() {
            let grain = trial.grain_updates[u].grain;
            for &idx in ctx.incident_edges(grain) {
                let edge = &ctx.edges[idx];
                if u > 0 && trial.grain_updates[..u].iter().any(|p| p.grain == edge.other(grain)) {
                    continue;
                }
                let qa = orientation_of(edge.a, &*trial);
                let qb = orientation_of(edge.b, &*trial);
                let bin = self.edge_bin(ctx.laue, &qa, &qb);
                trial.mdf.add(edge.bin, -edge.weight);
                trial.mdf.add(bin, edge.weight);
                trial.edge_updates.push((idx, bin));
            }
        }
    }

    fn commit(&mut self, ctx: &mut PhaseContext, trial: Trial) {
        trial.odf.apply(&mut ctx.simulated.odf);
        trial.mdf.apply(&mut ctx.simulated.mdf);
        for &(idx, bin) in &trial.edge_updates {
            ctx.edges[idx].bin = bin;
        }
        for u in trial.grain_updates {
            let grain = self.grains.grain_mut(u.grain);
            grain.odf_bin = Some(u.odf_bin);
            grain.euler = u.euler;
            grain.orientation = u.orientation;
        }
    }
}
