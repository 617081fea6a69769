//! Incremental bookkeeping for a single Monte Carlo trial.
//!
//! A trial records the histogram changes a move would make without touching
//! the simulated statistics; its change in squared error is computed from the
//! touched bins alone.

use rand::Rng;
use serde::Serialize;

use crate::orientation::{Euler, Quat};
use crate::utils::argmax;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MoveKind {
    /// Give one grain a freshly sampled orientation.
    SwapOut,
    /// Exchange the orientations of two grains.
    Switch,
}

/// Sparse per-bin change to a histogram. Repeated bins are merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BinDelta {
    entries: Vec<(usize, f64)>,
}

impl BinDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, bin: usize, amount: f64) {
        match self.entries.iter_mut().find(|(b, _)| *b == bin) {
            Some((_, a)) => *a += amount,
            None => self.entries.push((bin, amount)),
        }
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Change in `Σ (target - simulated)²` if this delta were applied.
    pub fn squared_error_change(&self, target: &[f64], simulated: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|&(bin, d)| {
                let before = target[bin] - simulated[bin];
                let after = before - d;
                after * after - before * before
            })
            .sum()
    }

    pub fn apply(&self, hist: &mut [f64]) {
        for &(bin, d) in &self.entries {
            hist[bin] += d;
        }
    }
}

/// New orientation for one grain.
#[derive(Clone, Debug, PartialEq)]
pub struct GrainUpdate {
    pub grain: usize,
    pub odf_bin: usize,
    pub euler: Euler,
    pub orientation: Quat,
}

/// Everything a move would change, kept aside until it is accepted.
#[derive(Clone, Debug)]
pub struct Trial {
    pub kind: MoveKind,
    pub odf: BinDelta,
    pub mdf: BinDelta,
    /// `(edge index, new MDF bin)` for every edge whose bin is recomputed.
    pub edge_updates: Vec<(usize, usize)>,
    pub grain_updates: Vec<GrainUpdate>,
}

impl Trial {
    pub fn new(kind: MoveKind) -> Self {
        Self {
            kind,
            odf: BinDelta::new(),
            mdf: BinDelta::new(),
            edge_updates: Vec::new(),
            grain_updates: Vec::new(),
        }
    }

    pub fn grains(&self) -> Vec<usize> {
        self.grain_updates.iter().map(|u| u.grain).collect()
    }
}

/// Relative error improvement of a trial; the trial is accepted iff the
/// result is positive.
///
/// A term whose current error is zero contributes nothing unless the trial
/// would make it worse, which vetoes the trial.
pub fn acceptance_delta(odf_change: f64, odf_error: f64, mdf_change: f64, mdf_error: f64) -> f64 {
    relative_improvement(odf_change, odf_error) + relative_improvement(mdf_change, mdf_error)
}

fn relative_improvement(change: f64, current: f64) -> f64 {
    if current > 0.0 {
        -change / current
    } else if change > 0.0 {
        f64::NEG_INFINITY
    } else {
        0.0
    }
}

/// Inverse-CDF draw from `density`: the first bin whose running sum exceeds
/// a uniform number in `[0, 1)`. Falls back to the densest bin when the
/// histogram sums to less than the draw.
pub fn sample_bin<R: Rng>(rng: &mut R, density: &[f64]) -> usize {
    let draw: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (bin, &d) in density.iter().enumerate() {
        cumulative += d;
        if cumulative > draw {
            return bin;
        }
    }
    argmax(density).unwrap_or(0)
}

/// Pick a random entry of `candidates` that satisfies `qualifies`, probing
/// forward with wrap-around from a random start for at most
/// `candidates.len()` attempts.
pub fn probe_select<R, F>(rng: &mut R, candidates: &[usize], qualifies: F) -> Option<usize>
where
    R: Rng,
    F: Fn(usize) -> bool,
{
    if candidates.is_empty() {
        return None;
    }
    let start = rng.gen_range(0..candidates.len());
    (0..candidates.len())
        .map(|step| candidates[(start + step) % candidates.len()])
        .find(|&g| qualifies(g))
}
