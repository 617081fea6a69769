//! Target and simulated texture statistics, keyed by phase id.
//!
//! Phase 0 is reserved; the first real phase is 1.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TexError};
use crate::symmetry::LaueClass;
use crate::utils::histogram_sum;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    Primary,
    Precipitate,
    Transformation,
}

impl PhaseKind {
    /// Whether the texture matcher assigns orientations to this kind of phase.
    pub fn is_matched(self) -> bool {
        matches!(self, PhaseKind::Primary | PhaseKind::Precipitate)
    }
}

/// Target ODF and MDF for one phase. Both histograms are pre-normalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseDistributions {
    pub laue: LaueClass,
    pub odf: Vec<f64>,
    pub mdf: Vec<f64>,
}

impl PhaseDistributions {
    pub fn new(laue: LaueClass, odf: Vec<f64>, mdf: Vec<f64>) -> Self {
        Self { laue, odf, mdf }
    }

    /// Uniform ODF and MDF on the class grid.
    pub fn uniform(laue: LaueClass) -> Self {
        let n = laue.bin_grid().len();
        let v = 1.0 / n as f64;
        Self::new(laue, vec![v; n], vec![v; n])
    }

    /// All weight in a single ODF bin and a single MDF bin.
    pub fn one_hot(laue: LaueClass, odf_bin: usize, mdf_bin: usize) -> Self {
        let n = laue.bin_grid().len();
        let mut odf = vec![0.0; n];
        let mut mdf = vec![0.0; n];
        if odf_bin < n {
            odf[odf_bin] = 1.0;
        }
        if mdf_bin < n {
            mdf[mdf_bin] = 1.0;
        }
        Self::new(laue, odf, mdf)
    }

    /// Check both histograms against the class grid size.
    pub fn validate(&self, phase: usize, expected: usize) -> Result<()> {
        for found in [self.odf.len(), self.mdf.len()] {
            if found != expected {
                return Err(TexError::BinCountMismatch {
                    phase,
                    expected,
                    found,
                });
            }
        }
        if self.odf.iter().chain(self.mdf.iter()).any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(TexError::InvalidInput(format!(
                "phase {phase}: target densities must be finite and non-negative"
            )));
        }
        Ok(())
    }
}

/// Per-phase statistics record, tagged by phase kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "distributions")]
pub enum PhaseStatistics {
    Primary(PhaseDistributions),
    Precipitate(PhaseDistributions),
    Transformation(PhaseDistributions),
}

impl PhaseStatistics {
    pub fn kind(&self) -> PhaseKind {
        match self {
            PhaseStatistics::Primary(_) => PhaseKind::Primary,
            PhaseStatistics::Precipitate(_) => PhaseKind::Precipitate,
            PhaseStatistics::Transformation(_) => PhaseKind::Transformation,
        }
    }

    pub fn distributions(&self) -> &PhaseDistributions {
        match self {
            PhaseStatistics::Primary(d)
            | PhaseStatistics::Precipitate(d)
            | PhaseStatistics::Transformation(d) => d,
        }
    }

    pub fn laue_class(&self) -> LaueClass {
        self.distributions().laue
    }
}

/// Target statistics for every phase of a volume.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStatistics {
    phases: Vec<Option<PhaseStatistics>>,
}

impl TargetStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, phase: usize, stats: PhaseStatistics) -> Self {
        self.insert(phase, stats);
        self
    }

    pub fn insert(&mut self, phase: usize, stats: PhaseStatistics) {
        if self.phases.len() <= phase {
            self.phases.resize(phase + 1, None);
        }
        self.phases[phase] = Some(stats);
    }

    /// Statistics for `phase`, or `MissingStatistics` when none were supplied
    /// or either histogram is empty.
    pub fn phase(&self, phase: usize) -> Result<&PhaseStatistics> {
        match self.phases.get(phase).and_then(|p| p.as_ref()) {
            Some(stats) if !stats.distributions().odf.is_empty() && !stats.distributions().mdf.is_empty() => {
                Ok(stats)
            }
            _ => Err(TexError::MissingStatistics { phase }),
        }
    }

    /// One past the largest phase id with an entry.
    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }
}

/// Running ODF and MDF of the current orientation assignment for one phase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulatedStatistics {
    pub odf: Vec<f64>,
    pub mdf: Vec<f64>,
}

impl SimulatedStatistics {
    pub fn zeros(bins: usize) -> Self {
        Self {
            odf: vec![0.0; bins],
            mdf: vec![0.0; bins],
        }
    }

    pub fn odf_sum(&self) -> f64 {
        histogram_sum(&self.odf)
    }

    pub fn mdf_sum(&self) -> f64 {
        histogram_sum(&self.mdf)
    }
}
