use thiserror::Error;

use crate::stats::PhaseKind;

pub type Result<T> = std::result::Result<T, TexError>;

#[derive(Error, Debug)]
pub enum TexError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("No target ODF/MDF statistics for phase {phase}")]
    MissingStatistics { phase: usize },

    #[error("Target histogram for phase {phase} has {found} bins, symmetry class expects {expected}")]
    BinCountMismatch {
        phase: usize,
        expected: usize,
        found: usize,
    },

    #[error("Phase {phase} is a {kind:?} phase, which is not matched")]
    UnsupportedPhase { phase: usize, kind: PhaseKind },

    #[error("No qualifying grain found in phase {phase} after {attempts} probes")]
    RetryBudgetExhausted { phase: usize, attempts: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl TexError {
    pub fn invalid_input<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidInput(e.to_string())
    }

    pub fn missing_prerequisite<E: std::fmt::Display>(e: E) -> Self {
        Self::MissingPrerequisite(e.to_string())
    }

    /// Stable numeric code reported next to the message.
    pub fn code(&self) -> i32 {
        match self {
            TexError::InvalidInput(_) => -1000,
            TexError::BinCountMismatch { .. } => -1001,
            TexError::MissingPrerequisite(_) => -2000,
            TexError::MissingStatistics { .. } => -3000,
            TexError::UnsupportedPhase { .. } => -3001,
            TexError::RetryBudgetExhausted { .. } => -4000,
            TexError::Config(_) => -5000,
        }
    }
}
