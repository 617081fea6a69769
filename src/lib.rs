pub mod config;
pub mod connectivity;
pub mod error;
pub mod grains;
pub mod graph;
pub mod matcher;
pub mod orientation;
pub mod stats;
pub mod symmetry;
pub mod trial;
pub mod utils;
pub mod voxel_grid;

pub use config::MatchConfig;
pub use connectivity::{find_neighbors, NeighborGraphBuilder};
pub use error::{Result, TexError};
pub use grains::{Grain, GrainTable};
pub use graph::{NeighborGraph, NeighborGraphPrinter, ScanStatus};
pub use matcher::{
    MatchReport, PhaseContext, PhaseEdge, PhaseReport, PhaseStatus, ReportedError, TextureMatcher,
    TraceEntry,
};
pub use orientation::{AxisAngle, Euler, Homochoric, Quat, Rodrigues};
pub use stats::{PhaseDistributions, PhaseKind, PhaseStatistics, SimulatedStatistics, TargetStatistics};
pub use symmetry::{BinGrid, LaueClass, LaueOps, OrientationService};
pub use trial::{BinDelta, MoveKind, Trial};
pub use utils::CancelFlag;
pub use voxel_grid::VoxelGrid;
