//! Replay module: re-drive recorded test cases with relocation and correction.

pub mod engine;
pub mod prompt;
pub mod relocator;
pub mod report;
pub mod schema;

pub use engine::ReplayEngine;
pub use relocator::{Relocation, RelocationVerdict, Relocator, RelocatorWeights};
pub use report::{FailureReport, FailureReporter};
pub use schema::{
    BatchEntry, CorrectionAttempt, RelocationAttempt, ReplayOutcome, StepReport, StepStatus,
};
