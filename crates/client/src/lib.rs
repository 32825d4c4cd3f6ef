//! Voter-side submission
//!
//! Turns a proven ballot into a ledger verdict: cheap local checks first,
//! then an anonymous hop through a randomly chosen relayer.

pub mod pipeline;
pub mod seen;

pub use pipeline::{build_ballot, PipelineConfig, SubmissionPipeline, SubmitError};
pub use seen::{SeenCache, SeenState};
