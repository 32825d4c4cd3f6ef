pub mod messages;

// Re-export main types
pub use messages::{Ballot, SignedBallot};
