pub mod identity;

// Re-export main types
pub use identity::{verify_signature, Identity, Principal};
