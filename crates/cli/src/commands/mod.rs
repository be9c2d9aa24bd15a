//! Subcommand implementations

pub mod feature_gates;
pub mod quantity;
pub mod walk;
