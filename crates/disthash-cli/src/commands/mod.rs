//! CLI command implementations.

pub mod bench;
pub mod cluster;
pub mod sizing;
