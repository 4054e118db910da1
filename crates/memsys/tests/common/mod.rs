/// Test harness and topologies.
pub mod harness;

/// Mocked components.
pub mod mocks;
