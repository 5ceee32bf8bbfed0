//! Stubs and fixtures shared by the Pharmassist test suites.

pub mod fixtures;
mod stub;

pub use stub::StubCapability;
