//! fleetstack: Rust-native stack synthesis.
//!
//! Reads a declarative `stack.yaml`, declares a dependency-ordered graph of
//! managed resources wired with least-privilege grants, and renders a
//! CloudFormation template. BLAKE3 lock hashes and an event log make every
//! synthesis traceable.

pub mod cli;
pub mod core;
pub mod resources;
pub mod tripwire;
