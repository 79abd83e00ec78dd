//! Resource declarers — one module per managed record.
//!
//! Each declarer takes the builder, its config section and the handles of
//! the records it depends on, declares one or more template resources, and
//! returns a handle exposing the logical ids and attributes later records
//! reference.

pub mod compute;
pub mod connectivity;
pub mod database;
pub mod grants;
pub mod load_balancer;
pub mod network;
pub mod queue;
pub mod secret;
pub mod service;
pub mod storage;

