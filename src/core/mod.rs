//! Core synthesis logic — types, parsing, resolution, stack definition,
//! audit, planning, rendering and state.

pub mod audit;
pub mod builder;
pub mod codegen;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod stack;
pub mod state;
pub mod synth;
pub mod template;
pub mod types;
