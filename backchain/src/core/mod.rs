//! Deterministic, pure logic shared by the planner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod command;
pub mod conversation;
pub mod cursor;
pub mod intent;
pub mod plan;
pub mod status;
pub mod step_parser;
pub mod types;
