//! Deterministic, pure logic shared by the design and coding loops.
//!
//! Core modules are free of I/O side effects. They operate on in-memory values
//! and return deterministic outputs suitable for tests.

pub mod cancel;
pub mod error;
pub mod escalation;
pub mod python;
pub mod response;
pub mod state;
pub mod types;
