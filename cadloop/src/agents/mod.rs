//! Collaborator interfaces consumed by the loops, with agent-backed implementations.
//!
//! Each trait is the black-box contract a loop depends on. The `Agent*`
//! implementations render a prompt, send it through an [`Agent`](crate::io::agent::Agent)
//! and parse the reply.

pub mod describer;
pub mod feedback;
pub mod generator;
pub mod judge;
