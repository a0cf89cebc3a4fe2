//! Bounded design and coding loops for CAD code synthesis.
//!
//! A design goal is turned into an executable modelling program through
//! repeated generate, validate, execute and judge cycles. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, escalation policy,
//!   best-candidate state, Python source analysis). No I/O.
//! - **[`io`]**: Side-effecting operations (process execution, sandbox,
//!   configuration, prompts, history).
//! - **[`agents`]**: Collaborator interfaces and their command-backed adapters.
//!
//! Orchestration modules ([`validate`], [`coding`], [`design`], [`session`])
//! compose core logic with I/O to implement CLI commands.

pub mod agents;
pub mod coding;
pub mod core;
pub mod design;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
