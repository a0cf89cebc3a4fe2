//! I/O helpers: processes, sandboxing, agents, rendering, history and config.

pub mod agent;
pub mod config;
pub mod history;
pub mod modules;
pub mod process;
pub mod prompt;
pub mod renderer;
pub mod sandbox;
