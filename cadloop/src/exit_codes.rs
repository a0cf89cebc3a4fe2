//! Stable exit codes for cadloop CLI commands.

/// Design goal achieved, candidate valid, or execution succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, usage, or an unexpected I/O error.
pub const INVALID: i32 = 1;
/// The iteration budget ran out, the candidate was rejected, or execution failed.
pub const NOT_ACHIEVED: i32 = 2;
