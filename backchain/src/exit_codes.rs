//! Stable exit codes for `backchain` CLI commands.

/// Command succeeded; for `run`, the agent finished its goal.
pub const OK: i32 = 0;
/// Invalid config or input, or an oracle/command failure.
pub const INVALID: i32 = 1;
/// `backchain run` hit its event limit before the agent finished.
pub const INCOMPLETE: i32 = 2;
