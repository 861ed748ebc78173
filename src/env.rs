//! Environment variable constants used throughout the application.
//!
//! Centralized definition of all `HOOKWISE_*` environment variables to ensure
//! consistency and avoid hardcoded strings.

/// Rules file path override (takes precedence over the resolution chain)
pub const HOOKWISE_RULES_PATH: &str = "HOOKWISE_RULES_PATH";

/// State directory override (e.g. `~/.claude/state`)
pub const HOOKWISE_STATE_DIR: &str = "HOOKWISE_STATE_DIR";

/// Log filter override (tracing env-filter syntax)
pub const HOOKWISE_LOG: &str = "HOOKWISE_LOG";
