//! Protocol timing constants shared by the hub and the agent bridge.
//!
//! These are defaults; both processes surface them through their
//! configuration so deployments can tune them without a rebuild.

/// Backoff between prompt-creation attempts (three attempts total).
pub const CREATE_RETRY_BACKOFF_MS: [u64; 3] = [1_000, 2_000, 4_000];

/// Interval between prompt-status polls in the wait phase.
pub const POLL_INTERVAL_MS: u64 = 500;

/// Default absolute timeout for a tool-permission prompt.
pub const DEFAULT_PROMPT_TIMEOUT_MS: u64 = 120_000;

/// Hard cap on any prompt timeout (delegation / plan-review prompts).
pub const MAX_PROMPT_TIMEOUT_MS: u64 = 300_000;

/// Consecutive poll failures tolerated before giving up early (deny).
pub const MAX_CONSECUTIVE_POLL_ERRORS: u32 = 10;

/// Acknowledgment records self-expire after this window.
pub const ACK_EXPIRY_MS: i64 = 300_000;
