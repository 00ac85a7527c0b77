//! Static risk classification for tool invocations.
//!
//! There is exactly one classifier in the system; both the stream renderer
//! and the permission engine go through it, so the two can never disagree
//! about a tool's tier.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// Tools that mutate the filesystem, run arbitrary commands, or touch
/// process/schema state.
const HIGH_RISK_TOOLS: &[&str] = &[
    "bash",
    "shell",
    "exec",
    "execute_command",
    "write_file",
    "edit_file",
    "apply_patch",
    "delete_file",
    "remove_file",
    "move_file",
    "run_sql",
    "kill_process",
];

/// Network tools that read from or send to the outside world.
const MEDIUM_RISK_TOOLS: &[&str] = &[
    "web_fetch",
    "http_request",
    "download_file",
    "git_push",
    "install_package",
];

/// Read-only tools; these are also the permission engine's safe-operation
/// table.
const LOW_RISK_TOOLS: &[&str] = &[
    "read_file",
    "list_directory",
    "glob",
    "grep",
    "search_files",
    "web_search",
    "git_status",
    "git_diff",
    "git_log",
];

/// Classify a tool name into a risk tier. Pure and total: unknown tools
/// classify as Medium so they can never land in the auto-allow table.
pub fn classify(tool_name: &str) -> RiskTier {
    let name = tool_name.trim().to_ascii_lowercase();
    if HIGH_RISK_TOOLS.contains(&name.as_str()) {
        RiskTier::High
    } else if LOW_RISK_TOOLS.contains(&name.as_str()) {
        RiskTier::Low
    } else if MEDIUM_RISK_TOOLS.contains(&name.as_str()) {
        RiskTier::Medium
    } else {
        RiskTier::Medium
    }
}

/// True when the tool is in the static read-only table.
pub fn is_read_only(tool_name: &str) -> bool {
    classify(tool_name) == RiskTier::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destructive_tools_are_high() {
        assert_eq!(classify("bash"), RiskTier::High);
        assert_eq!(classify("delete_file"), RiskTier::High);
        assert_eq!(classify("Apply_Patch"), RiskTier::High);
    }

    #[test]
    fn network_read_tools_are_medium() {
        assert_eq!(classify("web_fetch"), RiskTier::Medium);
        assert_eq!(classify("http_request"), RiskTier::Medium);
    }

    #[test]
    fn read_only_tools_are_low() {
        assert_eq!(classify("read_file"), RiskTier::Low);
        assert_eq!(classify("grep"), RiskTier::Low);
        assert!(is_read_only("git_diff"));
    }

    #[test]
    fn unknown_tools_default_to_medium() {
        assert_eq!(classify("quantum_flux"), RiskTier::Medium);
        assert!(!is_read_only("quantum_flux"));
    }

    #[test]
    fn classification_is_case_and_whitespace_insensitive() {
        assert_eq!(classify("  BASH "), RiskTier::High);
    }
}
