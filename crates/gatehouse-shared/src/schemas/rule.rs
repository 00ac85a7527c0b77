//! Persisted permission rules and the engine's wire-level verdict.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::risk::RiskTier;

/// Scope value for rules that apply everywhere; any other scope string is a
/// project id.
pub const GLOBAL_SCOPE: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RuleDecision {
    Allow,
    Deny,
}

impl RuleDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// A persisted allow/deny rule. Created only from a human "don't ask again"
/// response; never auto-expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct PermissionRule {
    pub tool: String,
    pub action: String,
    pub resource: String,
    pub decision: RuleDecision,
    pub scope: String,
    pub created_at: i64,
}

impl PermissionRule {
    /// Field match: absent or `*` matches anything; tool and action match
    /// exactly, resource is a substring test.
    pub fn matches(&self, tool: &str, action: &str, resource: &str) -> bool {
        field_matches(&self.tool, tool)
            && field_matches(&self.action, action)
            && resource_matches(&self.resource, resource)
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == "*" || pattern == value
}

fn resource_matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == "*" || value.contains(pattern)
}

/// Engine verdict for one requested tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Verdict {
    AutoAllow,
    AutoDeny,
    NeedsPrompt,
}

/// A verdict always carries a human-readable reason so the UI can show why
/// an action was blocked, not just that it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
    pub risk: RiskTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(tool: &str, action: &str, resource: &str, decision: RuleDecision) -> PermissionRule {
        PermissionRule {
            tool: tool.into(),
            action: action.into(),
            resource: resource.into(),
            decision,
            scope: GLOBAL_SCOPE.into(),
            created_at: 0,
        }
    }

    #[test]
    fn exact_match() {
        let r = rule("bash", "run", "/tmp", RuleDecision::Allow);
        assert!(r.matches("bash", "run", "/tmp/build.sh"));
        assert!(!r.matches("bash", "run", "/home/x"));
        assert!(!r.matches("shell", "run", "/tmp/build.sh"));
    }

    #[test]
    fn wildcard_and_empty_fields_match_anything() {
        let r = rule("*", "", "*", RuleDecision::Deny);
        assert!(r.matches("anything", "at", "all"));
    }

    #[test]
    fn resource_is_a_substring_test() {
        let r = rule("write_file", "*", "node_modules", RuleDecision::Deny);
        assert!(r.matches("write_file", "write", "/app/node_modules/x.js"));
        assert!(!r.matches("write_file", "write", "/app/src/x.js"));
    }
}
