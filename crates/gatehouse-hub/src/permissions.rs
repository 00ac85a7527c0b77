//! Rule evaluation for tool calls. Ordering is load-bearing: persisted
//! denies beat the static denylist, which beats persisted allows, which
//! beat the low-risk shortcut. Anything unmatched falls through to a
//! prompt.

use std::sync::Arc;

use tracing::debug;

use gatehouse_shared::risk::{self, RiskTier};
use gatehouse_shared::schemas::{Decision, PermissionRule, RuleDecision, Verdict};

use crate::store::{rules, Store};

/// Substrings that always force a deny, matched against the lowercase
/// concatenation of tool, action and resource.
const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    "rm -rf *",
    "mkfs",
    "dd if=",
    ":(){ :|:& };:",
    "> /dev/sda",
    "chmod -r 777 /",
    "sudo rm",
    "drop database",
    "drop table",
    "truncate table",
    "git push --force",
    "git push -f",
    "force-push",
];

pub struct PermissionEngine {
    store: Arc<Store>,
}

impl PermissionEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Evaluate a tool call against the rules visible to `scope`.
    pub fn decide(&self, scope: &str, tool: &str, action: &str, resource: &str) -> Decision {
        let visible = rules::rules_for_scope(&self.store.conn(), scope);
        let decision = evaluate(&visible, tool, action, resource);
        debug!(
            tool,
            action,
            scope,
            verdict = ?decision.verdict,
            "permission evaluated"
        );
        decision
    }

    pub fn record(&self, rule: &PermissionRule) -> anyhow::Result<()> {
        rules::record_rule(&self.store.conn(), rule)
    }
}

/// Pure evaluation over an already-loaded rule set.
pub fn evaluate(visible: &[PermissionRule], tool: &str, action: &str, resource: &str) -> Decision {
    let risk = risk::classify(tool);

    for rule in visible {
        if rule.decision == RuleDecision::Deny && rule.matches(tool, action, resource) {
            return Decision {
                verdict: Verdict::AutoDeny,
                reason: format!("denied by rule for {} (scope {})", rule.tool, rule.scope),
                risk,
            };
        }
    }

    let haystack = format!("{} {} {}", tool, action, resource).to_lowercase();
    for pattern in DANGEROUS_PATTERNS {
        if haystack.contains(pattern) {
            return Decision {
                verdict: Verdict::AutoDeny,
                reason: format!("matches dangerous pattern: {pattern}"),
                risk: RiskTier::High,
            };
        }
    }

    for rule in visible {
        if rule.decision == RuleDecision::Allow && rule.matches(tool, action, resource) {
            return Decision {
                verdict: Verdict::AutoAllow,
                reason: format!("allowed by rule for {} (scope {})", rule.tool, rule.scope),
                risk,
            };
        }
    }

    if risk::is_read_only(tool) {
        return Decision {
            verdict: Verdict::AutoAllow,
            reason: "read-only tool".into(),
            risk,
        };
    }

    Decision {
        verdict: Verdict::NeedsPrompt,
        reason: "no matching rule".into(),
        risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_shared::schemas::GLOBAL_SCOPE;

    fn rule(tool: &str, resource: &str, decision: RuleDecision) -> PermissionRule {
        PermissionRule {
            tool: tool.into(),
            action: "*".into(),
            resource: resource.into(),
            decision,
            scope: GLOBAL_SCOPE.into(),
            created_at: 0,
        }
    }

    #[test]
    fn deny_rule_beats_allow_rule() {
        let rules = vec![
            rule("bash", "*", RuleDecision::Allow),
            rule("bash", "*", RuleDecision::Deny),
        ];
        let d = evaluate(&rules, "bash", "run", "ls");
        assert_eq!(d.verdict, Verdict::AutoDeny);
    }

    #[test]
    fn deny_rule_beats_dangerous_pattern_reason() {
        // Both would deny; the persisted rule is consulted first so its
        // reason wins.
        let rules = vec![rule("bash", "*", RuleDecision::Deny)];
        let d = evaluate(&rules, "bash", "run", "rm -rf /");
        assert_eq!(d.verdict, Verdict::AutoDeny);
        assert!(d.reason.contains("denied by rule"));
    }

    #[test]
    fn dangerous_pattern_beats_allow_rule() {
        let rules = vec![rule("bash", "*", RuleDecision::Allow)];
        let d = evaluate(&rules, "bash", "run", "sudo rm -rf /tmp/x");
        assert_eq!(d.verdict, Verdict::AutoDeny);
        assert_eq!(d.risk, RiskTier::High);
        assert!(d.reason.contains("dangerous pattern"));
    }

    #[test]
    fn pattern_matching_is_case_insensitive() {
        let d = evaluate(&[], "bash", "run", "DROP TABLE users");
        assert_eq!(d.verdict, Verdict::AutoDeny);
    }

    #[test]
    fn allow_rule_matches_on_resource_substring() {
        let rules = vec![rule("bash", "cargo", RuleDecision::Allow)];
        let d = evaluate(&rules, "bash", "run", "cargo fmt --check");
        assert_eq!(d.verdict, Verdict::AutoAllow);

        let miss = evaluate(&rules, "bash", "run", "npm install");
        assert_eq!(miss.verdict, Verdict::NeedsPrompt);
    }

    #[test]
    fn read_only_tools_pass_without_rules() {
        let d = evaluate(&[], "read_file", "read", "src/main.rs");
        assert_eq!(d.verdict, Verdict::AutoAllow);
        assert_eq!(d.risk, RiskTier::Low);
    }

    #[test]
    fn unknown_tool_needs_prompt() {
        let d = evaluate(&[], "custom_deploy", "invoke", "prod");
        assert_eq!(d.verdict, Verdict::NeedsPrompt);
        assert_eq!(d.risk, RiskTier::Medium);
    }

    #[test]
    fn engine_uses_scoped_rules() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let engine = PermissionEngine::new(store.clone());

        let mut r = rule("bash", "*", RuleDecision::Allow);
        r.scope = "proj1".into();
        engine.record(&r).unwrap();

        assert_eq!(
            engine.decide("proj1", "bash", "run", "ls").verdict,
            Verdict::AutoAllow
        );
        // A different project does not see proj1's rule
        assert_eq!(
            engine.decide("proj2", "bash", "run", "ls").verdict,
            Verdict::NeedsPrompt
        );
    }
}
