//! Persisted permission rules.

use rusqlite::Connection;
use uuid::Uuid;

use gatehouse_shared::schemas::{PermissionRule, RuleDecision, GLOBAL_SCOPE};

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<PermissionRule> {
    let decision_str: String = row.get("decision")?;
    Ok(PermissionRule {
        tool: row.get("tool")?,
        action: row.get("action")?,
        resource: row.get("resource")?,
        decision: RuleDecision::parse(&decision_str).unwrap_or(RuleDecision::Deny),
        scope: row.get("scope")?,
        created_at: row.get("created_at")?,
    })
}

/// Upsert a rule. A re-recorded (tool, action, resource, scope) key takes
/// the new decision and timestamp.
pub fn record_rule(conn: &Connection, rule: &PermissionRule) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO permission_rules
            (id, tool, action, resource, decision, scope, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(tool, action, resource, scope)
         DO UPDATE SET decision = excluded.decision,
                       created_at = excluded.created_at",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            rule.tool,
            rule.action,
            rule.resource,
            rule.decision.as_str(),
            rule.scope,
            rule.created_at,
        ],
    )?;
    Ok(())
}

/// Rules visible to a scope: its own plus the global ones.
pub fn rules_for_scope(conn: &Connection, scope: &str) -> Vec<PermissionRule> {
    let mut stmt = match conn.prepare(
        "SELECT * FROM permission_rules
         WHERE scope IN (?1, ?2)
         ORDER BY created_at ASC",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    stmt.query_map(rusqlite::params![scope, GLOBAL_SCOPE], row_to_rule)
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

pub fn list_rules(conn: &Connection) -> Vec<PermissionRule> {
    let mut stmt = match conn.prepare("SELECT * FROM permission_rules ORDER BY created_at ASC") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    stmt.query_map([], row_to_rule)
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn rule(tool: &str, decision: RuleDecision, scope: &str) -> PermissionRule {
        PermissionRule {
            tool: tool.into(),
            action: "*".into(),
            resource: "*".into(),
            decision,
            scope: scope.into(),
            created_at: 100,
        }
    }

    #[test]
    fn scope_query_includes_global() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();

        record_rule(conn, &rule("bash", RuleDecision::Deny, GLOBAL_SCOPE)).unwrap();
        record_rule(conn, &rule("read_file", RuleDecision::Allow, "proj1")).unwrap();
        record_rule(conn, &rule("write_file", RuleDecision::Allow, "proj2")).unwrap();

        let visible = rules_for_scope(conn, "proj1");
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().any(|r| r.tool == "bash"));
        assert!(visible.iter().any(|r| r.tool == "read_file"));

        assert_eq!(list_rules(conn).len(), 3);
    }

    #[test]
    fn re_recording_replaces_decision() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();

        record_rule(conn, &rule("bash", RuleDecision::Allow, "proj1")).unwrap();
        let mut updated = rule("bash", RuleDecision::Deny, "proj1");
        updated.created_at = 200;
        record_rule(conn, &updated).unwrap();

        let rules = rules_for_scope(conn, "proj1");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].decision, RuleDecision::Deny);
        assert_eq!(rules[0].created_at, 200);
    }
}
