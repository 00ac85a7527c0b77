//! Prompt table access. The conditional UPDATEs keyed on
//! `status = 'pending'` are what guarantee exactly one thread of control
//! ever moves a prompt into a terminal state.

use rusqlite::Connection;

use gatehouse_shared::schemas::{
    InteractivePrompt, PromptContext, PromptStatus, PromptType,
};

/// Outcome of a response submission.
#[derive(Debug, Clone, PartialEq)]
pub enum RespondOutcome {
    Updated(InteractivePrompt),
    /// The prompt already reached a terminal state; the submission is
    /// rejected, not overwritten.
    NotPending(PromptStatus),
    NotFound,
}

fn row_to_prompt(row: &rusqlite::Row) -> rusqlite::Result<InteractivePrompt> {
    let options_json: String = row.get("options")?;
    let context_json: String = row.get("context")?;
    let status_str: String = row.get("status")?;
    let type_str: String = row.get("prompt_type")?;

    Ok(InteractivePrompt {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        project_id: row.get("project_id")?,
        session_id: row.get("session_id")?,
        prompt_type: PromptType::parse(&type_str).unwrap_or(PromptType::ToolPermission),
        title: row.get("title")?,
        message: row.get("message")?,
        options: serde_json::from_str(&options_json).unwrap_or_default(),
        context: serde_json::from_str(&context_json).unwrap_or(PromptContext::Opaque {
            extra: Default::default(),
        }),
        status: PromptStatus::parse(&status_str).unwrap_or(PromptStatus::Pending),
        selected_option: row.get("selected_option")?,
        timeout_at: row.get("timeout_at")?,
        created_at: row.get("created_at")?,
        responded_at: row.get("responded_at")?,
        fallback_storage: false,
    })
}

pub fn create_prompt(conn: &Connection, prompt: &InteractivePrompt) -> anyhow::Result<()> {
    let options = serde_json::to_string(&prompt.options)?;
    let context = serde_json::to_string(&prompt.context)?;

    conn.execute(
        "INSERT INTO interactive_prompts
            (id, conversation_id, project_id, session_id, prompt_type, title,
             message, options, context, status, selected_option, timeout_at,
             created_at, responded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            prompt.id,
            prompt.conversation_id,
            prompt.project_id,
            prompt.session_id,
            prompt.prompt_type.as_str(),
            prompt.title,
            prompt.message,
            options,
            context,
            prompt.status.as_str(),
            prompt.selected_option,
            prompt.timeout_at,
            prompt.created_at,
            prompt.responded_at,
        ],
    )?;
    Ok(())
}

pub fn get_prompt(conn: &Connection, id: &str) -> Option<InteractivePrompt> {
    conn.prepare("SELECT * FROM interactive_prompts WHERE id = ?1")
        .ok()?
        .query_row(rusqlite::params![id], row_to_prompt)
        .ok()
}

/// Transition pending → answered. Conditional on the current status so a
/// second submission loses the race instead of overwriting.
pub fn respond_prompt(
    conn: &Connection,
    id: &str,
    selected_option: &str,
    now: i64,
) -> anyhow::Result<RespondOutcome> {
    let updated = conn.execute(
        "UPDATE interactive_prompts
         SET status = 'answered', selected_option = ?2, responded_at = ?3
         WHERE id = ?1 AND status = 'pending'",
        rusqlite::params![id, selected_option, now],
    )?;

    if updated == 1 {
        let prompt = get_prompt(conn, id)
            .ok_or_else(|| anyhow::anyhow!("answered prompt {id} disappeared"))?;
        return Ok(RespondOutcome::Updated(prompt));
    }

    match get_prompt(conn, id) {
        Some(p) => Ok(RespondOutcome::NotPending(p.status)),
        None => Ok(RespondOutcome::NotFound),
    }
}

/// Transition pending → timeout. Returns true only for the call that
/// actually performed the transition.
pub fn expire_prompt(conn: &Connection, id: &str, now: i64) -> bool {
    conn.execute(
        "UPDATE interactive_prompts
         SET status = 'timeout', responded_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        rusqlite::params![id, now],
    )
    .map(|n| n == 1)
    .unwrap_or(false)
}

/// Expire every pending prompt whose deadline has passed. Returns the
/// number of prompts transitioned.
pub fn expire_due(conn: &Connection, now: i64) -> usize {
    conn.execute(
        "UPDATE interactive_prompts
         SET status = 'timeout', responded_at = ?1
         WHERE status = 'pending' AND timeout_at <= ?1",
        rusqlite::params![now],
    )
    .unwrap_or(0)
}

/// Flag a pending prompt for the pull-based secondary channel.
pub fn mark_for_pickup(conn: &Connection, id: &str) -> bool {
    conn.execute(
        "UPDATE interactive_prompts SET pickup = 1
         WHERE id = ?1 AND status = 'pending'",
        rusqlite::params![id],
    )
    .map(|n| n == 1)
    .unwrap_or(false)
}

/// Pending prompts flagged for pickup, scoped to a conversation or project.
pub fn pending_pickup(
    conn: &Connection,
    conversation_id: Option<&str>,
    project_id: Option<&str>,
) -> Vec<InteractivePrompt> {
    let (clause, param): (&str, &str) = match (conversation_id, project_id) {
        (Some(c), _) => ("conversation_id = ?1", c),
        (None, Some(p)) => ("project_id = ?1", p),
        (None, None) => return Vec::new(),
    };

    let sql = format!(
        "SELECT * FROM interactive_prompts
         WHERE {clause} AND status = 'pending' AND pickup = 1
         ORDER BY created_at ASC"
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    stmt.query_map(rusqlite::params![param], row_to_prompt)
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

/// Tool triple carried by a prompt's context when it gates a tool call.
pub fn context_tool(context: &PromptContext) -> Option<(&str, &str, &str)> {
    match context {
        PromptContext::ToolPermission {
            tool_name,
            action,
            resource,
            ..
        } => Some((tool_name, action, resource)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use gatehouse_shared::risk::RiskTier;
    use gatehouse_shared::schemas::default_options;
    use serde_json::json;

    fn sample(id: &str) -> InteractivePrompt {
        InteractivePrompt {
            id: id.into(),
            conversation_id: "c1".into(),
            project_id: "proj1".into(),
            session_id: None,
            prompt_type: PromptType::ToolPermission,
            title: "Run shell command".into(),
            message: "bash wants to run `rm build`".into(),
            options: default_options(),
            context: PromptContext::ToolPermission {
                tool_name: "bash".into(),
                action: "run".into(),
                resource: "rm build".into(),
                parameters: json!({"command": "rm build"}),
                risk_tier: RiskTier::High,
                working_directory: None,
                extra: Default::default(),
            },
            status: PromptStatus::Pending,
            selected_option: None,
            timeout_at: 9_999_999,
            created_at: 1_000,
            responded_at: None,
            fallback_storage: false,
        }
    }

    #[test]
    fn prompt_crud_roundtrip() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();

        create_prompt(conn, &sample("p1")).unwrap();
        let loaded = get_prompt(conn, "p1").unwrap();
        assert_eq!(loaded.status, PromptStatus::Pending);
        assert_eq!(loaded.options.len(), 3);
        assert!(get_prompt(conn, "nope").is_none());
    }

    #[test]
    fn respond_is_conditional_on_pending() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();
        create_prompt(conn, &sample("p1")).unwrap();

        let first = respond_prompt(conn, "p1", "3", 2_000).unwrap();
        match first {
            RespondOutcome::Updated(p) => {
                assert_eq!(p.status, PromptStatus::Answered);
                assert_eq!(p.selected_option.as_deref(), Some("3"));
                assert_eq!(p.responded_at, Some(2_000));
            }
            other => panic!("expected Updated, got {other:?}"),
        }

        // Second submission is rejected, not overwritten
        let second = respond_prompt(conn, "p1", "2", 3_000).unwrap();
        assert_eq!(second, RespondOutcome::NotPending(PromptStatus::Answered));
        let p = get_prompt(conn, "p1").unwrap();
        assert_eq!(p.selected_option.as_deref(), Some("3"));
    }

    #[test]
    fn respond_unknown_prompt_is_not_found() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();
        assert_eq!(
            respond_prompt(conn, "missing", "1", 0).unwrap(),
            RespondOutcome::NotFound
        );
    }

    #[test]
    fn expire_is_conditional_and_idempotent() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();
        create_prompt(conn, &sample("p1")).unwrap();

        assert!(expire_prompt(conn, "p1", 5_000));
        assert!(!expire_prompt(conn, "p1", 6_000));
        let p = get_prompt(conn, "p1").unwrap();
        assert_eq!(p.status, PromptStatus::Timeout);

        // An answered prompt can no longer time out
        create_prompt(conn, &sample("p2")).unwrap();
        respond_prompt(conn, "p2", "1", 0).unwrap();
        assert!(!expire_prompt(conn, "p2", 9_000));
    }

    #[test]
    fn expire_due_sweeps_only_overdue_pending() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();

        let mut due = sample("due");
        due.timeout_at = 1_000;
        create_prompt(conn, &due).unwrap();
        create_prompt(conn, &sample("later")).unwrap();

        assert_eq!(expire_due(conn, 2_000), 1);
        assert_eq!(get_prompt(conn, "due").unwrap().status, PromptStatus::Timeout);
        assert_eq!(
            get_prompt(conn, "later").unwrap().status,
            PromptStatus::Pending
        );
    }

    #[test]
    fn pickup_flag_scopes_queries() {
        let store = Store::new_in_memory().unwrap();
        let conn = &store.conn();
        create_prompt(conn, &sample("p1")).unwrap();
        create_prompt(conn, &sample("p2")).unwrap();

        assert!(mark_for_pickup(conn, "p1"));
        let by_conv = pending_pickup(conn, Some("c1"), None);
        assert_eq!(by_conv.len(), 1);
        assert_eq!(by_conv[0].id, "p1");

        let by_proj = pending_pickup(conn, None, Some("proj1"));
        assert_eq!(by_proj.len(), 1);
        assert!(pending_pickup(conn, None, None).is_empty());

        // Terminal prompts leave the pickup list
        respond_prompt(conn, "p1", "1", 0).unwrap();
        assert!(pending_pickup(conn, Some("c1"), None).is_empty());
        // And can no longer be flagged
        assert!(!mark_for_pickup(conn, "p1"));
    }
}
