pub mod prompts;
pub mod rules;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SCHEMA_VERSION: i64 = 1;

const REQUIRED_TABLES: &[&str] = &["interactive_prompts", "permission_rules"];

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(path: &str) -> Result<Self> {
        let db_path = Path::new(path);
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("failed to create database directory {}", dir.display())
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
            }
        }

        let conn =
            Connection::open(path).with_context(|| format!("failed to open database at {path}"))?;

        // Restrict DB and WAL/SHM files to the owning user
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for suffix in &["", "-wal", "-shm"] {
                let file_path = format!("{path}{suffix}");
                let _ =
                    std::fs::set_permissions(&file_path, std::fs::Permissions::from_mode(0o600));
            }
        }

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure_pragmas()?;
        store.initialize_schema()?;

        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure_pragmas()?;
        store.initialize_schema()?;

        Ok(store)
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
            )
            .context("failed to configure database pragmas")?;

        debug!("database pragmas configured");
        Ok(())
    }

    fn get_schema_version(&self) -> Result<i64> {
        let version: i64 = self
            .conn
            .lock()
            .unwrap()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("failed to read schema version")?;
        Ok(version)
    }

    fn set_schema_version(&self, version: i64) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .pragma_update(None, "user_version", version)
            .context("failed to set schema version")?;
        Ok(())
    }

    fn initialize_schema(&self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version == 0 {
            self.create_tables()?;
            self.set_schema_version(SCHEMA_VERSION)?;
            info!("created database schema v{SCHEMA_VERSION}");
            return Ok(());
        }

        if current_version < SCHEMA_VERSION {
            warn!(
                current_version,
                target_version = SCHEMA_VERSION,
                "database schema is older than this build; no migrations defined yet"
            );
        }

        self.assert_required_tables()?;

        Ok(())
    }

    fn assert_required_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .context("failed to prepare table check query")?;

        let missing: Vec<&str> = REQUIRED_TABLES
            .iter()
            .filter(|&&table| !stmt.exists(rusqlite::params![table]).unwrap_or(false))
            .copied()
            .collect();

        if !missing.is_empty() {
            anyhow::bail!(
                "SQLite schema is missing required tables ({}). \
                 Back up and rebuild the database.",
                missing.join(", ")
            );
        }

        Ok(())
    }

    pub(crate) fn create_tables(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS interactive_prompts (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                session_id TEXT,
                prompt_type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                options TEXT NOT NULL,
                context TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                selected_option TEXT,
                pickup INTEGER NOT NULL DEFAULT 0,
                timeout_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                responded_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_prompts_conversation
                ON interactive_prompts(conversation_id, status);
            CREATE INDEX IF NOT EXISTS idx_prompts_project
                ON interactive_prompts(project_id, status);
            CREATE INDEX IF NOT EXISTS idx_prompts_due
                ON interactive_prompts(status, timeout_at);

            CREATE TABLE IF NOT EXISTS permission_rules (
                id TEXT PRIMARY KEY,
                tool TEXT NOT NULL,
                action TEXT NOT NULL,
                resource TEXT NOT NULL,
                decision TEXT NOT NULL,
                scope TEXT NOT NULL DEFAULT 'global',
                created_at INTEGER NOT NULL,
                UNIQUE(tool, action, resource, scope)
            );
            CREATE INDEX IF NOT EXISTS idx_rules_scope ON permission_rules(scope);",
            )
            .context("failed to create tables")?;

        Ok(())
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_creates_schema() {
        let store = Store::new_in_memory().unwrap();
        let version = store.get_schema_version().unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        store.assert_required_tables().unwrap();
    }
}
