//! Hub configuration: env > settings file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
const DEFAULT_LISTEN_PORT: u16 = 8716;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origins: Option<Vec<String>>,
}

pub fn settings_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

/// Read settings from file. A missing file yields defaults; a file that
/// exists but cannot be parsed is an error, to avoid silent data loss.
pub fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub api_token: String,
    pub api_token_is_new: bool,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub listen_host: String,
    pub listen_port: u16,
    pub cors_origins: Vec<String>,
}

impl Configuration {
    pub fn create() -> Result<Self> {
        // Resolve data directory: GATEHOUSE_HOME env or ~/.gatehouse
        let data_dir = if let Ok(home) = std::env::var("GATEHOUSE_HOME") {
            PathBuf::from(home)
        } else {
            let home = dirs_next::home_dir()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
            home.join(".gatehouse")
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let db_path = if let Ok(p) = std::env::var("GATEHOUSE_DB_PATH") {
            PathBuf::from(p)
        } else {
            data_dir.join("gatehouse.db")
        };

        let settings_path = settings_file_path(&data_dir);
        let settings = read_settings(&settings_path)?;

        let (api_token, api_token_is_new) = resolve_api_token(&settings_path, &settings)?;

        let listen_host = std::env::var("GATEHOUSE_HOST")
            .ok()
            .or_else(|| settings.listen_host.clone())
            .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string());
        let listen_port = std::env::var("GATEHOUSE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .or(settings.listen_port)
            .unwrap_or(DEFAULT_LISTEN_PORT);
        let cors_origins = std::env::var("GATEHOUSE_CORS_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .or_else(|| settings.cors_origins.clone())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Configuration {
            api_token,
            api_token_is_new,
            data_dir,
            db_path,
            listen_host,
            listen_port,
            cors_origins,
        })
    }
}

/// Token priority: env > file > generate-and-persist.
fn resolve_api_token(settings_path: &Path, settings: &Settings) -> Result<(String, bool)> {
    if let Ok(env_token) = std::env::var("GATEHOUSE_API_TOKEN")
        && !env_token.is_empty()
    {
        if env_token.len() < 16 {
            warn!("GATEHOUSE_API_TOKEN appears to be weak");
        }
        return Ok((env_token, false));
    }

    if let Some(ref token) = settings.api_token
        && !token.is_empty()
    {
        return Ok((token.clone(), false));
    }

    let token = generate_token();
    let mut updated = settings.clone();
    updated.api_token = Some(token.clone());
    write_settings(settings_path, &updated)?;
    Ok((token, true))
}

fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
