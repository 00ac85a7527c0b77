//! Agent-side configuration.
//!
//! Priority: env > settings file > default. The settings file is shared
//! with the hub (~/.gatehouse/settings.json), so a locally-run hub and
//! bridge agree on the token without extra setup.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_API_URL: &str = "http://localhost:8716";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub api_url: String,
    pub api_token: String,
    pub home_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl Configuration {
    /// Create configuration from environment variables and defaults.
    pub fn create() -> anyhow::Result<Self> {
        let api_url =
            std::env::var("GATEHOUSE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let api_token = std::env::var("GATEHOUSE_API_TOKEN").unwrap_or_default();

        let home_dir = if let Ok(home) = std::env::var("GATEHOUSE_HOME") {
            PathBuf::from(home)
        } else {
            let user_home = dirs_next::home_dir()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
            user_home.join(".gatehouse")
        };
        std::fs::create_dir_all(&home_dir)?;

        let settings_file = home_dir.join("settings.json");

        Ok(Self {
            api_url,
            api_token,
            home_dir,
            settings_file,
        })
    }

    /// Merge in the settings file where env left gaps.
    pub fn load_with_settings(&mut self) -> anyhow::Result<()> {
        let settings = read_settings(&self.settings_file)?;

        if self.api_token.is_empty() {
            if let Some(ref token) = settings.api_token {
                tracing::debug!("GATEHOUSE_API_TOKEN loaded from settings file");
                self.api_token = token.clone();
            }
        } else {
            tracing::debug!("GATEHOUSE_API_TOKEN loaded from environment variable");
        }

        if std::env::var("GATEHOUSE_API_URL").is_err()
            && let Some(ref url) = settings.api_url
        {
            self.api_url = url.clone();
        }

        Ok(())
    }
}

fn read_settings(path: &std::path::Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}
