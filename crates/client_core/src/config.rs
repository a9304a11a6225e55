use std::{fs, time::Duration};

use anyhow::Context;
use serde::Deserialize;

const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub upload_chunk_bytes: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3001".into(),
            request_timeout_secs: 30,
            upload_chunk_bytes: 64 * 1024,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    upload_chunk_bytes: Option<usize>,
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_client_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        if let Err(error) = apply_file_overrides(&mut settings, &raw) {
            tracing::warn!(%error, file = SETTINGS_FILE, "ignoring unreadable settings file");
        }
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_overrides(settings: &mut ClientSettings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw).context("invalid client.toml")?;
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.upload_chunk_bytes {
        settings.upload_chunk_bytes = v;
    }
    Ok(())
}

fn apply_env_overrides(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("TODO_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = var("APP__UPLOAD_CHUNK_BYTES") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.upload_chunk_bytes = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_then_env_overrides() {
        let mut settings = ClientSettings::default();
        apply_file_overrides(
            &mut settings,
            "server_url = \"http://todo.local:8080\"\nupload_chunk_bytes = 4096\n",
        )
        .expect("valid toml");
        assert_eq!(settings.server_url, "http://todo.local:8080");
        assert_eq!(settings.upload_chunk_bytes, 4096);

        apply_env_overrides(&mut settings, |key| match key {
            "APP__SERVER_URL" => Some("http://10.0.0.2:3001".into()),
            "APP__REQUEST_TIMEOUT_SECS" => Some("5".into()),
            _ => None,
        });
        assert_eq!(settings.server_url, "http://10.0.0.2:3001");
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_is_raised_to_one_second() {
        let settings = ClientSettings {
            request_timeout_secs: 0,
            ..ClientSettings::default()
        };
        assert_eq!(settings.request_timeout(), Duration::from_secs(1));
    }
}
