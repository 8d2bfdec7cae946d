use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    /// When unset the live pointer is kept in process memory.
    pub redis_url: Option<String>,
    pub admin_token: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/demo_night.db".into(),
            redis_url: None,
            admin_token: "devtoken".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("redis_url") {
        settings.redis_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("admin_token") {
        settings.admin_token = v.clone();
    }
}

// `APP__*` names win over the short ones.
fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("REDIS_URL") {
        settings.redis_url = Some(v);
    }
    if let Some(v) = var("APP__REDIS_URL") {
        settings.redis_url = Some(v);
    }
    if settings.redis_url.as_deref().is_some_and(|v| v.trim().is_empty()) {
        settings.redis_url = None;
    }

    if let Some(v) = var("ADMIN_TOKEN") {
        settings.admin_token = v;
    }
    if let Some(v) = var("APP__ADMIN_TOKEN") {
        settings.admin_token = v;
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return sqlite_url_for_path(path);
    }

    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return sqlite_url_for_path(path);
    }

    sqlite_url_for_path(raw_database_url)
}

// Drive-letter paths keep a single colon so sqlx does not read the drive as a host.
fn sqlite_url_for_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    if has_drive_letter(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
