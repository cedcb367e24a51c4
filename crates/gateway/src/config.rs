use std::fs;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub token_secret: String,
    pub token_ttl_seconds: i64,
    pub subject_header: String,
    pub heartbeat_interval_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub include_sender: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8443".into(),
            token_secret: "devsecret".into(),
            token_ttl_seconds: 300,
            subject_header: "x-authenticated-subject".into(),
            heartbeat_interval_seconds: 30,
            idle_timeout_seconds: 75,
            include_sender: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    token_secret: Option<String>,
    token_ttl_seconds: Option<i64>,
    subject_header: Option<String>,
    heartbeat_interval_seconds: Option<u64>,
    idle_timeout_seconds: Option<u64>,
    include_sender: Option<bool>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("gateway.toml") {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            apply_file_settings(&mut settings, file_cfg);
        }
    }

    if let Ok(v) = std::env::var("GATEWAY_BIND") {
        settings.bind_addr = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Ok(v) = std::env::var("TOKEN_SECRET") {
        settings.token_secret = v;
    }
    if let Ok(v) = std::env::var("APP__TOKEN_SECRET") {
        settings.token_secret = v;
    }

    if let Ok(v) = std::env::var("APP__TOKEN_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.token_ttl_seconds = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__SUBJECT_HEADER") {
        settings.subject_header = v;
    }

    if let Ok(v) = std::env::var("APP__HEARTBEAT_INTERVAL_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.heartbeat_interval_seconds = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__IDLE_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.idle_timeout_seconds = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__INCLUDE_SENDER") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.include_sender = parsed;
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file: FileSettings) {
    if let Some(v) = file.bind_addr {
        settings.bind_addr = v;
    }
    if let Some(v) = file.token_secret {
        settings.token_secret = v;
    }
    if let Some(v) = file.token_ttl_seconds {
        settings.token_ttl_seconds = v;
    }
    if let Some(v) = file.subject_header {
        settings.subject_header = v;
    }
    if let Some(v) = file.heartbeat_interval_seconds {
        settings.heartbeat_interval_seconds = v;
    }
    if let Some(v) = file.idle_timeout_seconds {
        settings.idle_timeout_seconds = v;
    }
    if let Some(v) = file.include_sender {
        settings.include_sender = v;
    }
}
