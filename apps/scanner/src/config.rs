use std::{fmt, fs, path::Path, time::Duration};

use client_core::{
    store::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT},
    HttpStoreOptions, RetryPolicy, StoreConfig, DEFAULT_RESET_DELAY,
};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "scanner.toml";

#[derive(Clone, PartialEq)]
pub struct Settings {
    pub store_id: String,
    pub table_name: String,
    pub access_token: String,
    pub demo: bool,
    pub base_url: String,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub reset_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            store_id: String::new(),
            table_name: String::new(),
            access_token: String::new(),
            demo: false,
            base_url: DEFAULT_BASE_URL.into(),
            max_attempts: retry.max_attempts,
            backoff_base_ms: retry.base_delay.as_millis() as u64,
            reset_delay_ms: DEFAULT_RESET_DELAY.as_millis() as u64,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("store_id", &self.store_id)
            .field("table_name", &self.table_name)
            .field("access_token", &"<redacted>")
            .field("demo", &self.demo)
            .field("base_url", &self.base_url)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("reset_delay_ms", &self.reset_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Settings {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.store_id, &self.table_name, &self.access_token)
            .with_demo(self.demo)
    }

    pub fn store_options(&self) -> HttpStoreOptions {
        HttpStoreOptions {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
        )
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

/// Defaults, then `path`, then the process environment.
pub fn load_settings(path: &Path) -> Settings {
    load_settings_with(path, |key| std::env::var(key).ok())
}

pub fn load_settings_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => match toml::from_str::<toml::Table>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "config: ignoring malformed settings file"),
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "config: settings file unreadable"),
    }

    if let Some(v) = env_pair(&env, "SCANNER_STORE_ID", "APP__STORE_ID") {
        settings.store_id = v;
    }
    if let Some(v) = env_pair(&env, "SCANNER_TABLE_NAME", "APP__TABLE_NAME") {
        settings.table_name = v;
    }
    if let Some(v) = env_pair(&env, "SCANNER_ACCESS_TOKEN", "APP__ACCESS_TOKEN") {
        settings.access_token = v;
    }
    if let Some(v) = env_pair(&env, "SCANNER_DEMO", "APP__DEMO") {
        match parse_flag(&v) {
            Some(demo) => settings.demo = demo,
            None => warn!(value = %v, "config: ignoring malformed demo flag"),
        }
    }
    if let Some(v) = env_pair(&env, "SCANNER_BASE_URL", "APP__BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env_pair(&env, "SCANNER_MAX_ATTEMPTS", "APP__MAX_ATTEMPTS") {
        set_number(&mut settings.max_attempts, "max_attempts", &v);
    }
    if let Some(v) = env_pair(&env, "SCANNER_BACKOFF_BASE_MS", "APP__BACKOFF_BASE_MS") {
        set_number(&mut settings.backoff_base_ms, "backoff_base_ms", &v);
    }
    if let Some(v) = env_pair(&env, "SCANNER_RESET_DELAY_MS", "APP__RESET_DELAY_MS") {
        set_number(&mut settings.reset_delay_ms, "reset_delay_ms", &v);
    }
    if let Some(v) = env_pair(&env, "SCANNER_REQUEST_TIMEOUT_SECS", "APP__REQUEST_TIMEOUT_SECS") {
        set_number(&mut settings.request_timeout_secs, "request_timeout_secs", &v);
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &toml::Table) {
    if let Some(v) = file_cfg.get("store_id").and_then(toml::Value::as_str) {
        settings.store_id = v.to_string();
    }
    if let Some(v) = file_cfg.get("table_name").and_then(toml::Value::as_str) {
        settings.table_name = v.to_string();
    }
    if let Some(v) = file_cfg.get("access_token").and_then(toml::Value::as_str) {
        settings.access_token = v.to_string();
    }
    if let Some(v) = file_cfg.get("demo").and_then(toml::Value::as_bool) {
        settings.demo = v;
    }
    if let Some(v) = file_cfg.get("base_url").and_then(toml::Value::as_str) {
        settings.base_url = v.to_string();
    }
    file_number(file_cfg, "max_attempts", &mut settings.max_attempts);
    file_number(file_cfg, "backoff_base_ms", &mut settings.backoff_base_ms);
    file_number(file_cfg, "reset_delay_ms", &mut settings.reset_delay_ms);
    file_number(file_cfg, "request_timeout_secs", &mut settings.request_timeout_secs);
}

/// The `APP__` spelling wins when both are set.
fn env_pair(env: &impl Fn(&str) -> Option<String>, plain: &str, app: &str) -> Option<String> {
    env(app).or_else(|| env(plain))
}

fn file_number<T>(file_cfg: &toml::Table, key: &str, slot: &mut T)
where
    T: TryFrom<i64>,
{
    let Some(value) = file_cfg.get(key) else {
        return;
    };
    match value.as_integer().and_then(|raw| T::try_from(raw).ok()) {
        Some(parsed) => *slot = parsed,
        None => warn!(key, value = %value, "config: ignoring malformed number"),
    }
}

fn set_number<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = raw, "config: ignoring malformed number"),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
