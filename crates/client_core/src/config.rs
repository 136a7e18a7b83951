use std::{fs, path::Path, time::Duration};

use shared::protocol::DEFAULT_ASPECT_RATIO;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "clipdeck.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_url: String,
    pub api_key: String,
    pub poll_interval: Duration,
    pub poll_backoff_max: Duration,
    pub moments_limit: u32,
    pub aspect_ratio: String,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            api_key: "dev-key".into(),
            poll_interval: Duration::from_millis(3000),
            poll_backoff_max: Duration::from_secs(30),
            moments_limit: 12,
            aspect_ratio: DEFAULT_ASPECT_RATIO.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Defaults, then `clipdeck.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub fn apply_file_overrides(settings: &mut ClientSettings, raw: &str) {
    let table = match raw.parse::<toml::Table>() {
        Ok(table) => table,
        Err(err) => {
            warn!("config: ignoring malformed settings file: {err}");
            return;
        }
    };

    for (key, value) in &table {
        let Some(value) = toml_scalar(value) else {
            warn!("config: ignoring non-scalar setting {key}");
            continue;
        };
        apply_setting(settings, key, &value);
    }
}

/// Applies `CLIPDECK_*` variables, then the `APP__*` spellings which win.
pub fn apply_env_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    const KEYS: [&str; 7] = [
        "api_url",
        "api_key",
        "poll_interval_ms",
        "poll_backoff_max_ms",
        "moments_limit",
        "aspect_ratio",
        "request_timeout_secs",
    ];

    for key in KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(v) = lookup(&format!("CLIPDECK_{upper}")) {
            apply_setting(settings, key, &v);
        }
        if let Some(v) = lookup(&format!("APP__{upper}")) {
            apply_setting(settings, key, &v);
        }
    }
}

fn apply_setting(settings: &mut ClientSettings, key: &str, value: &str) {
    let value = value.trim();
    match key {
        "api_url" => {
            if !value.is_empty() {
                settings.api_url = value.trim_end_matches('/').to_string();
            }
        }
        "api_key" => settings.api_key = value.to_string(),
        "aspect_ratio" => {
            if !value.is_empty() {
                settings.aspect_ratio = value.to_string();
            }
        }
        "poll_interval_ms" => {
            if let Some(ms) = parse_positive(key, value) {
                settings.poll_interval = Duration::from_millis(ms);
            }
        }
        "poll_backoff_max_ms" => {
            if let Some(ms) = parse_positive(key, value) {
                settings.poll_backoff_max = Duration::from_millis(ms);
            }
        }
        "moments_limit" => {
            if let Some(limit) = parse_positive(key, value) {
                settings.moments_limit = limit.min(u64::from(u32::MAX)) as u32;
            }
        }
        "request_timeout_secs" => {
            if let Some(secs) = parse_positive(key, value) {
                settings.request_timeout = Duration::from_secs(secs);
            }
        }
        other => warn!("config: unknown setting {other}"),
    }
}

fn parse_positive(key: &str, value: &str) -> Option<u64> {
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        _ => {
            warn!("config: {key} must be a positive integer, got {value:?}");
            None
        }
    }
}

fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let mut settings = ClientSettings::default();
        apply_file_overrides(
            &mut settings,
            r#"
api_url = "https://clips.example.com/"
api_key = "secret"
poll_interval_ms = 1500
moments_limit = 20
"#,
        );
        assert_eq!(settings.api_url, "https://clips.example.com");
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.poll_interval, Duration::from_millis(1500));
        assert_eq!(settings.moments_limit, 20);
        assert_eq!(settings.aspect_ratio, "9:16");
    }

    #[test]
    fn env_overrides_file_and_app_prefix_wins() {
        let mut settings = ClientSettings::default();
        apply_file_overrides(&mut settings, "api_key = \"from-file\"");

        let env: HashMap<&str, &str> = HashMap::from([
            ("CLIPDECK_API_KEY", "from-clipdeck-env"),
            ("APP__API_KEY", "from-app-env"),
            ("CLIPDECK_REQUEST_TIMEOUT_SECS", "5"),
        ]);
        apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.api_key, "from-app-env");
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_numbers_keep_previous_values() {
        let mut settings = ClientSettings::default();
        apply_file_overrides(&mut settings, "poll_interval_ms = 0\nmoments_limit = \"many\"");
        assert_eq!(settings.poll_interval, Duration::from_millis(3000));
        assert_eq!(settings.moments_limit, 12);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let mut settings = ClientSettings::default();
        apply_file_overrides(&mut settings, "api_url = [unterminated");
        assert_eq!(settings, ClientSettings::default());
    }
}
