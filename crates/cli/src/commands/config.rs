use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use reqflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let managed_projects = config
        .identity
        .managed_projects
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let fields = vec![
        field("api.base_url", config.api.base_url.clone(), &["REQFLOW_API_BASE_URL"]),
        field(
            "api.token",
            if config.api.token.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            &["REQFLOW_API_TOKEN"],
        ),
        field(
            "api.timeout_secs",
            config.api.timeout_secs.to_string(),
            &["REQFLOW_API_TIMEOUT_SECS"],
        ),
        field(
            "connectivity.health_path",
            config.connectivity.health_path.clone(),
            &["REQFLOW_CONNECTIVITY_HEALTH_PATH"],
        ),
        field(
            "connectivity.interval_secs",
            config.connectivity.interval_secs.to_string(),
            &["REQFLOW_CONNECTIVITY_INTERVAL_SECS"],
        ),
        field(
            "connectivity.timeout_secs",
            config.connectivity.timeout_secs.to_string(),
            &["REQFLOW_CONNECTIVITY_TIMEOUT_SECS"],
        ),
        field(
            "identity.user_id",
            config
                .identity
                .user_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            &["REQFLOW_IDENTITY_USER_ID"],
        ),
        field("identity.name", or_unset(&config.identity.name), &["REQFLOW_IDENTITY_NAME"]),
        field(
            "identity.role",
            config
                .identity
                .role
                .map(|role| role.to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            &["REQFLOW_IDENTITY_ROLE"],
        ),
        field(
            "identity.managed_projects",
            or_unset(&managed_projects),
            &["REQFLOW_IDENTITY_MANAGED_PROJECTS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["REQFLOW_LOGGING_LEVEL", "REQFLOW_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["REQFLOW_LOGGING_FORMAT", "REQFLOW_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for Field { key_path, value, env_keys } in fields {
        let source = field_source(
            key_path,
            env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key_path, value, env_keys }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("reqflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/reqflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "<unset>".to_string()
    } else {
        value.to_string()
    }
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
