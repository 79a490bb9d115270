use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{Actor, ProjectId, Role, UserId};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub connectivity: ConnectivityConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConnectivityConfig {
    pub health_path: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct IdentityConfig {
    pub user_id: Option<i64>,
    pub name: String,
    pub role: Option<Role>,
    pub managed_projects: Vec<i64>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub user_id: Option<i64>,
    pub role: Option<Role>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://127.0.0.1:8000/api/v1".to_string(),
                token: None,
                timeout_secs: 30,
            },
            connectivity: ConnectivityConfig {
                health_path: "/health".to_string(),
                interval_secs: 10,
                timeout_secs: 3,
            },
            identity: IdentityConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("reqflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The configured caller identity. Every remote action is authorized against it.
    pub fn actor(&self) -> Result<Actor, ConfigError> {
        let user_id = self.identity.user_id.ok_or_else(|| {
            ConfigError::Validation(
                "identity.user_id is required (set it in reqflow.toml or REQFLOW_IDENTITY_USER_ID)"
                    .to_string(),
            )
        })?;
        let role = self.identity.role.ok_or_else(|| {
            ConfigError::Validation(
                "identity.role is required (project_manager|purchaser|dept_manager|general_manager)"
                    .to_string(),
            )
        })?;
        Ok(Actor {
            user_id: UserId(user_id),
            name: self.identity.name.clone(),
            role,
            managed_projects: self.identity.managed_projects.iter().copied().map(ProjectId).collect(),
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(api) = patch.api {
            if let Some(base_url) = api.base_url {
                self.api.base_url = base_url;
            }
            if let Some(api_token_value) = api.token {
                self.api.token = Some(secret_value(api_token_value));
            }
            if let Some(timeout_secs) = api.timeout_secs {
                self.api.timeout_secs = timeout_secs;
            }
        }

        if let Some(connectivity) = patch.connectivity {
            if let Some(health_path) = connectivity.health_path {
                self.connectivity.health_path = health_path;
            }
            if let Some(interval_secs) = connectivity.interval_secs {
                self.connectivity.interval_secs = interval_secs;
            }
            if let Some(timeout_secs) = connectivity.timeout_secs {
                self.connectivity.timeout_secs = timeout_secs;
            }
        }

        if let Some(identity) = patch.identity {
            if let Some(user_id) = identity.user_id {
                self.identity.user_id = Some(user_id);
            }
            if let Some(name) = identity.name {
                self.identity.name = name;
            }
            if let Some(role) = identity.role {
                self.identity.role = Some(role);
            }
            if let Some(managed_projects) = identity.managed_projects {
                self.identity.managed_projects = managed_projects;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REQFLOW_API_BASE_URL") {
            self.api.base_url = value;
        }
        if let Some(value) = read_env("REQFLOW_API_TOKEN") {
            self.api.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("REQFLOW_API_TIMEOUT_SECS") {
            self.api.timeout_secs = parse_u64("REQFLOW_API_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REQFLOW_CONNECTIVITY_HEALTH_PATH") {
            self.connectivity.health_path = value;
        }
        if let Some(value) = read_env("REQFLOW_CONNECTIVITY_INTERVAL_SECS") {
            self.connectivity.interval_secs =
                parse_u64("REQFLOW_CONNECTIVITY_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("REQFLOW_CONNECTIVITY_TIMEOUT_SECS") {
            self.connectivity.timeout_secs =
                parse_u64("REQFLOW_CONNECTIVITY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REQFLOW_IDENTITY_USER_ID") {
            self.identity.user_id = Some(parse_i64("REQFLOW_IDENTITY_USER_ID", &value)?);
        }
        if let Some(value) = read_env("REQFLOW_IDENTITY_NAME") {
            self.identity.name = value;
        }
        if let Some(value) = read_env("REQFLOW_IDENTITY_ROLE") {
            self.identity.role = Some(parse_role("REQFLOW_IDENTITY_ROLE", &value)?);
        }
        if let Some(value) = read_env("REQFLOW_IDENTITY_MANAGED_PROJECTS") {
            self.identity.managed_projects =
                parse_id_list("REQFLOW_IDENTITY_MANAGED_PROJECTS", &value)?;
        }

        let log_level = read_env("REQFLOW_LOGGING_LEVEL").or_else(|| read_env("REQFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REQFLOW_LOGGING_FORMAT").or_else(|| read_env("REQFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_base_url) = overrides.api_base_url {
            self.api.base_url = api_base_url;
        }
        if let Some(api_token) = overrides.api_token {
            self.api.token = Some(secret_value(api_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(user_id) = overrides.user_id {
            self.identity.user_id = Some(user_id);
        }
        if let Some(role) = overrides.role {
            self.identity.role = Some(role);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_api(&self.api)?;
        validate_connectivity(&self.connectivity)?;
        validate_identity(&self.identity)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("reqflow.toml"), PathBuf::from("config/reqflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_api(api: &ApiConfig) -> Result<(), ConfigError> {
    let base_url = api.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "api.base_url must start with http:// or https://".to_string(),
        ));
    }

    if api.timeout_secs == 0 || api.timeout_secs > 300 {
        return Err(ConfigError::Validation("api.timeout_secs must be in range 1..=300".to_string()));
    }

    Ok(())
}

fn validate_connectivity(connectivity: &ConnectivityConfig) -> Result<(), ConfigError> {
    if !connectivity.health_path.starts_with('/') {
        return Err(ConfigError::Validation(
            "connectivity.health_path must start with `/`".to_string(),
        ));
    }

    if connectivity.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "connectivity.interval_secs must be greater than zero".to_string(),
        ));
    }

    if connectivity.timeout_secs == 0 || connectivity.timeout_secs > connectivity.interval_secs {
        return Err(ConfigError::Validation(
            "connectivity.timeout_secs must be in range 1..=connectivity.interval_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity(identity: &IdentityConfig) -> Result<(), ConfigError> {
    if identity.user_id.is_some_and(|user_id| user_id <= 0) {
        return Err(ConfigError::Validation(
            "identity.user_id must be a positive integer".to_string(),
        ));
    }

    if identity.managed_projects.iter().any(|project| *project <= 0) {
        return Err(ConfigError::Validation(
            "identity.managed_projects must contain positive project ids".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_role(key: &str, value: &str) -> Result<Role, ConfigError> {
    value.parse::<Role>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_id_list(key: &str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_i64(key, part))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    api: Option<ApiPatch>,
    connectivity: Option<ConnectivityPatch>,
    identity: Option<IdentityPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPatch {
    base_url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectivityPatch {
    health_path: Option<String>,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityPatch {
    user_id: Option<i64>,
    name: Option<String>,
    role: Option<Role>,
    managed_projects: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::actor::{ProjectId, Role};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_REQFLOW_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("reqflow.toml");
            fs::write(
                &path,
                r#"
[api]
base_url = "https://erp.example.test/api/v1"
token = "${TEST_REQFLOW_TOKEN}"

[identity]
user_id = 7
name = "Li Wei"
role = "project_manager"
managed_projects = [3, 5]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.api.token.as_ref().map(|token| token.expose_secret().to_string())
                    == Some("token-from-env".to_string()),
                "api token should be interpolated from environment",
            )?;
            let actor = config.actor().map_err(|err| err.to_string())?;
            ensure(actor.role == Role::ProjectManager, "role should come from file")?;
            ensure(
                actor.managed_projects == vec![ProjectId(3), ProjectId(5)],
                "managed projects should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_REQFLOW_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REQFLOW_LOG_LEVEL", "warn");
        env::set_var("REQFLOW_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["REQFLOW_LOG_LEVEL", "REQFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REQFLOW_API_BASE_URL", "https://from-env.test/api/v1");
        env::set_var("REQFLOW_IDENTITY_ROLE", "purchaser");
        env::set_var("REQFLOW_IDENTITY_MANAGED_PROJECTS", "4, 9");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("reqflow.toml");
            fs::write(
                &path,
                r#"
[api]
base_url = "https://from-file.test/api/v1"
timeout_secs = 12

[identity]
user_id = 8
role = "dept_manager"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    role: Some(Role::GeneralManager),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.api.base_url == "https://from-env.test/api/v1",
                "env base url should win over file",
            )?;
            ensure(config.api.timeout_secs == 12, "file timeout should win over default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.identity.role == Some(Role::GeneralManager),
                "override role should win over env and file",
            )?;
            ensure(
                config.identity.managed_projects == vec![4, 9],
                "managed projects should parse from a comma list",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "REQFLOW_API_BASE_URL",
            "REQFLOW_IDENTITY_ROLE",
            "REQFLOW_IDENTITY_MANAGED_PROJECTS",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REQFLOW_API_BASE_URL", "ftp://erp.example.test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("api.base_url")
            );
            ensure(has_message, "validation failure should mention api.base_url")
        })();

        clear_vars(&["REQFLOW_API_BASE_URL"]);
        result
    }

    #[test]
    fn unknown_role_in_env_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REQFLOW_IDENTITY_ROLE", "admin");

        let result = (|| -> Result<(), String> {
            let failed = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "REQFLOW_IDENTITY_ROLE"
            );
            ensure(failed, "admin is not a workflow role")
        })();

        clear_vars(&["REQFLOW_IDENTITY_ROLE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REQFLOW_API_TOKEN", "tok-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("tok-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.actor().is_err(), "identity is required before acting")?;
            Ok(())
        })();

        clear_vars(&["REQFLOW_API_TOKEN"]);
        result
    }
}
