use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::constraints::{
    BudgetBand, Constraints, DEFAULT_MAX_ROUNDS, DEFAULT_MIN_DURATION_MINUTES,
    DEFAULT_STALL_EPSILON_BPS, DEFAULT_STALL_WINDOW, MAX_BASIS_POINTS, MAX_DURATION_MINUTES,
    MAX_ROUNDS_LIMIT, MAX_STALL_WINDOW, MIN_STALL_WINDOW,
};
use crate::domain::schedule::CalendarAnchor;
use crate::negotiation::concession::DEFAULT_CONCESSION_CAP_BPS;
use crate::negotiation::driver::TurnSettings;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub negotiation: NegotiationConfig,
    pub registry: RegistryConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NegotiationConfig {
    pub max_rounds: u32,
    pub decision_timeout_secs: u64,
    pub min_duration_minutes: u32,
    pub stall_epsilon_bps: u32,
    pub stall_window: usize,
    pub concession_cap_bps: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryConfig {
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentConfig {
    pub clamp_to_reservation: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
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
    pub log_level: Option<String>,
    pub max_rounds: Option<u32>,
    pub decision_timeout_secs: Option<u64>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
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
            negotiation: NegotiationConfig {
                max_rounds: DEFAULT_MAX_ROUNDS,
                decision_timeout_secs: 10,
                min_duration_minutes: DEFAULT_MIN_DURATION_MINUTES,
                stall_epsilon_bps: DEFAULT_STALL_EPSILON_BPS,
                stall_window: DEFAULT_STALL_WINDOW,
                concession_cap_bps: DEFAULT_CONCESSION_CAP_BPS,
            },
            registry: RegistryConfig { session_ttl_secs: 3600, sweep_interval_secs: 60 },
            agent: AgentConfig { clamp_to_reservation: true },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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

impl NegotiationConfig {
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings { decision_timeout: Duration::from_secs(self.decision_timeout_secs) }
    }

    /// Session constraints carrying this configuration's limits.
    pub fn constraints(
        &self,
        latest_completion: DateTime<Utc>,
        budget: BudgetBand,
        calendar: CalendarAnchor,
    ) -> Constraints {
        Constraints {
            min_duration_minutes: self.min_duration_minutes,
            max_rounds: self.max_rounds,
            stall_epsilon_bps: self.stall_epsilon_bps,
            stall_window: self.stall_window,
            ..Constraints::new(latest_completion, budget, calendar)
        }
    }
}

impl RegistryConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(negotiation) = patch.negotiation {
            if let Some(max_rounds) = negotiation.max_rounds {
                self.negotiation.max_rounds = max_rounds;
            }
            if let Some(decision_timeout_secs) = negotiation.decision_timeout_secs {
                self.negotiation.decision_timeout_secs = decision_timeout_secs;
            }
            if let Some(min_duration_minutes) = negotiation.min_duration_minutes {
                self.negotiation.min_duration_minutes = min_duration_minutes;
            }
            if let Some(stall_epsilon_bps) = negotiation.stall_epsilon_bps {
                self.negotiation.stall_epsilon_bps = stall_epsilon_bps;
            }
            if let Some(stall_window) = negotiation.stall_window {
                self.negotiation.stall_window = stall_window;
            }
            if let Some(concession_cap_bps) = negotiation.concession_cap_bps {
                self.negotiation.concession_cap_bps = concession_cap_bps;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(session_ttl_secs) = registry.session_ttl_secs {
                self.registry.session_ttl_secs = session_ttl_secs;
            }
            if let Some(sweep_interval_secs) = registry.sweep_interval_secs {
                self.registry.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(clamp_to_reservation) = agent.clamp_to_reservation {
                self.agent.clamp_to_reservation = clamp_to_reservation;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("PARLEY_NEGOTIATION_MAX_ROUNDS") {
            self.negotiation.max_rounds = parse_u32("PARLEY_NEGOTIATION_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_DECISION_TIMEOUT_SECS") {
            self.negotiation.decision_timeout_secs =
                parse_u64("PARLEY_NEGOTIATION_DECISION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_MIN_DURATION_MINUTES") {
            self.negotiation.min_duration_minutes =
                parse_u32("PARLEY_NEGOTIATION_MIN_DURATION_MINUTES", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_STALL_EPSILON_BPS") {
            self.negotiation.stall_epsilon_bps =
                parse_u32("PARLEY_NEGOTIATION_STALL_EPSILON_BPS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_STALL_WINDOW") {
            self.negotiation.stall_window = parse_usize("PARLEY_NEGOTIATION_STALL_WINDOW", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_CONCESSION_CAP_BPS") {
            self.negotiation.concession_cap_bps =
                parse_u32("PARLEY_NEGOTIATION_CONCESSION_CAP_BPS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_REGISTRY_SESSION_TTL_SECS") {
            self.registry.session_ttl_secs = parse_u64("PARLEY_REGISTRY_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_REGISTRY_SWEEP_INTERVAL_SECS") {
            self.registry.sweep_interval_secs =
                parse_u64("PARLEY_REGISTRY_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_AGENT_CLAMP_TO_RESERVATION") {
            self.agent.clamp_to_reservation = parse_bool("PARLEY_AGENT_CLAMP_TO_RESERVATION", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_PORT") {
            self.server.port = parse_u16("PARLEY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max_rounds) = overrides.max_rounds {
            self.negotiation.max_rounds = max_rounds;
        }
        if let Some(decision_timeout_secs) = overrides.decision_timeout_secs {
            self.negotiation.decision_timeout_secs = decision_timeout_secs;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_negotiation(&self.negotiation)?;
        validate_registry(&self.registry)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
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

fn validate_negotiation(negotiation: &NegotiationConfig) -> Result<(), ConfigError> {
    if !(1..=MAX_ROUNDS_LIMIT).contains(&negotiation.max_rounds) {
        return Err(ConfigError::Validation(format!(
            "negotiation.max_rounds must be in range 1..={MAX_ROUNDS_LIMIT}"
        )));
    }

    if negotiation.decision_timeout_secs == 0 || negotiation.decision_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "negotiation.decision_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(1..=MAX_DURATION_MINUTES).contains(&negotiation.min_duration_minutes) {
        return Err(ConfigError::Validation(format!(
            "negotiation.min_duration_minutes must be in range 1..={MAX_DURATION_MINUTES}"
        )));
    }

    if !(MIN_STALL_WINDOW..=MAX_STALL_WINDOW).contains(&negotiation.stall_window) {
        return Err(ConfigError::Validation(format!(
            "negotiation.stall_window must be in range {MIN_STALL_WINDOW}..={MAX_STALL_WINDOW}"
        )));
    }

    if negotiation.stall_epsilon_bps > MAX_BASIS_POINTS
        || negotiation.concession_cap_bps > MAX_BASIS_POINTS
    {
        return Err(ConfigError::Validation(format!(
            "negotiation basis-point settings must not exceed {MAX_BASIS_POINTS}"
        )));
    }

    if negotiation.concession_cap_bps == 0 {
        return Err(ConfigError::Validation(
            "negotiation.concession_cap_bps must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.session_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "registry.session_ttl_secs must be greater than zero".to_string(),
        ));
    }

    if registry.sweep_interval_secs == 0 || registry.sweep_interval_secs > registry.session_ttl_secs {
        return Err(ConfigError::Validation(
            "registry.sweep_interval_secs must be in range 1..=session_ttl_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    negotiation: Option<NegotiationPatch>,
    registry: Option<RegistryPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct NegotiationPatch {
    max_rounds: Option<u32>,
    decision_timeout_secs: Option<u64>,
    min_duration_minutes: Option<u32>,
    stall_epsilon_bps: Option<u32>,
    stall_window: Option<usize>,
    concession_cap_bps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    session_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    clamp_to_reservation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
