use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::{serialize_payload, CommandResult};

const FIELDS: [(&str, &str); 14] = [
    ("negotiation.max_rounds", "PARLEY_NEGOTIATION_MAX_ROUNDS"),
    ("negotiation.decision_timeout_secs", "PARLEY_NEGOTIATION_DECISION_TIMEOUT_SECS"),
    ("negotiation.min_duration_minutes", "PARLEY_NEGOTIATION_MIN_DURATION_MINUTES"),
    ("negotiation.stall_epsilon_bps", "PARLEY_NEGOTIATION_STALL_EPSILON_BPS"),
    ("negotiation.stall_window", "PARLEY_NEGOTIATION_STALL_WINDOW"),
    ("negotiation.concession_cap_bps", "PARLEY_NEGOTIATION_CONCESSION_CAP_BPS"),
    ("registry.session_ttl_secs", "PARLEY_REGISTRY_SESSION_TTL_SECS"),
    ("registry.sweep_interval_secs", "PARLEY_REGISTRY_SWEEP_INTERVAL_SECS"),
    ("agent.clamp_to_reservation", "PARLEY_AGENT_CLAMP_TO_RESERVATION"),
    ("server.bind_address", "PARLEY_SERVER_BIND_ADDRESS"),
    ("server.port", "PARLEY_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("logging.level", "PARLEY_LOGGING_LEVEL"),
    ("logging.format", "PARLEY_LOGGING_FORMAT"),
];

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    precedence: &'static str,
    config: AppConfig,
    sources: BTreeMap<&'static str, String>,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("config", "config_validation", error.to_string(), 2)
        }
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let sources = FIELDS
        .iter()
        .map(|(key, env_key)| {
            (*key, field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref()))
        })
        .collect();

    let report = ConfigReport {
        command: "config",
        status: "ok",
        precedence: "override > env > file > default",
        config,
        sources,
    };
    CommandResult { exit_code: 0, output: serialize_payload(&report) }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }
    if key_path == "logging.level" && env::var_os("PARLEY_LOG_LEVEL").is_some() {
        return "env (PARLEY_LOG_LEVEL)".to_string();
    }
    if key_path == "logging.format" && env::var_os("PARLEY_LOG_FORMAT").is_some() {
        return "env (PARLEY_LOG_FORMAT)".to_string();
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
