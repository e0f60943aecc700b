use std::fs;
use std::path::Path;
use std::sync::Arc;

use parley_core::config::{AppConfig, LoadOptions};
use parley_core::domain::session::SessionStatus;
use parley_core::negotiation::registry::SessionRegistry;
use parley_core::negotiation::request::SessionRequest;
use parley_core::negotiation::session::SessionSnapshot;
use parley_core::transport::TracingTransport;
use serde::Serialize;

use crate::commands::{serialize_payload, CommandResult};

/// Built-in plumbing job used when no scenario file is given.
pub const DEMO_SCENARIO: &str = include_str!("../../scenarios/demo.json");

pub const EXIT_ACCEPTED: u8 = 0;
pub const EXIT_RUNTIME: u8 = 1;
pub const EXIT_INPUT: u8 = 2;
pub const EXIT_NO_DEAL: u8 = 3;

#[derive(Debug, Serialize)]
struct SimulationReport<'a> {
    command: &'static str,
    status: &'static str,
    scenario: &'a str,
    session: SessionSnapshot,
}

pub fn run(options: LoadOptions, scenario: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("simulate", "config_validation", error.to_string(), EXIT_INPUT)
        }
    };

    let (label, raw) = match scenario {
        Some(path) => match fs::read_to_string(path) {
            Ok(raw) => (path.display().to_string(), raw),
            Err(error) => {
                return CommandResult::failure(
                    "simulate",
                    "scenario_read",
                    format!("could not read `{}`: {error}", path.display()),
                    EXIT_INPUT,
                )
            }
        },
        None => ("built-in demo".to_string(), DEMO_SCENARIO.to_string()),
    };
    let request: SessionRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(error) => {
            return CommandResult::failure("simulate", "scenario_parse", error.to_string(), EXIT_INPUT)
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure("simulate", "runtime", error.to_string(), EXIT_RUNTIME)
        }
    };

    let registry =
        SessionRegistry::new(config.negotiation.turn_settings(), Arc::new(TracingTransport));
    let constraints = request.constraints.resolve(&config.negotiation);
    let policies = request.policies.build(&config.negotiation);
    let session_id = match registry.create(request.parties, constraints, policies) {
        Ok(session_id) => session_id,
        Err(error) => {
            return CommandResult::failure("simulate", "scenario_invalid", error.to_string(), EXIT_INPUT)
        }
    };

    let snapshot = match runtime.block_on(registry.run_to_completion(&session_id)) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            return CommandResult::failure("simulate", "negotiation", error.to_string(), EXIT_RUNTIME)
        }
    };

    let exit_code =
        if snapshot.status == SessionStatus::Accepted { EXIT_ACCEPTED } else { EXIT_NO_DEAL };
    let summary = summary_line(&snapshot);
    let report = SimulationReport { command: "simulate", status: "ok", scenario: &label, session: snapshot };

    CommandResult { exit_code, output: format!("{summary}\n{}", serialize_payload(&report)) }
}

fn summary_line(snapshot: &SessionSnapshot) -> String {
    let reason = snapshot.termination.map(|reason| reason.code()).unwrap_or("NONE");
    match (&snapshot.final_offer, snapshot.status) {
        (Some(offer), SessionStatus::Accepted) => format!(
            "{}: ACCEPTED at {} on {} after {} round(s) ({reason})",
            snapshot.session_id, offer.price, offer.primary_slot, snapshot.rounds_played
        ),
        (_, status) => format!(
            "{}: {} after {} round(s) ({reason})",
            snapshot.session_id,
            format!("{status:?}").to_ascii_uppercase(),
            snapshot.rounds_played
        ),
    }
}
