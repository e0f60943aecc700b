use std::sync::Arc;

use parley_core::config::{AppConfig, ConfigError, LoadOptions, ServerConfig};
use parley_core::negotiation::registry::SessionRegistry;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::ApiState;
use crate::transport::ChannelTransport;

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<SessionRegistry>,
    pub transport: ChannelTransport,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not bind `{address}`: {source}")]
    Bind { address: String, source: std::io::Error },
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    Ok(bootstrap_with_config(config))
}

pub fn bootstrap_with_config(config: AppConfig) -> Application {
    let transport = ChannelTransport::default();
    let registry = Arc::new(SessionRegistry::new(
        config.negotiation.turn_settings(),
        Arc::new(transport.clone()),
    ));
    info!(
        event_name = "system.bootstrap.registry_ready",
        correlation_id = "bootstrap",
        decision_timeout_secs = config.negotiation.decision_timeout_secs,
        max_rounds = config.negotiation.max_rounds,
        "session registry initialized"
    );

    Application { config, registry, transport }
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState { registry: Arc::clone(&self.registry), negotiation: self.config.negotiation.clone() }
    }
}

pub async fn bind(server: &ServerConfig) -> Result<TcpListener, BootstrapError> {
    let address = format!("{}:{}", server.bind_address, server.port);
    TcpListener::bind(&address).await.map_err(|source| BootstrapError::Bind { address, source })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::config::{ConfigOverrides, LoadOptions};
    use parley_core::domain::session::SessionId;
    use parley_core::errors::RegistryError;

    use crate::bootstrap::{bind, bootstrap, BootstrapError};

    #[test]
    fn bootstrap_applies_overrides_to_the_registry() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                decision_timeout_secs: Some(3),
                max_rounds: Some(8),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.registry.settings().decision_timeout, Duration::from_secs(3));
        assert_eq!(app.api_state().negotiation.max_rounds, 8);
        assert!(app.registry.is_empty());
        assert_eq!(
            app.registry.get(&SessionId("neg-missing".into())),
            Err(RegistryError::SessionNotFound(SessionId("neg-missing".into())))
        );
    }

    #[test]
    fn bootstrap_fails_fast_on_invalid_config() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides { max_rounds: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        });

        let message = result.err().expect("error").to_string();
        assert!(message.contains("max_rounds"));
    }

    #[tokio::test]
    async fn bind_reports_the_address_it_could_not_use() {
        let app = bootstrap(LoadOptions::default()).expect("bootstrap");
        let mut server = app.config.server.clone();
        server.port = 0;
        let taken = bind(&server).await.expect("ephemeral port");
        server.port = taken.local_addr().expect("local addr").port();

        match bind(&server).await {
            Err(BootstrapError::Bind { address, .. }) => {
                assert_eq!(address, format!("127.0.0.1:{}", server.port));
            }
            other => panic!("expected bind failure, got {:?}", other.map(|_| ())),
        }
    }
}
