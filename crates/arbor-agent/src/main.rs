//! arbor server binary.
//!
//! Reads configuration from the environment, opens the event database, and
//! serves the WebSocket gateway.
//!
//! Exit codes: 0 normal shutdown, 2 bad configuration, 3 database
//! unrecoverable.

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use arbor_events::{ConnectionConfig, EventStore, new_file, run_migrations};
use arbor_llm::provider::{Provider, ProviderError, ProviderFactory, ProviderResult};
use arbor_logging::LogFormat;
use arbor_server::{AppState, ServerConfig, build_router};

const EXIT_BAD_CONFIG: u8 = 2;
const EXIT_DATABASE: u8 = 3;

/// Placeholder factory until concrete provider adapters are linked in; every
/// model resolves to an auth failure naming the missing key, which surfaces
/// through the normal `error.provider` / `turn.failed` path.
struct EnvKeyFactory {
    config: ServerConfig,
}

#[async_trait]
impl ProviderFactory for EnvKeyFactory {
    async fn create_for_model(&self, model: &str) -> ProviderResult<Arc<dyn Provider>> {
        let Some(kind) = arbor_llm::detect_provider(model) else {
            return Err(ProviderError::UnknownModel {
                model: model.to_owned(),
            });
        };
        let key = match kind {
            arbor_llm::ProviderKind::Anthropic => self.config.anthropic_api_key.as_ref(),
            arbor_llm::ProviderKind::OpenAi => self.config.openai_api_key.as_ref(),
            arbor_llm::ProviderKind::Google => self.config.gemini_api_key.as_ref(),
        };
        match key {
            Some(_) => Err(ProviderError::Other {
                message: format!("no adapter linked for provider {kind}"),
            }),
            None => Err(ProviderError::Auth {
                message: format!("{} is not set", kind.api_key_env()),
            }),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    arbor_logging::init("info", LogFormat::Pretty);

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };

    let store = match open_store(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, path = %config.database_path, "database unrecoverable");
            return ExitCode::from(EXIT_DATABASE);
        }
    };

    let factory = Arc::new(EnvKeyFactory {
        config: config.clone(),
    });
    let state = AppState::new(store, factory, None);
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr, "failed to bind");
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };

    info!(addr = %listener.local_addr().map_or(addr.clone(), |a| a.to_string()), "arbor server listening");

    match axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

fn open_store(database_path: &str) -> anyhow::Result<Arc<EventStore>> {
    let pool = new_file(database_path, &ConnectionConfig::default())?;
    {
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
    }
    Ok(Arc::new(EventStore::new(pool)))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
