//! Router assembly.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use arbor_llm::ProviderFactory;
use arbor_rpc::RpcContext;
use arbor_runtime::{NotificationBus, SessionManager, ToolDispatcher};

use crate::websocket::ws_upgrade;

/// Model used when `session.create` omits one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The RPC handler context.
    pub rpc: RpcContext,
}

impl AppState {
    /// Assemble state over an opened event store.
    pub fn new(
        store: Arc<arbor_events::EventStore>,
        providers: Arc<dyn ProviderFactory>,
        tools: Option<Arc<dyn ToolDispatcher>>,
    ) -> Self {
        let bus = Arc::new(NotificationBus::new());
        let sessions = Arc::new(SessionManager::new(store, bus, providers, tools));
        Self {
            rpc: RpcContext::new(sessions, DEFAULT_MODEL),
        }
    }
}

/// Build the axum router: `/ws` for the RPC transport, `/healthz` for
/// liveness.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use arbor_events::{ConnectionConfig, EventStore, new_in_memory, run_migrations};
    use arbor_llm::provider::{Provider, ProviderError, ProviderResult};

    struct NoProviders;

    #[async_trait]
    impl ProviderFactory for NoProviders {
        async fn create_for_model(
            &self,
            model: &str,
        ) -> ProviderResult<Arc<dyn Provider>> {
            Err(ProviderError::UnknownModel {
                model: model.to_owned(),
            })
        }
    }

    fn make_state() -> AppState {
        let pool = new_in_memory(&ConnectionConfig {
            pool_size: 1,
            ..Default::default()
        })
        .unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        AppState::new(
            Arc::new(EventStore::new(pool)),
            Arc::new(NoProviders),
            None,
        )
    }

    #[tokio::test]
    async fn router_builds() {
        let state = make_state();
        let _router = build_router(state);
    }

    #[tokio::test]
    async fn rpc_context_is_usable() {
        let state = make_state();
        let response = arbor_rpc::dispatch(
            &state.rpc,
            arbor_rpc::RpcRequest {
                id: "1".into(),
                method: "session.create".into(),
                params: Some(serde_json::json!({"workingDirectory": "/tmp/p"})),
            },
        )
        .await;
        assert!(response.error.is_none());
    }
}
