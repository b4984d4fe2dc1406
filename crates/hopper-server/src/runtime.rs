//! The running router: shared tables plus the live listener set.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::listener::{ListenerSet, ListenerStatus};
use crate::state::{RouterState, build_tables};
use hopper_config::{Config, ConfigError, ServerSpec};

/// A snapshot row describing one listener, for logs and tests.
#[derive(Debug, Clone)]
pub struct ListenerInfo {
    pub descriptor: String,
    pub addr: Option<std::net::SocketAddr>,
    pub status: ListenerStatus,
}

/// Owns the shared state and the listener set, and applies configurations
/// to both. Cancelling the shutdown token stops everything.
pub struct Router {
    state: Arc<RouterState>,
    listeners: Mutex<ListenerSet>,
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(shutdown: CancellationToken) -> Self {
        let state = Arc::new(RouterState::default());
        let listeners = Mutex::new(ListenerSet::new(state.clone(), shutdown.clone()));
        Self {
            state,
            listeners,
            shutdown,
        }
    }

    pub fn state(&self) -> &Arc<RouterState> {
        &self.state
    }

    /// Validates and applies a configuration: swap the tables, then diff
    /// the listener set. On error nothing is changed and the previous
    /// configuration stays live.
    pub async fn apply(&self, config: &Config) -> Result<(), ConfigError> {
        let tables = build_tables(config)?;
        let specs = config
            .servers
            .iter()
            .map(|descriptor| ServerSpec::parse(descriptor))
            .collect::<Result<Vec<_>, _>>()?;

        self.state.replace(tables);
        self.listeners.lock().await.apply(specs).await;
        info!(
            chains = self.state.tables().chains.len(),
            routes = self.state.tables().routes.len(),
            "configuration applied"
        );
        Ok(())
    }

    /// Stops all listeners and cancels everything below the shutdown
    /// scope.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.listeners.lock().await.stop_all();
    }

    /// Current listener set, one row per listener.
    pub async fn listener_info(&self) -> Vec<ListenerInfo> {
        self.listeners
            .lock()
            .await
            .listeners()
            .iter()
            .map(|l| ListenerInfo {
                descriptor: l.descriptor().to_string(),
                addr: l.local_addr(),
                status: l.status(),
            })
            .collect()
    }
}
