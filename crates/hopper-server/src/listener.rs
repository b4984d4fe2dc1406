//! Listener lifecycle: bind, accept, stop, and the reload diff.
//!
//! A listener's identity is its descriptor string. On reload the new and
//! old sets are diffed by descriptor: removed listeners are stopped
//! (cancelling their in-flight connections), unchanged ones keep running
//! untouched, added ones are started.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener as TcpAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::handler;
use crate::state::{RouterState, TableResolver};
use hopper_config::{ServerKind, ServerSpec};
use hopper_rules::RouteResolver;

/// Lifecycle state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Unstarted,
    Running,
    Stopped,
}

/// One bound listening socket with its accept loop.
#[derive(Debug)]
pub struct Listener {
    spec: ServerSpec,
    state: Arc<RouterState>,
    token: CancellationToken,
    local_addr: Option<SocketAddr>,
    status: ListenerStatus,
}

impl Listener {
    /// Creates an unstarted listener whose cancel scope is a child of
    /// `parent`.
    pub fn new(spec: ServerSpec, state: Arc<RouterState>, parent: &CancellationToken) -> Self {
        Self {
            spec,
            state,
            token: parent.child_token(),
            local_addr: None,
            status: ListenerStatus::Unstarted,
        }
    }

    /// Binds the socket and spawns the accept loop.
    pub async fn start(&mut self) -> std::io::Result<()> {
        let acceptor = TcpAcceptor::bind(self.spec.bind_addr()).await?;
        let local_addr = acceptor.local_addr()?;
        self.local_addr = Some(local_addr);
        self.status = ListenerStatus::Running;
        info!(descriptor = %self.spec, addr = %local_addr, "listener started");

        tokio::spawn(accept_loop(
            acceptor,
            self.spec.clone(),
            self.state.clone(),
            self.token.clone(),
        ));
        Ok(())
    }

    /// Cancels the listener scope: the accept loop exits and every
    /// in-flight connection of this listener is cancelled.
    pub fn stop(&mut self) {
        if self.status == ListenerStatus::Running {
            info!(descriptor = %self.spec, "listener stopped");
        }
        self.token.cancel();
        self.status = ListenerStatus::Stopped;
    }

    pub fn descriptor(&self) -> &str {
        self.spec.descriptor()
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    /// The actually bound address, once started. Differs from the
    /// descriptor when it binds port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn status(&self) -> ListenerStatus {
        self.status
    }
}

/// Per-listener dispatch data, prepared once at accept-loop start.
enum Dispatch {
    Socks5 {
        table: Arc<str>,
        resolver: Arc<dyn RouteResolver>,
    },
    Http {
        table: Arc<str>,
        resolver: Arc<dyn RouteResolver>,
    },
    Forward {
        chain: Arc<str>,
        dest_host: Arc<str>,
        dest_port: u16,
    },
}

impl Dispatch {
    fn new(spec: &ServerSpec, state: &Arc<RouterState>) -> Self {
        match spec.kind() {
            ServerKind::Socks5 { table } => Dispatch::Socks5 {
                table: Arc::from(table.as_str()),
                resolver: Arc::new(TableResolver::new(state.clone(), table.clone())),
            },
            ServerKind::Http { table } => Dispatch::Http {
                table: Arc::from(table.as_str()),
                resolver: Arc::new(TableResolver::new(state.clone(), table.clone())),
            },
            ServerKind::Forward {
                chain,
                dest_host,
                dest_port,
            } => Dispatch::Forward {
                chain: Arc::from(chain.as_str()),
                dest_host: Arc::from(dest_host.as_str()),
                dest_port: *dest_port,
            },
        }
    }
}

async fn accept_loop(
    acceptor: TcpAcceptor,
    spec: ServerSpec,
    state: Arc<RouterState>,
    token: CancellationToken,
) {
    let dispatch = Dispatch::new(&spec, &state);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!(descriptor = %spec, "accept loop exiting");
                break;
            }

            result = acceptor.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(descriptor = %spec, error = %e, "accept failed");
                        continue;
                    }
                };
                debug!(descriptor = %spec, %peer, "connection accepted");

                let conn_token = token.child_token();
                match &dispatch {
                    Dispatch::Socks5 { table, resolver } => {
                        tokio::spawn(handler::handle_socks5(
                            stream, peer, table.clone(), resolver.clone(),
                            state.clone(), conn_token,
                        ));
                    }
                    Dispatch::Http { table, resolver } => {
                        tokio::spawn(handler::handle_http(
                            stream, peer, table.clone(), resolver.clone(),
                            state.clone(), conn_token,
                        ));
                    }
                    Dispatch::Forward { chain, dest_host, dest_port } => {
                        tokio::spawn(handler::handle_forward(
                            stream, peer, chain.clone(), dest_host.clone(), *dest_port,
                            state.clone(), conn_token,
                        ));
                    }
                }
            }
        }
    }
}

/// The live set of listeners, diffed against each accepted configuration.
#[derive(Debug)]
pub struct ListenerSet {
    listeners: Vec<Listener>,
    state: Arc<RouterState>,
    root: CancellationToken,
}

impl ListenerSet {
    pub fn new(state: Arc<RouterState>, root: CancellationToken) -> Self {
        Self {
            listeners: Vec::new(),
            state,
            root,
        }
    }

    /// Applies a new listener set: stop removed, keep unchanged, start
    /// added. A listener that fails to bind is logged and skipped; the
    /// next reload retries it.
    pub async fn apply(&mut self, specs: Vec<ServerSpec>) {
        let mut kept = Vec::with_capacity(specs.len());
        for mut listener in self.listeners.drain(..) {
            if specs.iter().any(|spec| spec == listener.spec()) {
                kept.push(listener);
            } else {
                listener.stop();
            }
        }

        for spec in specs {
            if kept.iter().any(|l: &Listener| l.spec() == &spec) {
                continue;
            }
            let mut listener = Listener::new(spec, self.state.clone(), &self.root);
            match listener.start().await {
                Ok(()) => kept.push(listener),
                Err(e) => {
                    error!(descriptor = %listener.descriptor(), error = %e, "failed to start listener");
                }
            }
        }

        self.listeners = kept;
    }

    /// Stops every listener.
    pub fn stop_all(&mut self) {
        for listener in &mut self.listeners {
            listener.stop();
        }
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }
}
