//! Per-connection handlers.
//!
//! One flow for every listener kind: obtain the target address, resolve
//! it to a chain, connect through the chain, answer the client in its own
//! protocol, then relay. Every outcome is one audit line.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::audit::{self, Verb};
use crate::relay::relay;
use crate::state::RouterState;
use crate::{http, socks5};
use hopper_proto::{
    CMD_CONNECT, REPLY_COMMAND_NOT_SUPPORTED, REPLY_CONNECTION_NOT_ALLOWED,
    REPLY_GENERAL_FAILURE, REPLY_SUCCEEDED, join_host_port,
};
use hopper_rules::{DROP_ROUTE, RouteResolver};

/// Handles one accepted SOCKS5 client connection.
pub(crate) async fn handle_socks5(
    mut client: TcpStream,
    peer: SocketAddr,
    table: Arc<str>,
    resolver: Arc<dyn RouteResolver>,
    state: Arc<RouterState>,
    token: CancellationToken,
) {
    let tag = format!("SOCKS5[{table}]");

    let negotiated = tokio::select! {
        r = socks5::negotiate_method(&mut client) => r,
        _ = token.cancelled() => return,
    };
    if let Err(e) = negotiated {
        debug!(%peer, error = %e, "socks5 negotiation rejected");
        return;
    }

    let request = tokio::select! {
        r = socks5::read_request(&mut client) => r,
        _ = token.cancelled() => return,
    };
    let (command, addr) = match request {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(%peer, error = %e, "socks5 request rejected");
            let _ = socks5::send_reply(&mut client, REPLY_GENERAL_FAILURE).await;
            return;
        }
    };

    if command != CMD_CONNECT {
        error!(%peer, command, "only the CONNECT command is supported");
        let _ = socks5::send_reply(&mut client, REPLY_COMMAND_NOT_SUPPORTED).await;
        return;
    }

    let route = match resolver.resolve(&addr) {
        Ok(route) => route,
        Err(e) => {
            error!(%peer, target_addr = %addr, error = %e, "route lookup failed");
            let _ = socks5::send_reply(&mut client, REPLY_GENERAL_FAILURE).await;
            return;
        }
    };
    debug!(%peer, target_addr = %addr, chain = %route, "routed");

    if route == DROP_ROUTE {
        audit::record(Verb::Dropped, &tag, peer, &route, &addr, "");
        let _ = socks5::send_reply(&mut client, REPLY_CONNECTION_NOT_ALLOWED).await;
        return;
    }

    let tables = state.tables();
    let Some(chain) = tables.chains.get(&route) else {
        error!(%peer, chain = %route, "chain not declared in configuration");
        let _ = socks5::send_reply(&mut client, REPLY_GENERAL_FAILURE).await;
        return;
    };

    let (target, trace) = match chain.connect(&token, &tables.hosts, &addr).await {
        Ok(established) => established,
        Err(e) => {
            error!(%peer, chain = %route, target_addr = %addr, error = %e, "chain connect failed");
            audit::record(Verb::Error, &tag, peer, &route, &addr, &e.trace);
            let _ = socks5::send_reply(&mut client, REPLY_GENERAL_FAILURE).await;
            return;
        }
    };

    audit::record(Verb::Open, &tag, peer, &route, &addr, &trace);
    if let Err(e) = socks5::send_reply(&mut client, REPLY_SUCCEEDED).await {
        error!(%peer, error = %e, "failed to send success reply");
        audit::record(Verb::Close, &tag, peer, &route, &addr, &trace);
        return;
    }

    let stats = relay(client, target, &token).await;
    debug!(%peer, up = stats.client_to_target, down = stats.target_to_client, "relay finished");
    audit::record(Verb::Close, &tag, peer, &route, &addr, &trace);
}

/// Handles one accepted HTTP CONNECT client connection.
pub(crate) async fn handle_http(
    mut client: TcpStream,
    peer: SocketAddr,
    table: Arc<str>,
    resolver: Arc<dyn RouteResolver>,
    state: Arc<RouterState>,
    token: CancellationToken,
) {
    let tag = format!("HTTP[{table}]");

    let request = tokio::select! {
        r = http::read_request(&mut client) => r,
        _ = token.cancelled() => return,
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            debug!(%peer, error = %e, "http request rejected");
            return;
        }
    };

    if request.method != "CONNECT" {
        error!(%peer, method = %request.method, "only the CONNECT method is supported");
        let _ = http::write_status(&mut client, &request, 405).await;
        return;
    }
    if request.effective_host() != request.target {
        error!(%peer, host = %request.effective_host(), target_addr = %request.target,
            "Host header does not match the request target");
        let _ = http::write_status(&mut client, &request, 400).await;
        return;
    }
    let addr = request.target.clone();

    let route = match resolver.resolve(&addr) {
        Ok(route) => route,
        Err(e) => {
            error!(%peer, target_addr = %addr, error = %e, "route lookup failed");
            let _ = http::write_status(&mut client, &request, 400).await;
            return;
        }
    };
    debug!(%peer, target_addr = %addr, chain = %route, "routed");

    if route == DROP_ROUTE {
        audit::record(Verb::Dropped, &tag, peer, &route, &addr, "");
        let _ = http::write_status(&mut client, &request, 403).await;
        return;
    }

    let tables = state.tables();
    let Some(chain) = tables.chains.get(&route) else {
        error!(%peer, chain = %route, "chain not declared in configuration");
        let _ = http::write_status(&mut client, &request, 500).await;
        return;
    };

    let (target, trace) = match chain.connect(&token, &tables.hosts, &addr).await {
        Ok(established) => established,
        Err(e) => {
            error!(%peer, chain = %route, target_addr = %addr, error = %e, "chain connect failed");
            audit::record(Verb::Error, &tag, peer, &route, &addr, &e.trace);
            let _ = http::write_status(&mut client, &request, 502).await;
            return;
        }
    };

    audit::record(Verb::Open, &tag, peer, &route, &addr, &trace);
    if let Err(e) = http::write_status(&mut client, &request, 200).await {
        error!(%peer, error = %e, "failed to send success response");
        audit::record(Verb::Close, &tag, peer, &route, &addr, &trace);
        return;
    }

    let stats = relay(client, target, &token).await;
    debug!(%peer, up = stats.client_to_target, down = stats.target_to_client, "relay finished");
    audit::record(Verb::Close, &tag, peer, &route, &addr, &trace);
}

/// Handles one accepted connection on a fixed-destination forwarder.
pub(crate) async fn handle_forward(
    client: TcpStream,
    peer: SocketAddr,
    chain_name: Arc<str>,
    dest_host: Arc<str>,
    dest_port: u16,
    state: Arc<RouterState>,
    token: CancellationToken,
) {
    let dest = join_host_port(&dest_host, dest_port);
    let tag = format!("Fwd[{chain_name}:{dest}]");

    let tables = state.tables();
    let Some(chain) = tables.chains.get(chain_name.as_ref()) else {
        error!(%peer, chain = %chain_name, "chain not declared in configuration");
        return;
    };

    let (target, trace) = match chain.connect(&token, &tables.hosts, &dest).await {
        Ok(established) => established,
        Err(e) => {
            error!(%peer, chain = %chain_name, target_addr = %dest, error = %e, "chain connect failed");
            audit::record(Verb::Error, &tag, peer, &chain_name, &dest, &e.trace);
            return;
        }
    };

    audit::record(Verb::Open, &tag, peer, &chain_name, &dest, &trace);
    let stats = relay(client, target, &token).await;
    debug!(%peer, up = stats.client_to_target, down = stats.target_to_client, "relay finished");
    audit::record(Verb::Close, &tag, peer, &chain_name, &dest, &trace);
}
