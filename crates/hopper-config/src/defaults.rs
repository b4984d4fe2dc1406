//! Default configuration values.

pub fn default_proxy_dns() -> bool {
    true
}

/// Default per-hop TCP connect timeout in milliseconds (reserved field).
pub fn default_tcp_connect_timeout() -> u64 {
    1000
}

/// Default chain read timeout in milliseconds.
pub fn default_tcp_read_timeout() -> u64 {
    2000
}

pub fn default_route() -> String {
    hopper_rules::DROP_ROUTE.to_string()
}
