//! Port selection for the embedded transport.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use tracing::{debug, warn};

/// Check whether a TCP port can be bound on all interfaces.
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok()
}

/// Ask the OS for an unused port.
pub fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    Ok(listener.local_addr()?.port())
}

/// Pick the transport port: the override if it is free, otherwise any free
/// port.
pub fn resolve_port(preferred: Option<u16>) -> std::io::Result<u16> {
    if let Some(port) = preferred {
        if port != 0 && is_port_free(port) {
            debug!(port, "Using configured transport port");
            return Ok(port);
        }
        warn!(port, "Configured transport port unavailable, choosing a free one");
    }
    free_port()
}
