//! Loopback connectivity checks used before and after launching the daemon.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Whether something accepts TCP connections on `127.0.0.1:<port>`.
pub(crate) fn port_accepts(port: u16) -> bool {
    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&address, CONNECT_TIMEOUT).is_ok()
}

/// Fails when `127.0.0.1:<port>` cannot be bound, i.e. another listener owns
/// it and would answer the readiness check in the daemon's place.
pub(crate) fn ensure_port_free(port: u16) -> io::Result<()> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_tracks_listener() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        assert!(port_accepts(port));
        drop(listener);
        assert!(!port_accepts(port));
    }

    #[test]
    fn bound_port_is_not_free() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        let error = ensure_port_free(port).expect_err("port is taken");
        assert_eq!(error.kind(), io::ErrorKind::AddrInUse);
        drop(listener);
        ensure_port_free(port).expect("released port is free");
    }
}
