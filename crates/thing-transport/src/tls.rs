//! rustls-backed socket transport.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::error::{ConnectError, Result, TransportError};
use crate::{Connection, Connector, EndpointConfig, Received};

/// Opens TLS connections with a shared client configuration.
#[derive(Clone)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
}

impl TlsConnector {
    /// Create a connector from a prepared client configuration.
    #[must_use]
    pub const fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    /// Create a connector trusting the bundled Mozilla root certificates.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Tls` if the crypto provider rejects the default
    /// protocol versions.
    pub fn with_webpki_roots() -> std::result::Result<Self, ConnectError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self::new(Arc::new(config)))
    }

    fn resolve(endpoint: &EndpointConfig) -> std::result::Result<SocketAddr, ConnectError> {
        let mut addrs = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|source| ConnectError::Resolve {
                host: endpoint.host.clone(),
                source,
            })?;
        addrs
            .next()
            .ok_or_else(|| ConnectError::NoAddress(endpoint.host.clone()))
    }

    fn open_socket(
        addr: &SocketAddr,
        endpoint: &EndpointConfig,
    ) -> std::result::Result<TcpStream, ConnectError> {
        let sock = match timeout_option(endpoint.send_timeout) {
            Some(limit) => TcpStream::connect_timeout(addr, limit),
            None => TcpStream::connect(addr),
        }
        .map_err(ConnectError::Socket)?;

        // Timeouts must be in place before the handshake starts.
        sock.set_read_timeout(timeout_option(endpoint.recv_timeout))
            .map_err(ConnectError::Socket)?;
        sock.set_write_timeout(timeout_option(endpoint.send_timeout))
            .map_err(ConnectError::Socket)?;
        sock.set_nodelay(true).map_err(ConnectError::Socket)?;
        Ok(sock)
    }
}

impl Connector for TlsConnector {
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Connection>> {
        let addr = Self::resolve(endpoint)?;
        let sock = Self::open_socket(&addr, endpoint)?;

        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|_| ConnectError::InvalidServerName(endpoint.host.clone()))?;
        let conn = ClientConnection::new(Arc::clone(&self.config), server_name)
            .map_err(ConnectError::Tls)?;

        let mut stream = StreamOwned::new(conn, sock);
        while stream.conn.is_handshaking() {
            if let Err(e) = stream.conn.complete_io(&mut stream.sock) {
                // Dropping the stream releases the socket and the session.
                let _ = stream.sock.shutdown(Shutdown::Both);
                return Err(ConnectError::Handshake(e).into());
            }
        }
        // The client's final handshake flight can still be queued here.
        if let Err(e) = stream.flush() {
            let _ = stream.sock.shutdown(Shutdown::Both);
            return Err(ConnectError::Handshake(e).into());
        }

        tracing::debug!(endpoint = %endpoint, addr = %addr, "TLS session established");
        Ok(Box::new(TlsConnection { stream }))
    }
}

/// A TLS session over a TCP socket.
pub struct TlsConnection {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl Connection for TlsConnection {
    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let n = match self.stream.write(buf) {
            Ok(0) if !buf.is_empty() => {
                return Err(TransportError::Send(io::ErrorKind::WriteZero.into()));
            }
            Ok(n) => n,
            Err(e) => return Err(TransportError::Send(e)),
        };
        // `write` only buffers on a socket failure; the flush reports it.
        self.stream.flush().map_err(TransportError::Send)?;
        Ok(n)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Received> {
        if buf.is_empty() {
            return Err(TransportError::Recv(empty_receive_buffer()));
        }
        classify_read(self.stream.read(buf))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let mut stream = self.stream;
        stream.conn.send_close_notify();
        let shutdown = stream.flush();
        let _ = stream.sock.shutdown(Shutdown::Both);
        drop(stream);

        match shutdown {
            Ok(()) => Ok(()),
            // TLS protocol failures surface as InvalidData.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(error = %e, "TLS shutdown failed");
                Err(TransportError::Close(e))
            }
            Err(e) => {
                // An I/O condition here means the peer is already gone.
                tracing::debug!(error = %e, "Peer closed before TLS shutdown completed");
                Ok(())
            }
        }
    }
}

/// Map a raw read result onto the three receive outcomes.
///
/// - a positive count is data;
/// - `Ok(0)` is a clean close from the peer;
/// - `UnexpectedEof` (socket closed without a TLS close) is also a close;
/// - timeouts and interrupts mean "nothing yet";
/// - everything else is an error.
///
/// # Errors
///
/// Returns `TransportError::Recv` for errors that are neither a timeout nor a
/// peer close.
pub fn classify_read(result: io::Result<usize>) -> Result<Received> {
    match result {
        Ok(0) => Ok(Received::Closed),
        Ok(n) => Ok(Received::Data(n)),
        Err(e) => match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                Ok(Received::WouldBlock)
            }
            io::ErrorKind::UnexpectedEof => Ok(Received::Closed),
            _ => Err(TransportError::Recv(e)),
        },
    }
}

/// The error for a receive into an empty buffer, which would read as a close.
pub(crate) fn empty_receive_buffer() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "receive buffer is empty")
}

fn timeout_option(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::{ServerConfig, ServerConnection};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};

    type ServerStream = StreamOwned<ServerConnection, TcpStream>;

    /// A self-signed certificate for 127.0.0.1 and configs on both ends.
    fn loopback_tls() -> (Arc<ServerConfig>, TlsConnector) {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let mut server = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .unwrap();
        // Keep the server silent after the handshake.
        server.send_tls13_tickets = 0;

        let mut roots = RootCertStore::empty();
        roots.add(cert.der().clone()).unwrap();
        let client = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();

        (Arc::new(server), TlsConnector::new(Arc::new(client)))
    }

    /// Accept one connection, complete the handshake, then hand the session to `then`.
    fn serve_one<T: Send + 'static>(
        config: Arc<ServerConfig>,
        then: impl FnOnce(ServerStream) -> T + Send + 'static,
    ) -> (u16, JoinHandle<T>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut stream = StreamOwned::new(ServerConnection::new(config).unwrap(), sock);
            while stream.conn.is_handshaking() {
                stream.conn.complete_io(&mut stream.sock).unwrap();
            }
            then(stream)
        });
        (port, server)
    }

    fn loopback(port: u16, recv_timeout: Duration) -> EndpointConfig {
        EndpointConfig::new("127.0.0.1", port).with_timeouts(recv_timeout, Duration::from_secs(2))
    }

    #[test]
    fn data_is_data() {
        assert_eq!(classify_read(Ok(12)).unwrap(), Received::Data(12));
    }

    #[test]
    fn zero_length_read_is_closed_not_error() {
        assert_eq!(classify_read(Ok(0)).unwrap(), Received::Closed);
    }

    #[test]
    fn eof_without_close_notify_is_closed() {
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed connection");
        assert_eq!(classify_read(Err(err)).unwrap(), Received::Closed);
    }

    #[test]
    fn timeouts_would_block() {
        for kind in [
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
            io::ErrorKind::Interrupted,
        ] {
            assert_eq!(
                classify_read(Err(kind.into())).unwrap(),
                Received::WouldBlock,
                "{kind:?}"
            );
        }
    }

    #[test]
    fn other_errors_are_recv_errors() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::InvalidData,
            io::ErrorKind::BrokenPipe,
        ] {
            assert!(matches!(
                classify_read(Err(kind.into())),
                Err(TransportError::Recv(_))
            ));
        }
    }

    #[test]
    fn zero_timeout_disables_limit() {
        assert_eq!(timeout_option(Duration::ZERO), None);
        assert_eq!(
            timeout_option(Duration::from_secs(2)),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn builds_with_webpki_roots() {
        assert!(TlsConnector::with_webpki_roots().is_ok());
    }

    #[test]
    fn unresolvable_host_fails_to_connect() {
        let connector = TlsConnector::with_webpki_roots().unwrap();
        let endpoint = EndpointConfig::new("host.invalid", 443)
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(
            connector.connect(&endpoint),
            Err(TransportError::Connect(
                ConnectError::Resolve { .. } | ConnectError::NoAddress(_)
            ))
        ));
    }

    #[test]
    fn refused_connection_is_socket_error() {
        // Bind then drop to get a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let connector = TlsConnector::with_webpki_roots().unwrap();
        let endpoint = EndpointConfig::new("127.0.0.1", port)
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(
            connector.connect(&endpoint),
            Err(TransportError::Connect(ConnectError::Socket(_)))
        ));
    }

    #[test]
    fn peer_dropping_during_handshake_is_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            drop(sock);
        });

        let connector = TlsConnector::with_webpki_roots().unwrap();
        let endpoint = EndpointConfig::new("127.0.0.1", port)
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
        assert!(matches!(
            connector.connect(&endpoint),
            Err(TransportError::Connect(ConnectError::Handshake(_)))
        ));
        server.join().unwrap();
    }

    #[test]
    fn silent_peer_times_out_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (_sock, _) = listener.accept().unwrap();
            let _ = done_rx.recv_timeout(Duration::from_secs(5));
        });

        let connector = TlsConnector::with_webpki_roots().unwrap();
        let endpoint = EndpointConfig::new("127.0.0.1", port)
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
        let result = connector.connect(&endpoint);
        done_tx.send(()).unwrap();
        server.join().unwrap();

        assert!(matches!(
            result,
            Err(TransportError::Connect(ConnectError::Handshake(_)))
        ));
    }

    #[test]
    fn session_carries_data_both_ways() {
        let (server_config, connector) = loopback_tls();
        let (port, server) = serve_one(server_config, |mut stream| {
            let mut line = [0u8; 5];
            stream.read_exact(&mut line).unwrap();
            stream.write_all(b"pong\n").unwrap();
            stream.flush().unwrap();
            line
        });

        let mut conn = connector.connect(&loopback(port, Duration::from_secs(2))).unwrap();
        conn.send_all(b"ping\n").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(conn.receive(&mut buf).unwrap(), Received::Data(5));
        assert_eq!(&buf[..5], b"pong\n");
        assert_eq!(&server.join().unwrap(), b"ping\n");
        conn.close().unwrap();
    }

    #[test]
    fn send_to_vanished_peer_fails() {
        let (server_config, connector) = loopback_tls();
        let (port, server) = serve_one(server_config, drop);

        let mut conn = connector.connect(&loopback(port, Duration::from_secs(2))).unwrap();
        server.join().unwrap();

        // A report cycle: the body, then the terminating newline.
        let body = conn.send_all(br#"{"AirConditionerAlias":{}}"#);
        thread::sleep(Duration::from_millis(100));
        let newline = conn.send_all(b"\n");

        assert!(
            matches!(body, Err(TransportError::Send(_)))
                || matches!(newline, Err(TransportError::Send(_))),
            "body {body:?}, newline {newline:?}"
        );
    }

    #[test]
    fn receive_times_out_as_would_block() {
        let (server_config, connector) = loopback_tls();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let (port, server) = serve_one(server_config, move |_stream| {
            let _ = done_rx.recv_timeout(Duration::from_secs(5));
        });

        let mut conn = connector.connect(&loopback(port, Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(conn.receive(&mut buf).unwrap(), Received::WouldBlock);
        assert!(matches!(
            conn.receive(&mut []),
            Err(TransportError::Recv(e)) if e.kind() == io::ErrorKind::InvalidInput
        ));

        done_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn close_notify_from_peer_is_closed() {
        let (server_config, connector) = loopback_tls();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let (port, server) = serve_one(server_config, move |mut stream| {
            stream.conn.send_close_notify();
            stream.flush().unwrap();
            let _ = done_rx.recv_timeout(Duration::from_secs(5));
        });

        let mut conn = connector.connect(&loopback(port, Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(conn.receive(&mut buf).unwrap(), Received::Closed);
        conn.close().unwrap();

        done_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn clean_close_sends_close_notify() {
        let (server_config, connector) = loopback_tls();
        let (port, server) = serve_one(server_config, |mut stream| {
            let mut buf = [0u8; 16];
            stream.read(&mut buf).map_err(|e| e.kind())
        });

        let conn = connector.connect(&loopback(port, Duration::from_secs(2))).unwrap();
        conn.close().unwrap();
        // The server sees an orderly end of stream, not a truncation.
        assert_eq!(server.join().unwrap(), Ok(0));
    }

    #[test]
    fn close_after_peer_vanished_is_graceful() {
        let (server_config, connector) = loopback_tls();
        let (port, server) = serve_one(server_config, drop);

        let conn = connector.connect(&loopback(port, Duration::from_secs(2))).unwrap();
        server.join().unwrap();
        thread::sleep(Duration::from_millis(50));

        conn.close().unwrap();
    }
}
