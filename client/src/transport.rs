use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use minnow_http::{Error, Request, Result, TlsVerify, Transport};
use parking_lot::Mutex;
use rustls::client::WebPkiServerVerifier;
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::tls::{server_name, CapturingVerifier, TlsStream, VerifyOutcome};

/**
The default transport: a tcp socket, optionally wrapped in TLS.

Both variants expose the same read/write surface; the engine never needs to
know which one it is driving.
*/
#[derive(Debug)]
pub enum ClientTransport {
    /// A plaintext tcp connection.
    Tcp(TcpStream),

    /// A TLS session over tcp.
    Tls(Box<TlsStream>),
}

impl ClientTransport {
    /// A human-readable description of the TLS verification failure, if
    /// there is one to describe.
    pub fn verify_message(&self) -> Option<String> {
        match self {
            Self::Tcp(_) => None,
            Self::Tls(tls) => tls.verify_message(),
        }
    }
}

impl Read for ClientTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(tcp) => tcp.read(buf),
            Self::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for ClientTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(tcp) => tcp.write(buf),
            Self::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(tcp) => tcp.flush(),
            Self::Tls(tls) => tls.flush(),
        }
    }
}

impl Transport for ClientTransport {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        match self {
            Self::Tcp(tcp) => tcp.set_nonblocking(nonblocking),
            Self::Tls(tls) => tls.tcp().set_nonblocking(nonblocking),
        }
    }

    fn peer_addr(&self) -> io::Result<Option<SocketAddr>> {
        let addr = match self {
            Self::Tcp(tcp) => tcp.peer_addr()?,
            Self::Tls(tls) => tls.tcp().peer_addr()?,
        };
        Ok(Some(addr))
    }

    fn verify_tls(&self) -> TlsVerify {
        match self {
            Self::Tcp(_) => TlsVerify::NO_TLS,
            Self::Tls(tls) => tls.verify(),
        }
    }
}

/**
Establishes transports for an [`HttpConn`](crate::HttpConn).

The engine calls [`connect`](Connector::connect) whenever it needs a fresh
connection to a request's endpoint; the connector resolves, connects, and
(for https) completes the TLS handshake before returning. Implementing
this trait is also how tests substitute a scripted in-memory transport.
*/
pub trait Connector {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Resolves and connects to the request's endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`] when the host cannot be resolved,
    /// [`Error::TlsHandshake`] when the TLS handshake cannot be completed,
    /// and [`Error::Io`] for plain connection failures. None of these are
    /// retried.
    fn connect(&mut self, request: &Request) -> Result<Self::Transport>;
}

/**
The default [`Connector`]: blocking tcp connect plus an optional rustls
handshake.

Trust roots come from the platform certificate store, falling back to the
bundled webpki roots when the platform store is unavailable. Certificate
verification is advisory: a failed verification is recorded and reported
through [`Transport::verify_tls`] rather than aborting the handshake.
*/
#[derive(Debug, Clone)]
pub struct RustlsConnector {
    roots: Arc<RootCertStore>,
    skip_verify: bool,
}

impl Default for RustlsConnector {
    fn default() -> Self {
        Self {
            roots: Arc::new(default_root_store()),
            skip_verify: false,
        }
    }
}

impl RustlsConnector {
    /// Builds a connector trusting the default roots plus every
    /// certificate in the given PEM blob.
    pub fn with_added_pem(pem: &[u8]) -> Result<Self> {
        let mut roots = default_root_store();
        let mut added = 0usize;
        for cert in rustls_pemfile::certs(&mut &*pem) {
            match roots.add(cert?) {
                Ok(()) => added += 1,
                Err(e) => log::warn!("skipping unusable certificate in pem blob: {e}"),
            }
        }
        log::debug!("added {added} certificates from pem blob");
        Ok(Self {
            roots: Arc::new(roots),
            skip_verify: false,
        })
    }

    /// Builds a connector that skips certificate verification entirely.
    /// Connections report [`TlsVerify::SKIP_VERIFY`].
    pub fn without_verification() -> Self {
        Self {
            skip_verify: true,
            ..Self::default()
        }
    }
}

impl Connector for RustlsConnector {
    type Transport = ClientTransport;

    fn connect(&mut self, request: &Request) -> Result<Self::Transport> {
        let addrs = request
            .url()
            .socket_addrs(|| None)
            .map_err(|e| Error::Resolve(format!("{}: {e}", request.host())))?;
        let tcp = connect_any(request, &addrs)?;

        if !request.is_tls() {
            return Ok(ClientTransport::Tcp(tcp));
        }

        let verifier = WebPkiServerVerifier::builder(Arc::clone(&self.roots))
            .build()
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;
        let outcome: VerifyOutcome = Arc::new(Mutex::new(None));
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CapturingVerifier::new(
                verifier,
                Arc::clone(&outcome),
                self.skip_verify,
            )))
            .with_no_client_auth();
        let session = ClientConnection::new(Arc::new(config), server_name(request.host())?)
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;

        let mut stream = TlsStream::new(tcp, session, outcome, self.skip_verify);
        stream.handshake()?;
        Ok(ClientTransport::Tls(Box::new(stream)))
    }
}

fn connect_any(request: &Request, addrs: &[SocketAddr]) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                log::debug!("connected to {addr}");
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("connecting to {addr} failed: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(match last_error {
        Some(e) => Error::Io(e),
        None => Error::Resolve(request.host().to_string()),
    })
}

/// Platform trust roots, falling back to the bundled webpki roots when the
/// platform store cannot be used.
fn default_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let mut failed = 0usize;
            for cert in certs {
                if roots.add(cert).is_err() {
                    failed += 1;
                }
            }
            if failed > 0 {
                log::warn!("{failed} native certificates could not be added to the root store");
            }
            if roots.is_empty() {
                log::warn!("no usable native certificates, falling back to webpki roots");
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }
        Err(e) => {
            log::warn!("could not load native certificates, falling back to webpki roots: {e}");
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    roots
}
