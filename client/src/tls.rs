use std::fmt::{self, Debug, Formatter};
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use minnow_http::{Error, Result, TlsVerify};
use parking_lot::Mutex;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConnection, DigitallySignedStruct, SignatureScheme};

pub(crate) type VerifyOutcome = Arc<Mutex<Option<rustls::Error>>>;

/**
A TLS 1.2+ client stream over a [`TcpStream`].

The rustls record machine is pumped manually so that `WouldBlock` from the
underlying socket propagates cleanly to the polled engine: `read` decrypts
whatever plaintext is available, feeding ciphertext into the session as
needed, and `write` hands plaintext to the session and flushes records
best-effort, reporting the number of plaintext bytes accepted.

Certificate verification is advisory: the handshake proceeds even when the
peer's certificate does not verify, and the recorded outcome is reported
through [`verify`](TlsStream::verify).
*/
pub struct TlsStream {
    tcp: TcpStream,
    session: ClientConnection,
    verify_outcome: VerifyOutcome,
    skip_verify: bool,
}

impl Debug for TlsStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsStream")
            .field("tcp", &self.tcp)
            .field("session", &"..")
            .finish()
    }
}

impl TlsStream {
    pub(crate) fn new(
        tcp: TcpStream,
        session: ClientConnection,
        verify_outcome: VerifyOutcome,
        skip_verify: bool,
    ) -> Self {
        Self {
            tcp,
            session,
            verify_outcome,
            skip_verify,
        }
    }

    /// Drives the handshake to completion. The socket is still in blocking
    /// mode at this point, so a transient `WouldBlock` only means a
    /// renegotiation boundary and is retried.
    pub(crate) fn handshake(&mut self) -> Result<()> {
        while self.session.is_handshaking() {
            match self.session.complete_io(&mut self.tcp) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::TlsHandshake(e.to_string())),
            }
        }
        log::debug!(
            "tls handshake complete, protocol {:?}",
            self.session.protocol_version()
        );
        Ok(())
    }

    /// The underlying socket.
    pub fn tcp(&self) -> &TcpStream {
        &self.tcp
    }

    /// The recorded certificate verification outcome, as flags.
    pub fn verify(&self) -> TlsVerify {
        if self.skip_verify {
            return TlsVerify::SKIP_VERIFY;
        }
        match self.verify_outcome.lock().as_ref() {
            None => TlsVerify::OK,
            Some(error) => verify_flags(error),
        }
    }

    /// A human-readable description of the verification failure, if any.
    pub fn verify_message(&self) -> Option<String> {
        if self.skip_verify {
            return Some("certificate verification skipped by configuration".into());
        }
        self.verify_outcome.lock().as_ref().map(ToString::to_string)
    }

    /// Writes any pending TLS records (handshake messages, alerts,
    /// application data) out to the socket.
    fn flush_records(&mut self) -> io::Result<()> {
        while self.session.wants_write() {
            match self.session.write_tls(&mut self.tcp) {
                Ok(_) => {}
                // record stays queued; it goes out with a later write
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.session.reader().read(buf) {
                // Ok(0) is a clean close_notify from the peer
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            // no plaintext buffered; pull more ciphertext off the socket
            match self.session.read_tls(&mut self.tcp)? {
                0 => return Ok(0),
                _ => {
                    if let Err(e) = self.session.process_new_packets() {
                        // push out any alert before surfacing the error
                        let _ = self.flush_records();
                        return Err(io::Error::new(ErrorKind::InvalidData, e));
                    }
                    self.flush_records()?;
                }
            }
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.session.writer().write(buf)?;
        self.flush_records()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_records()?;
        self.tcp.flush()
    }
}

/// Maps a rustls verification error onto the advisory flag set.
fn verify_flags(error: &rustls::Error) -> TlsVerify {
    match error {
        rustls::Error::InvalidCertificate(cert_error) => match cert_error {
            CertificateError::Expired => TlsVerify::EXPIRED,
            CertificateError::NotValidYet => TlsVerify::FUTURE,
            CertificateError::Revoked => TlsVerify::REVOKED,
            CertificateError::UnknownIssuer => TlsVerify::NOT_TRUSTED | TlsVerify::FAIL,
            CertificateError::NotValidForName => TlsVerify::HOST_MISMATCH,
            CertificateError::BadEncoding => TlsVerify::MISSING | TlsVerify::FAIL,
            _ => TlsVerify::FAIL,
        },
        _ => TlsVerify::FAIL,
    }
}

/// A certificate verifier that records failures instead of aborting the
/// handshake, reproducing "optional" verification: the connection is
/// established either way and the outcome is reported separately.
#[derive(Debug)]
pub(crate) struct CapturingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    outcome: VerifyOutcome,
    skip_verify: bool,
}

impl CapturingVerifier {
    pub(crate) fn new(
        inner: Arc<WebPkiServerVerifier>,
        outcome: VerifyOutcome,
        skip_verify: bool,
    ) -> Self {
        Self {
            inner,
            outcome,
            skip_verify,
        }
    }
}

impl ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.skip_verify {
            return Ok(ServerCertVerified::assertion());
        }
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(error) => {
                log::warn!("certificate verification failed, continuing anyway: {error}");
                *self.outcome.lock() = Some(error);
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_owned())
        .map_err(|_| Error::TlsHandshake(format!("{host} is not a valid server name")))
}

#[cfg(test)]
mod tests {
    use super::verify_flags;
    use minnow_http::TlsVerify;
    use rustls::CertificateError;

    #[test]
    fn certificate_errors_map_to_flags() {
        let expired = verify_flags(&rustls::Error::InvalidCertificate(CertificateError::Expired));
        assert_eq!(expired, TlsVerify::EXPIRED);

        let untrusted = verify_flags(&rustls::Error::InvalidCertificate(
            CertificateError::UnknownIssuer,
        ));
        assert!(untrusted.contains(TlsVerify::NOT_TRUSTED));
        assert!(untrusted.contains(TlsVerify::FAIL));

        let other = verify_flags(&rustls::Error::General("boom".into()));
        assert_eq!(other, TlsVerify::FAIL);
    }
}
