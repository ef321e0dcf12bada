use std::fmt::{self, Debug, Formatter};
use std::io::{Read, Result, Write};
use std::net::SocketAddr;
use std::ops::{BitOr, BitOrAssign};

/**
# The interface that the http protocol is communicated over.

A transport is a bidirectional byte stream to a single peer, usually a tcp
socket with or without TLS wrapped around it. The engine drives it through
the blanket [`Read`] and [`Write`] implementations with readiness-style
error reporting:

- `read` returning `Ok(0)` means the peer closed the connection
- `ErrorKind::WouldBlock` from either direction means "nothing to do right
  now, retry on a later tick"
- `write` may accept fewer bytes than offered; the caller loops

Closing is dropping: a transport releases its socket and any TLS state when
it goes out of scope.
*/
pub trait Transport: Read + Write + Debug {
    /// Switches the transport between blocking and non-blocking modes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket rejects the mode change.
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()>;

    /// # Returns the socket address of the remote peer of this transport.
    ///
    /// Optional to implement.
    ///
    /// # Errors
    ///
    /// Return an error if this transport supports retrieving the remote
    /// peer but attempting to do so is unsuccessful.
    fn peer_addr(&self) -> Result<Option<SocketAddr>> {
        Ok(None)
    }

    /// The outcome of certificate verification for this transport.
    ///
    /// Returns [`TlsVerify::NO_TLS`] when the stream is not wrapped in TLS.
    /// A non-empty flag set does not by itself mean the connection was
    /// aborted; verification is advisory.
    fn verify_tls(&self) -> TlsVerify {
        TlsVerify::NO_TLS
    }
}

/**
The outcome of TLS certificate verification, as a set of flags.

[`OK`](TlsVerify::OK) is the empty set: a certificate that verified
cleanly. [`NO_TLS`](TlsVerify::NO_TLS) reports that no TLS is in use at
all. Everything else describes what went wrong; several flags may be set at
once.
*/
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct TlsVerify(u16);

impl TlsVerify {
    /// Verification succeeded.
    pub const OK: Self = Self(0);
    /// The certificate validity period ended in the past.
    pub const EXPIRED: Self = Self(1);
    /// The certificate has been revoked.
    pub const REVOKED: Self = Self(1 << 1);
    /// The certificate is not valid for the requested host name.
    pub const HOST_MISMATCH: Self = Self(1 << 2);
    /// The certificate does not chain to a trusted root.
    pub const NOT_TRUSTED: Self = Self(1 << 3);
    /// The peer presented no usable certificate.
    pub const MISSING: Self = Self(1 << 4);
    /// Verification was skipped by configuration.
    pub const SKIP_VERIFY: Self = Self(1 << 5);
    /// The certificate validity period starts in the future.
    pub const FUTURE: Self = Self(1 << 6);
    /// Verification failed in a way the other flags do not describe, or
    /// badly enough that the certificate should not be relied on.
    pub const FAIL: Self = Self(1 << 7);
    /// The connection is not using TLS at all.
    pub const NO_TLS: Self = Self(1 << 8);

    /// Returns true if every flag in `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if verification succeeded over a TLS connection.
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl BitOr for TlsVerify {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TlsVerify {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Debug for TlsVerify {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("TlsVerify(OK)");
        }
        const NAMES: [(TlsVerify, &str); 9] = [
            (TlsVerify::EXPIRED, "EXPIRED"),
            (TlsVerify::REVOKED, "REVOKED"),
            (TlsVerify::HOST_MISMATCH, "HOST_MISMATCH"),
            (TlsVerify::NOT_TRUSTED, "NOT_TRUSTED"),
            (TlsVerify::MISSING, "MISSING"),
            (TlsVerify::SKIP_VERIFY, "SKIP_VERIFY"),
            (TlsVerify::FUTURE, "FUTURE"),
            (TlsVerify::FAIL, "FAIL"),
            (TlsVerify::NO_TLS, "NO_TLS"),
        ];
        write!(f, "TlsVerify(")?;
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::TlsVerify;

    #[test]
    fn flag_algebra() {
        let flags = TlsVerify::EXPIRED | TlsVerify::NOT_TRUSTED;
        assert!(flags.contains(TlsVerify::EXPIRED));
        assert!(flags.contains(TlsVerify::NOT_TRUSTED));
        assert!(!flags.contains(TlsVerify::REVOKED));
        assert!(!flags.is_ok());
        assert!(TlsVerify::OK.is_ok());
        assert_eq!(
            format!("{flags:?}"),
            "TlsVerify(EXPIRED | NOT_TRUSTED)"
        );
    }
}
