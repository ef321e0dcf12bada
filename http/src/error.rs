use std::borrow::Cow;

use thiserror::Error;

/// Concrete errors that occur within minnow's http implementation
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// [`url::ParseError`]
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// [`httparse::Error`]
    #[error(transparent)]
    Httparse(#[from] httparse::Error),

    /// this url does not use the http or https scheme
    #[error("unexpected uri format")]
    UnexpectedUriFormat,

    /// this url does not name a host to connect to
    #[error("url is missing a host")]
    MissingHost,

    /// the peer closed the connection
    #[error("connection closed by peer")]
    Closed,

    /// the byte stream did not start with an http status line
    #[error("response is not http")]
    NotHttp,

    /// an incomplete http head
    #[error("partial http head")]
    PartialHead,

    /// we were unable to parse a header
    #[error("malformed http header {0}")]
    MalformedHeader(Cow<'static, str>),

    /// we were unable to parse this http method
    #[error("unsupported http method {0}")]
    UnrecognizedMethod(String),

    /// the response head exceeded the allowed length
    #[error("headers were malformed or longer than allowed")]
    HeadersTooLong,

    /// a chunk-size line could not be parsed
    #[error("invalid chunk framing")]
    InvalidChunkFraming,

    /// the host name could not be resolved
    #[error("could not resolve {0}")]
    Resolve(String),

    /// the tls handshake could not be completed
    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),
}

/// this crate's result type
pub type Result<T> = std::result::Result<T, Error>;
