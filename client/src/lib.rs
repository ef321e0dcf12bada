#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    nonstandard_style,
    unused_qualifications
)]
#![warn(missing_docs)]
/*!
A minimal polled HTTP/1.1 client with optional TLS.

Two ways in:

- [`download`] is the one-shot convenience: give it a url, get the response
  body back as a buffer.
- [`HttpConn`] is the event-driven socket object underneath: it pipelines
  requests over a kept-alive connection, follows redirects, decodes chunked
  transfer encoding, and makes progress one [`update`](HttpConn::update)
  tick at a time, so any number of connections can be driven from a single
  thread; see [`SocketSet`].

Progress happens exclusively inside `update()`; there is no internal
thread and no async runtime. Body bytes are delivered to a [`Handler`]
supplied by the caller.

```no_run
if let Some(body) = minnow_client::download("http://example.com/") {
    println!("{}", String::from_utf8_lossy(&body));
}
```
*/

pub use minnow_http::{
    form_decode, form_encode_into, Error, Form, Headers, Method, RecvBuffer, Request,
    RequestConfig, Result, TlsVerify, Transport, Url,
};

mod handler;
pub use handler::Handler;

mod conn;
pub use conn::HttpConn;

mod tls;
pub use tls::TlsStream;

mod transport;
pub use transport::{ClientTransport, Connector, RustlsConnector};

mod socket_set;
pub use socket_set::{Pollable, SocketSet};

mod download;
pub use download::{download, download_with, download_with_connector};
