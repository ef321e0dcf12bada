#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications
)]
#![warn(missing_docs)]
/*!
Wire-level HTTP/1.1 machinery for the minnow client.

This crate holds everything about the protocol that does not touch a
socket: request serialization, response head parsing, the receive buffer,
header storage, form encoding, and the [`Transport`](transport::Transport)
trait over which the actual bytes travel. The polled client engine lives in
the `minnow-client` crate.
*/

mod error;
pub use error::{Error, Result};

mod buffer;
pub use buffer::RecvBuffer;

mod headers;
pub use headers::Headers;

mod method;
pub use method::Method;

mod form;
pub use form::{form_decode, form_encode_into, Form};

mod request;
pub use request::{Request, RequestConfig};

mod head;
pub use head::{find_head_end, parse_head, ResponseHead};

/// Types to represent the bidirectional data stream over which the
/// HTTP protocol is communicated
pub mod transport;
pub use transport::{TlsVerify, Transport};

pub use url::Url;
