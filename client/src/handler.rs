use minnow_http::Request;

/**
Event hooks for an [`HttpConn`](crate::HttpConn).

The engine owns its handler by value and invokes these callbacks as the
connection and its requests make progress. Every method has a default
no-op implementation, so a handler implements only what it cares about.

Body bytes passed to [`on_recv`](Handler::on_recv) are only valid for the
duration of the call; a handler that needs them later must copy them out
before returning.
*/
#[allow(unused_variables)]
pub trait Handler {
    /// The transport connected (and, for https, the TLS handshake
    /// completed).
    fn on_open(&mut self) {}

    /// The transport was closed. Not invoked for a connection that closes
    /// as part of following a redirect, unless always-handle is set.
    fn on_close(&mut self) {}

    /// Response body bytes, in wire order, already stripped of all header
    /// and chunk framing. Suppressed for non-success responses unless
    /// always-handle is set.
    fn on_recv(&mut self, request: &Request, body: &[u8]) {}

    /// The request reached a terminal state. `status` is `None` if the
    /// request failed before a response head was parsed. Fires exactly once
    /// per request, except for requests superseded by a followed redirect.
    fn on_request_done(&mut self, request: &Request, status: Option<u16>) {}

    /// Called at the top of every [`update`](crate::HttpConn::update) tick,
    /// before the socket is read. Returning `false` skips the tick.
    fn on_update(&mut self) -> bool {
        true
    }
}

/// The unit handler discards every event; useful when only the one-shot
/// result matters.
impl Handler for () {}
