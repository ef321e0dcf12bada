use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::io::{ErrorKind, Read, Write};

use minnow_http::{
    find_head_end, parse_head, Error, Headers, RecvBuffer, Request, RequestConfig, Result,
};
use url::Url;

use crate::{Connector, Handler, Pollable, RustlsConnector, Transport};

/// Response heads larger than this abort the connection.
const MAX_HEAD_LEN: usize = 16 * 1024;

/**
An event-driven http/1.1 client connection.

An `HttpConn` owns one transport at a time and pipelines any number of
requests over it, strictly serially: a request is sent, its response fully
received, and only then is the next queued request sent, reusing the
connection when keep-alive allows and reopening it when it does not.

Progress happens exclusively inside [`update`](HttpConn::update), which
performs at most one transport read and then drives the protocol state
machine as far as the buffered bytes allow. Response body bytes (and only
body bytes) are handed to the [`Handler`] as they are decoded.

```no_run
use minnow_client::{Handler, HttpConn, Request};

#[derive(Default)]
struct Collect(Vec<u8>);

impl Handler for Collect {
    fn on_recv(&mut self, _request: &Request, body: &[u8]) {
        self.0.extend_from_slice(body);
    }
}

let mut conn = HttpConn::new(Collect::default());
conn.set_user_agent("example/1.0");
conn.get("http://example.com/").unwrap();
while conn.is_open() || conn.has_pending_work() {
    conn.update();
}
println!("{} bytes", conn.handler().0.len());
```
*/
pub struct HttpConn<H, C: Connector = RustlsConnector> {
    handler: H,
    connector: C,
    transport: Option<C::Transport>,
    endpoint: Option<(String, u16, bool)>,
    buffer: RecvBuffer,
    head_buf: Vec<u8>,

    queue: VecDeque<Request>,
    current: Option<Request>,

    headers: Headers,
    status: Option<u16>,
    content_length: u64,
    remaining: u64,
    chunked: bool,
    final_chunk: bool,
    must_close: bool,
    in_progress: bool,
    redirecting: bool,

    config: RequestConfig,
    follow_redirects: bool,
    always_handle: bool,
    nonblocking: bool,
}

enum Step {
    /// a protocol element completed; keep driving the state machine
    Continue,
    /// the buffer ran dry mid-element; yield until the next read
    NeedMore,
    /// the request was aborted and the connection closed
    Halt,
}

impl<H: Handler> HttpConn<H> {
    /// Builds a connection over the default tcp + rustls transport.
    pub fn new(handler: H) -> Self {
        Self::with_connector(RustlsConnector::default(), handler)
    }
}

impl<H, C: Connector> Debug for HttpConn<H, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConn")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status)
            .field("in_progress", &self.in_progress)
            .field("chunked", &self.chunked)
            .field("remaining", &self.remaining)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl<H: Handler, C: Connector> HttpConn<H, C> {
    /// Builds a connection with a caller-supplied [`Connector`].
    pub fn with_connector(connector: C, handler: H) -> Self {
        Self {
            handler,
            connector,
            transport: None,
            endpoint: None,
            buffer: RecvBuffer::default(),
            head_buf: Vec::new(),
            queue: VecDeque::new(),
            current: None,
            headers: Headers::new(),
            status: None,
            content_length: 0,
            remaining: 0,
            chunked: false,
            final_chunk: false,
            must_close: true,
            in_progress: false,
            redirecting: false,
            config: RequestConfig::default(),
            follow_redirects: true,
            always_handle: false,
            nonblocking: false,
        }
    }

    // ── configuration ───────────────────────────────────────────────────

    /// Advertise `Connection: Keep-Alive` with the given timeout on every
    /// request. Zero (the default) advertises `Connection: close`.
    pub fn set_keep_alive(&mut self, secs: u32) {
        self.config.keep_alive = secs;
    }

    /// The `User-Agent` to send; empty (the default) sends none.
    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.config.user_agent = user_agent.into();
    }

    /// The `Accept-Encoding` to advertise; empty (the default) sends none.
    /// Response bodies are never decoded regardless.
    pub fn set_accept_encoding(&mut self, accept_encoding: impl Into<String>) {
        self.config.accept_encoding = accept_encoding.into();
    }

    /// Whether 3xx responses with a `Location` are followed automatically.
    /// Defaults to true.
    pub fn set_follow_redirects(&mut self, follow: bool) {
        self.follow_redirects = follow;
    }

    /// When set, body bytes and completion events are delivered for
    /// non-success responses and for responses superseded by a redirect.
    /// Defaults to false.
    pub fn set_always_handle(&mut self, always: bool) {
        self.always_handle = always;
    }

    /// Resizes the receive buffer. Clamped to a 512-byte minimum; only safe
    /// to call between requests.
    pub fn set_recv_buffer_size(&mut self, bytes: usize) {
        self.buffer.set_capacity(bytes);
    }

    /// Switches the transport between blocking and non-blocking reads. The
    /// mode is remembered and applied to future connections as well.
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.set_nonblocking(nonblocking) {
                log::warn!("failed to change blocking mode: {e}");
            }
        }
    }

    // ── submission ──────────────────────────────────────────────────────

    /// Parses `url` and submits a GET request for it.
    pub fn get(&mut self, url: &str) -> Result<()> {
        self.send(Request::parse(url)?)
    }

    /// Parses `url` and submits a POST request with the given form body.
    pub fn post(&mut self, url: &str, form: minnow_http::Form) -> Result<()> {
        self.send(Request::parse(url)?.with_form(form))
    }

    /// Submits a request: sent immediately if the connection is idle,
    /// queued behind the in-flight transfer otherwise.
    pub fn send(&mut self, request: Request) -> Result<()> {
        self.submit(request, false)
    }

    /// Submits a request at the back of the queue without attempting an
    /// immediate send.
    pub fn enqueue(&mut self, request: Request) -> Result<()> {
        self.submit(request, true)
    }

    fn submit(&mut self, mut request: Request, force_queue: bool) -> Result<()> {
        request.seal_head(&self.config)?;
        if self.in_progress || force_queue {
            log::debug!(
                "transfer pending; queueing request ({} now waiting)",
                self.queue.len() + 1
            );
            self.queue.push_back(request);
            Ok(())
        } else {
            let result = self.open_and_send(request);
            if result.is_err() {
                // the submitter learns about the failure from the return
                // value; no completion event is owed for this request
                self.current = None;
            }
            result
        }
    }

    // ── inspection ──────────────────────────────────────────────────────

    /// Whether a transport is currently open.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether a request is in flight or waiting in the queue.
    pub fn has_pending_work(&self) -> bool {
        self.in_progress || !self.queue.is_empty()
    }

    /// The host of the currently open connection, if any.
    pub fn host(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|(host, _, _)| host.as_str())
    }

    /// Whether the current response body is not yet fully received.
    pub fn expects_more_data(&self) -> bool {
        self.remaining > 0 || self.chunked
    }

    /// The status code of the current response, once its head has been
    /// parsed. `None` before that, and after a failure that precedes the
    /// head.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the current status code is on the success path (200–205).
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=205))
    }

    /// The `Content-Length` reported by the current response, zero if none.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Bytes still expected for the current body; within a chunked body
    /// this covers the rest of the current chunk and its trailing CRLF.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Whether the current response uses chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// The request currently in flight, if any.
    pub fn current_request(&self) -> Option<&Request> {
        self.current.as_ref().filter(|_| self.in_progress)
    }

    /// The current response's headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Case-insensitive lookup in the current response's headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The certificate verification outcome of the open transport.
    pub fn verify_tls(&self) -> minnow_http::TlsVerify {
        self.transport
            .as_ref()
            .map_or(minnow_http::TlsVerify::NO_TLS, Transport::verify_tls)
    }

    /// Borrows the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrows the handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consumes the connection, returning the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    // ── driving ─────────────────────────────────────────────────────────

    /// Makes one tick of progress: at most one transport read, then as much
    /// protocol work as the buffered bytes allow. Returns `true` if
    /// anything interesting happened (bytes arrived, a request completed,
    /// the connection closed) and `false` if the tick was uneventful.
    pub fn update(&mut self) -> bool {
        if !self.handler.on_update() {
            return false;
        }

        // a completed transfer may still need finalizing, and an idle
        // connection may have queued work to start
        if self.in_progress && self.status.is_some() && !self.chunked && self.remaining == 0 {
            self.finish_request();
        }
        if !self.in_progress && !self.queue.is_empty() {
            self.dequeue_next();
        }

        self.buffer.make_room();
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.read(self.buffer.space()) {
            Ok(0) => {
                log::debug!("connection closed by peer");
                let body_complete =
                    self.status.is_some() && !self.chunked && self.remaining == 0;
                self.close_transport();
                if self.in_progress {
                    if !body_complete {
                        log::debug!("request failed: eof before the body completed");
                    }
                    self.finish_request();
                }
                true
            }
            Ok(n) => {
                self.buffer.commit(n);
                self.process();
                true
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => false,
            Err(e) => {
                match e.kind() {
                    ErrorKind::ConnectionReset
                    | ErrorKind::NotConnected
                    | ErrorKind::TimedOut
                    | ErrorKind::ConnectionAborted => log::debug!("connection error: {e}"),
                    _ => log::error!("socket error during update: {e}"),
                }
                self.close_transport();
                self.finish_request();
                true
            }
        }
    }

    /// Closes the connection, finalizing (and thereby cancelling) any
    /// in-flight request.
    pub fn close(&mut self) {
        self.close_transport();
        self.finish_request();
    }

    // ── the state machine ───────────────────────────────────────────────

    fn process(&mut self) {
        loop {
            if !self.in_progress {
                if !self.buffer.is_empty() {
                    log::warn!(
                        "dropping {} bytes received outside of a request",
                        self.buffer.len()
                    );
                    self.buffer.clear();
                }
                return;
            }

            if self.status.is_none() {
                match self.read_head() {
                    Step::Continue => continue,
                    Step::NeedMore | Step::Halt => return,
                }
            }

            if self.chunked {
                match self.process_chunks() {
                    Step::Continue => continue,
                    Step::NeedMore | Step::Halt => return,
                }
            }

            // identity transfer
            if self.remaining > 0 {
                if self.buffer.is_empty() {
                    return;
                }
                let take = self.remaining.min(self.buffer.len() as u64) as usize;
                self.deliver(take);
                self.buffer.consume(take);
                self.remaining -= take as u64;
                if self.remaining > 0 {
                    return;
                }
            }

            self.complete_body();
        }
    }

    /// Accumulates buffered bytes into the head buffer until the blank line
    /// is found, then parses the head and hands any surplus bytes back to
    /// the receive buffer. Split-safe at every byte offset.
    fn read_head(&mut self) -> Step {
        self.head_buf.extend_from_slice(self.buffer.as_slice());
        self.buffer.clear();

        if self.head_buf.len() >= 5 && !self.head_buf.starts_with(b"HTTP/") {
            self.protocol_error(Error::NotHttp);
            return Step::Halt;
        }

        let Some(end) = find_head_end(&self.head_buf) else {
            if self.head_buf.len() > MAX_HEAD_LEN {
                self.protocol_error(Error::HeadersTooLong);
                return Step::Halt;
            }
            return Step::NeedMore;
        };

        log::trace!(
            "{}",
            String::from_utf8_lossy(&self.head_buf[..end]).replace("\r\n", "\r\n< ")
        );

        let head = match parse_head(&self.head_buf[..end]) {
            Ok(head) => head,
            Err(e) => {
                self.protocol_error(e);
                return Step::Halt;
            }
        };

        let leftover = self.head_buf.split_off(end);
        self.head_buf.clear();
        self.buffer.restore(&leftover);

        self.status = Some(head.status);
        self.headers = head.headers;
        self.handle_status();
        Step::Continue
    }

    /// Applies the parsed head to the transfer state and dispatches status
    /// handling: success statuses fall through to body delivery, redirects
    /// enqueue their successor, everything else just has its body drained
    /// undelivered.
    fn handle_status(&mut self) {
        let status = self.status.unwrap_or_default();

        self.content_length = self
            .headers
            .get("content-length")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);
        self.remaining = self.content_length;
        self.chunked = self.headers.value_starts_with("transfer-encoding", "chunked");
        self.final_chunk = false;
        if self.chunked {
            self.remaining = 0;
        }
        self.must_close = !self.headers.value_starts_with("connection", "keep-alive");

        log::debug!("got http status {status}");

        // 1xx responses are allowed through the success path unhandled
        if matches!(status, 100..=205) {
            if !self.chunked && self.content_length == 0 {
                log::debug!(
                    "success response with no content-length and no chunked transfer; \
                     nothing will be delivered"
                );
            }
            return;
        }

        if let 301 | 302 | 303 | 307 | 308 = status {
            if self.follow_redirects {
                if let Some(location) = self.headers.get("location").map(String::from) {
                    self.follow_redirect(&location, status == 303);
                }
            }
        }
    }

    /// Builds the redirect successor request and puts it at the front of
    /// the queue. A 303 forces the method back to GET; everything else
    /// preserves the method and body.
    fn follow_redirect(&mut self, location: &str, force_get: bool) {
        let Some((base, extra, tag, form)) = self.current.as_ref().map(|current| {
            (
                current.url().clone(),
                current.extra_headers().to_string(),
                current.tag(),
                if force_get { None } else { current.form().cloned() },
            )
        }) else {
            return;
        };

        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match base.join(location) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!("unusable redirect location {location:?}: {e}");
                    return;
                }
            },
            Err(e) => {
                log::warn!("unusable redirect location {location:?}: {e}");
                return;
            }
        };

        let mut next = match Request::new(url) {
            Ok(next) => next,
            Err(e) => {
                log::warn!("not following redirect to {location:?}: {e}");
                return;
            }
        };
        next.set_extra_headers(extra);
        next.set_tag(tag);
        if let Some(form) = form {
            next.set_form(form);
        }
        if let Err(e) = next.seal_head(&self.config) {
            log::warn!("could not serialize redirect request: {e}");
            return;
        }

        log::debug!("following http redirect to {location}");
        self.queue.push_front(next);
        self.redirecting = true;
    }

    /// Decodes as many chunks as the buffer holds. Within a chunk,
    /// `remaining` counts the rest of the chunk data plus its trailing
    /// CRLF; between chunks it is zero.
    fn process_chunks(&mut self) -> Step {
        loop {
            if self.remaining > 0 {
                if self.buffer.is_empty() {
                    return Step::NeedMore;
                }
                let take = self.remaining.min(self.buffer.len() as u64);
                let payload = if self.remaining > 2 {
                    take.min(self.remaining - 2) as usize
                } else {
                    0
                };
                self.deliver(payload);
                self.buffer.consume(take as usize);
                self.remaining -= take;
                if self.remaining > 0 {
                    return Step::NeedMore;
                }
                if self.final_chunk {
                    break;
                }
            }

            match httparse::parse_chunk_size(self.buffer.as_slice()) {
                Ok(httparse::Status::Complete((used, size))) => {
                    self.buffer.consume(used);
                    // the chunk data is followed by a CRLF that must be
                    // consumed along with it
                    self.remaining = size + 2;
                    if size == 0 {
                        self.final_chunk = true;
                    }
                }
                Ok(httparse::Status::Partial) => {
                    self.buffer.compact();
                    return Step::NeedMore;
                }
                Err(_) => {
                    self.protocol_error(Error::InvalidChunkFraming);
                    return Step::Halt;
                }
            }
        }

        self.chunked = false;
        self.final_chunk = false;
        self.complete_body();
        Step::Continue
    }

    /// Hands the first `len` unread bytes to the handler, subject to the
    /// success / always-handle gate.
    fn deliver(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        if !matches!(self.status, Some(200..=205)) && !self.always_handle {
            return;
        }
        if let Some(request) = self.current.as_ref() {
            let body = &self.buffer.as_slice()[..len];
            self.handler.on_recv(request, body);
        }
    }

    /// The current response body is fully received: finalize the request
    /// and move on to the next queued one, closing first if the server
    /// asked for it.
    fn complete_body(&mut self) {
        if !self.buffer.is_empty() {
            log::warn!(
                "{} unexpected bytes left in the buffer after the response body",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        self.dequeue_next();
    }

    /// Finalizes any finished request, then sends the next queued one.
    fn dequeue_next(&mut self) {
        self.finish_request();

        if let Some(request) = self.queue.pop_front() {
            log::debug!(
                "dequeueing the next request, {} more waiting",
                self.queue.len()
            );
            if let Err(e) = self.open_and_send(request) {
                log::error!("failed to send queued request: {e}");
                self.finish_request();
            }
        }
    }

    /// Fires `on_request_done` (unless a followed redirect supersedes the
    /// request), resets the transfer state, and closes the connection when
    /// the response demanded it.
    fn finish_request(&mut self) {
        let Some(request) = self.current.take() else {
            return;
        };
        if !self.redirecting || self.always_handle {
            self.handler.on_request_done(&request, self.status);
        }
        self.in_progress = false;
        self.headers.clear();
        self.head_buf.clear();
        self.remaining = 0;
        self.content_length = 0;
        self.chunked = false;
        self.final_chunk = false;
        if self.must_close {
            self.close_transport();
        }
    }

    /// Opens a transport to the request's endpoint if needed (closing a
    /// connection to a different endpoint first) and writes the request
    /// bytes.
    fn open_and_send(&mut self, request: Request) -> Result<()> {
        self.status = None;
        self.redirecting = false;
        self.content_length = 0;
        self.remaining = 0;
        self.chunked = false;
        self.final_chunk = false;
        self.must_close = true;
        self.headers.clear();
        self.head_buf.clear();

        let endpoint = (
            request.host().to_string(),
            request.port(),
            request.is_tls(),
        );
        if self.transport.is_some() && self.endpoint.as_ref() != Some(&endpoint) {
            log::debug!("endpoint changed, closing connection to {:?}", self.endpoint);
            self.close_transport();
        }

        if self.transport.is_none() {
            log::debug!("opening connection to {}:{}", request.host(), request.port());
            match self.connector.connect(&request) {
                Ok(mut transport) => {
                    if let Err(e) = transport.set_nonblocking(self.nonblocking) {
                        self.current = Some(request);
                        return Err(e.into());
                    }
                    self.endpoint = Some(endpoint);
                    self.transport = Some(transport);
                    self.handler.on_open();
                }
                Err(e) => {
                    self.current = Some(request);
                    return Err(e);
                }
            }
        }

        match self.send_all(request.head()) {
            Ok(()) => {
                self.current = Some(request);
                self.in_progress = true;
                Ok(())
            }
            Err(e) => {
                self.close_transport();
                self.current = Some(request);
                Err(e)
            }
        }
    }

    /// Writes all of `bytes`, looping over partial and would-block writes.
    fn send_all(&mut self, bytes: &[u8]) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;
        let mut written = 0;
        while written < bytes.len() {
            match transport.write(&bytes[written..]) {
                Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
                Ok(n) => written += n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => return Err(e.into()),
            }
        }
        match transport.flush() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Drops the transport, firing `on_close` unless a redirect is in
    /// progress.
    fn close_transport(&mut self) {
        if self.transport.take().is_some() {
            log::debug!("closing connection to {:?}", self.endpoint);
            if !self.redirecting || self.always_handle {
                self.handler.on_close();
            }
        }
        self.endpoint = None;
        self.buffer.clear();
    }

    /// A protocol violation fails the in-flight request and closes the
    /// connection; it is never surfaced as a panic or a thrown error.
    fn protocol_error(&mut self, error: Error) {
        log::error!("{error}; closing the connection");
        self.close_transport();
        self.finish_request();
    }
}

impl<H: Handler, C: Connector> Pollable for HttpConn<H, C> {
    fn update(&mut self) -> bool {
        HttpConn::update(self)
    }

    fn is_open(&self) -> bool {
        HttpConn::is_open(self)
    }

    fn has_pending_work(&self) -> bool {
        HttpConn::has_pending_work(self)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) {
        HttpConn::set_nonblocking(self, nonblocking);
    }
}
