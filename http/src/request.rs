use std::fmt::{self, Debug, Formatter};
use std::io::Write;

use url::Url;

use crate::{Error, Form, Method, Result};

/// Connection-level configuration that shapes every outgoing request head.
#[derive(Clone, Debug, Default)]
pub struct RequestConfig {
    /// Keep-alive timeout in seconds to advertise. Zero advertises
    /// `Connection: close` instead.
    pub keep_alive: u32,

    /// `User-Agent` header value; omitted when empty.
    pub user_agent: String,

    /// `Accept-Encoding` header value; omitted when empty. The client
    /// advertises it but never decodes response bodies.
    pub accept_encoding: String,
}

/**
A single unit of work for the client: where to connect and what to ask for.

A request is built from a url (a missing scheme defaults to `http`),
optionally carries a [`Form`] body (which makes it a POST), raw extra header
lines, and an opaque user tag that is passed through to the handler
callbacks untouched.

The serialized request bytes are produced exactly once, when the engine
accepts the request; they are immutable afterwards.
*/
#[derive(Clone)]
pub struct Request {
    url: Url,
    form: Option<Form>,
    extra_headers: String,
    tag: usize,
    head: Vec<u8>,
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url.as_str())
            .field("method", &self.method())
            .field("tag", &self.tag)
            .finish()
    }
}

impl Request {
    /// Builds a request from an already-parsed [`Url`]. Only `http` and
    /// `https` urls are accepted.
    pub fn new(url: Url) -> Result<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::UnexpectedUriFormat);
        }
        if url.host_str().is_none() {
            return Err(Error::MissingHost);
        }
        Ok(Self {
            url,
            form: None,
            extra_headers: String::new(),
            tag: 0,
            head: Vec::new(),
        })
    }

    /// Parses a url string into a request. A missing scheme defaults to
    /// `http`, a missing port to 80/443, and a missing path to `/`.
    pub fn parse(input: &str) -> Result<Self> {
        let url = match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            // "host:8080/path" parses as scheme "host"; treat anything
            // without an explicit "://" as a bare authority
            Ok(_) if !input.contains("://") => Url::parse(&format!("http://{input}"))?,
            Ok(_) => return Err(Error::UnexpectedUriFormat),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("http://{input}"))?
            }
            Err(e) => return Err(e.into()),
        };
        Self::new(url)
    }

    /// The url this request targets.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The host to connect to.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// The port to connect to: an explicit port if the url has one, else 80
    /// for http and 443 for https.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    /// Whether the connection should be wrapped in TLS.
    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// The `(host, port, tls)` fingerprint identifying a reusable
    /// connection.
    pub fn endpoint(&self) -> (&str, u16, bool) {
        (self.host(), self.port(), self.is_tls())
    }

    /// The request target as it appears in the request line: the path plus
    /// any query string.
    pub fn resource(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// POST iff a non-empty form body is attached, GET otherwise.
    pub fn method(&self) -> Method {
        match &self.form {
            Some(form) if !form.is_empty() => Method::Post,
            _ => Method::Get,
        }
    }

    /// Attaches a form body, turning this request into a POST.
    pub fn set_form(&mut self, form: Form) {
        self.form = Some(form);
    }

    /// Chainable [`set_form`](Request::set_form).
    pub fn with_form(mut self, form: Form) -> Self {
        self.set_form(form);
        self
    }

    /// Borrows the form body, if any.
    pub fn form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    /// Removes the form body, turning this request back into a GET.
    pub fn take_form(&mut self) -> Option<Form> {
        self.form.take()
    }

    /// Sets raw extra header lines, CRLF-separated. A missing final CRLF is
    /// appended at serialization time.
    pub fn set_extra_headers(&mut self, extra: impl Into<String>) {
        self.extra_headers = extra.into();
    }

    /// Chainable [`set_extra_headers`](Request::set_extra_headers).
    pub fn with_extra_headers(mut self, extra: impl Into<String>) -> Self {
        self.set_extra_headers(extra);
        self
    }

    /// The raw extra header lines.
    pub fn extra_headers(&self) -> &str {
        &self.extra_headers
    }

    /// Sets the opaque user tag passed through to handler callbacks.
    pub fn set_tag(&mut self, tag: usize) {
        self.tag = tag;
    }

    /// Chainable [`set_tag`](Request::set_tag).
    pub fn with_tag(mut self, tag: usize) -> Self {
        self.set_tag(tag);
        self
    }

    /// The opaque user tag.
    pub fn tag(&self) -> usize {
        self.tag
    }

    /// The serialized request bytes. Empty until the request has been
    /// accepted by the engine.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Serializes the request into its wire bytes. Called by the engine
    /// when the request is accepted; the result is immutable afterwards.
    pub fn seal_head(&mut self, config: &RequestConfig) -> Result<()> {
        if !self.head.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(128);
        write!(buf, "{} {} HTTP/1.1\r\n", self.method(), self.resource())?;
        write!(buf, "Host: {}\r\n", self.host())?;

        if config.keep_alive > 0 {
            write!(buf, "Connection: Keep-Alive\r\n")?;
            write!(buf, "Keep-Alive: {}\r\n", config.keep_alive)?;
        } else {
            write!(buf, "Connection: close\r\n")?;
        }

        if !config.user_agent.is_empty() {
            write!(buf, "User-Agent: {}\r\n", config.user_agent)?;
        }

        if !config.accept_encoding.is_empty() {
            write!(buf, "Accept-Encoding: {}\r\n", config.accept_encoding)?;
        }

        let body = self.form.as_ref().filter(|form| !form.is_empty());
        if let Some(form) = body {
            write!(buf, "Content-Length: {}\r\n", form.len())?;
            write!(buf, "Content-Type: application/x-www-form-urlencoded\r\n")?;
        }

        if !self.extra_headers.is_empty() {
            buf.extend_from_slice(self.extra_headers.as_bytes());
            if !self.extra_headers.ends_with("\r\n") {
                buf.extend_from_slice(b"\r\n");
            }
        }

        buf.extend_from_slice(b"\r\n");

        log::trace!(
            "{}",
            String::from_utf8_lossy(&buf).replace("\r\n", "\r\n> ")
        );

        if let Some(form) = body {
            buf.extend_from_slice(form.as_str().as_bytes());
        }

        self.head = buf;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Request, RequestConfig};
    use crate::Form;

    fn head_string(request: &mut Request, config: &RequestConfig) -> String {
        request.seal_head(config).unwrap();
        String::from_utf8(request.head().to_vec()).unwrap()
    }

    #[test]
    fn url_defaults() {
        let request = Request::parse("example.com").unwrap();
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.port(), 80);
        assert_eq!(request.resource(), "/");
        assert!(!request.is_tls());

        let request = Request::parse("https://example.com/a/b?q=1").unwrap();
        assert_eq!(request.port(), 443);
        assert_eq!(request.resource(), "/a/b?q=1");
        assert!(request.is_tls());

        let request = Request::parse("localhost:8080/api").unwrap();
        assert_eq!(request.host(), "localhost");
        assert_eq!(request.port(), 8080);
        assert_eq!(request.resource(), "/api");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(Request::parse("ftp://example.com/").is_err());
        assert!(Request::parse("file:///etc/passwd").is_err());
    }

    #[test]
    fn minimal_get_head() {
        env_logger::try_init().ok();
        let mut request = Request::parse("http://example.com/").unwrap();
        let head = head_string(&mut request, &RequestConfig::default());
        assert_eq!(
            head,
            "GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn keep_alive_and_agent_headers() {
        let mut request = Request::parse("http://example.com/x").unwrap();
        let config = RequestConfig {
            keep_alive: 15,
            user_agent: "minnow-test".into(),
            accept_encoding: "identity".into(),
        };
        let head = head_string(&mut request, &config);
        assert!(head.starts_with("GET /x HTTP/1.1\r\n"));
        assert!(head.contains("Connection: Keep-Alive\r\nKeep-Alive: 15\r\n"));
        assert!(head.contains("User-Agent: minnow-test\r\n"));
        assert!(head.contains("Accept-Encoding: identity\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn post_head_carries_length_type_and_body() {
        let mut request = Request::parse("https://httpbin.org/post")
            .unwrap()
            .with_form(Form::new().with("a", "b").with("x", "a b"));

        let head = head_string(&mut request, &RequestConfig::default());
        assert!(head.starts_with("POST /post HTTP/1.1\r\n"));
        assert!(head.contains("Content-Length: 9\r\n"));
        assert!(head.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(head.ends_with("\r\n\r\na=b&x=a+b"));
    }

    #[test]
    fn extra_headers_gain_a_missing_crlf() {
        let mut request = Request::parse("http://example.com/")
            .unwrap()
            .with_extra_headers("X-One: 1\r\nX-Two: 2");
        let head = head_string(&mut request, &RequestConfig::default());
        assert!(head.contains("X-One: 1\r\nX-Two: 2\r\n\r\n"));
    }

    #[test]
    fn head_is_sealed_once() {
        let mut request = Request::parse("http://example.com/").unwrap();
        request.seal_head(&RequestConfig::default()).unwrap();
        let first = request.head().to_vec();
        request
            .seal_head(&RequestConfig {
                keep_alive: 9,
                ..RequestConfig::default()
            })
            .unwrap();
        assert_eq!(request.head(), &first[..]);
    }

    #[test]
    fn fragment_never_reaches_the_request_line() {
        let request = Request::parse("http://example.com/page#pos").unwrap();
        assert_eq!(request.resource(), "/page");
    }
}
