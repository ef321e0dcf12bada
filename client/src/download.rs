use minnow_http::{Form, Request};

use crate::{Connector, Handler, HttpConn, RustlsConnector};

const USER_AGENT: &str = concat!("minnow/", env!("CARGO_PKG_VERSION"));
const DOWNLOAD_BUFSIZE: usize = 64 * 1024;

/// Accumulates delivered body bytes until the request reaches a terminal
/// state.
#[derive(Default)]
struct Collector {
    body: Vec<u8>,
    finished: bool,
}

impl Handler for Collector {
    fn on_recv(&mut self, _request: &Request, body: &[u8]) {
        self.body.extend_from_slice(body);
    }

    fn on_request_done(&mut self, _request: &Request, _status: Option<u16>) {
        self.finished = true;
    }
}

/**
Blocking one-shot download: fetches `url`, following redirects, and returns
the response body.

Returns `None` on any failure, and also for a success whose body is
empty, so a `204 No Content` is indistinguishable from a failure here. Use
an [`HttpConn`] directly when that distinction matters.

```no_run
let body = minnow_client::download("http://example.com/").unwrap();
assert!(!body.is_empty());
```
*/
pub fn download(url: &str) -> Option<Vec<u8>> {
    download_with(url, None)
}

/// Like [`download`], with an optional form body that turns the request
/// into a POST.
pub fn download_with(url: &str, form: Option<Form>) -> Option<Vec<u8>> {
    download_with_connector(RustlsConnector::default(), url, form)
}

/// Like [`download_with`], over a caller-supplied [`Connector`].
pub fn download_with_connector<C: Connector>(
    connector: C,
    url: &str,
    form: Option<Form>,
) -> Option<Vec<u8>> {
    let mut request = Request::parse(url).ok()?;
    if let Some(form) = form {
        request.set_form(form);
    }

    let mut conn = HttpConn::with_connector(connector, Collector::default());
    conn.set_recv_buffer_size(DOWNLOAD_BUFSIZE);
    conn.set_nonblocking(false);
    conn.set_follow_redirects(true);
    conn.set_always_handle(false);
    conn.set_user_agent(USER_AGENT);

    if let Err(e) = conn.send(request) {
        log::debug!("download could not be started: {e}");
        return None;
    }

    while conn.is_open() || conn.has_pending_work() {
        conn.update();
    }

    let collector = conn.into_handler();
    if collector.finished && !collector.body.is_empty() {
        Some(collector.body)
    } else {
        None
    }
}
