use memchr::memmem::Finder;

use crate::{Error, Headers, Result};

const MAX_HEADERS: usize = 128;

/// The parsed portion of a response that precedes the body.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// The status code from the status line.
    pub status: u16,

    /// The header fields, lower-cased and last-wins.
    pub headers: Headers,
}

/// Searches `buf` for the `\r\n\r\n` head terminator and returns the index
/// just past it, where the body begins.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    Finder::new(b"\r\n\r\n").find(buf).map(|index| index + 4)
}

/// Parses a complete response head (everything up to and including the
/// `\r\n\r\n` terminator) into a status code and header map.
pub fn parse_head(head: &[u8]) -> Result<ResponseHead> {
    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut header_buf);

    if response.parse(head)?.is_partial() {
        return Err(Error::PartialHead);
    }

    let status = response.code.ok_or(Error::MalformedHeader("status line".into()))?;

    let mut headers = Headers::new();
    for header in response.headers.iter() {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| Error::MalformedHeader(header.name.to_string().into()))?;
        headers.insert(header.name, value.trim());
    }

    Ok(ResponseHead { status, headers })
}

#[cfg(test)]
mod tests {
    use super::{find_head_end, parse_head};
    use crate::Error;

    #[test]
    fn terminator_search() {
        assert_eq!(find_head_end(b"HTTP/1.1 200 OK\r\n\r\nbody"), Some(19));
        assert_eq!(find_head_end(b"HTTP/1.1 200 OK\r\n"), None);
        assert_eq!(find_head_end(b""), None);
    }

    #[test]
    fn status_and_headers() {
        let head = parse_head(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\n",
        )
        .unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.headers.get("content-length"), Some("5"));
        assert_eq!(head.headers.get("Connection"), Some("close"));
    }

    #[test]
    fn names_lowercase_values_trimmed_duplicates_last_wins() {
        let head = parse_head(
            b"HTTP/1.1 301 Moved Permanently\r\nLocation:  /b \r\nX-Dup: one\r\nX-DUP: two\r\n\r\n",
        )
        .unwrap();
        assert_eq!(head.status, 301);
        assert_eq!(head.headers.get("location"), Some("/b"));
        assert_eq!(head.headers.get("x-dup"), Some("two"));
        assert_eq!(head.headers.len(), 2);
    }

    #[test]
    fn partial_and_malformed_heads_are_errors() {
        assert!(matches!(
            parse_head(b"HTTP/1.1 200 OK\r\nContent-"),
            Err(Error::PartialHead)
        ));
        assert!(parse_head(b"SSH-2.0-OpenSSH_9.0\r\n\r\n").is_err());
    }
}
