use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};

/// Request line plus headers must fit in this many bytes.
pub(crate) const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug)]
pub(crate) enum ReadOutcome {
    Request(HttpRequest),
    /// Declared body exceeds the upload limit; the body was not read.
    TooLarge,
    BadRequest(String),
}

/// Read one request. Bodies are only accepted with `Content-Length`.
pub(crate) fn read_request<S: Read + Write>(stream: &mut S, max_body: usize) -> Result<ReadOutcome> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n", 0) {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Ok(ReadOutcome::BadRequest("request headers too large".to_string()));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers were complete"));
        }
        data.extend_from_slice(&buf[..n]);
    };
    if header_end > MAX_HEADER_BYTES {
        return Ok(ReadOutcome::BadRequest("request headers too large".to_string()));
    }

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(raw_path)) = (parts.next(), parts.next()) else {
        return Ok(ReadOutcome::BadRequest("malformed request line".to_string()));
    };
    let method = method.to_string();
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }
    drop(text);

    if headers.contains_key("transfer-encoding") {
        return Ok(ReadOutcome::BadRequest(
            "chunked request bodies are not supported; send Content-Length".to_string(),
        ));
    }
    let content_length = match headers.get("content-length") {
        Some(raw) => match raw.parse::<usize>() {
            Ok(len) => len,
            Err(_) => return Ok(ReadOutcome::BadRequest("invalid Content-Length".to_string())),
        },
        None => 0,
    };
    if content_length > max_body {
        return Ok(ReadOutcome::TooLarge);
    }

    let mut body = data.split_off(header_end + 4);
    let expects_continue = headers
        .get("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));
    if expects_continue && body.len() < content_length {
        stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
        stream.flush()?;
    }
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!(
                "request body ended after {} of {} bytes",
                body.len(),
                content_length
            ));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    Ok(ReadOutcome::Request(HttpRequest {
        method,
        path,
        headers,
        body,
    }))
}

#[derive(Debug)]
pub(crate) struct Response {
    pub status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(err) => {
                log::error!("failed to serialize response: {}", err);
                Self::raw_json(500, r#"{"status":"error","error":"internal error"}"#)
            }
        }
    }

    /// `{"status":"error","error":message}`
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(
            status,
            &serde_json::json!({ "status": "error", "error": message.into() }),
        )
    }

    pub fn raw_json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into_bytes(),
        }
    }
}

pub(crate) fn write_response<W: Write>(stream: &mut W, response: &Response) -> Result<()> {
    let status_line = match response.status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = response.content_type,
        len = response.body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()?;
    Ok(())
}

/// Position of `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Scripted input with a separate record of everything written back.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn request(outcome: ReadOutcome) -> HttpRequest {
        match outcome {
            ReadOutcome::Request(req) => req,
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn reads_content_length_body() {
        let mut stream =
            Duplex::new(b"POST /add_mapping?x=1 HTTP/1.1\r\nContent-Length: 5\r\nX-Test: yes\r\n\r\nhello");
        let req = request(read_request(&mut stream, 1024).unwrap());
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/add_mapping");
        assert_eq!(req.header("x-test"), Some("yes"));
        assert_eq!(req.body, b"hello");
        assert!(stream.output.is_empty());
    }

    #[test]
    fn oversized_body_is_refused_before_reading() {
        let mut stream = Duplex::new(b"POST /classify HTTP/1.1\r\nContent-Length: 2048\r\n\r\n");
        assert!(matches!(
            read_request(&mut stream, 1024).unwrap(),
            ReadOutcome::TooLarge
        ));
    }

    #[test]
    fn chunked_bodies_are_rejected() {
        let mut stream =
            Duplex::new(b"POST /classify HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n");
        assert!(matches!(
            read_request(&mut stream, 1024).unwrap(),
            ReadOutcome::BadRequest(_)
        ));
    }

    #[test]
    fn expect_continue_gets_interim_response() {
        let mut stream = Duplex::new(
            b"POST /classify HTTP/1.1\r\nContent-Length: 3\r\nExpect: 100-continue\r\n\r\nabc",
        );
        // The body arrives in the same buffer here, so no interim reply is needed.
        let req = request(read_request(&mut stream, 1024).unwrap());
        assert_eq!(req.body, b"abc");

        let mut partial = Duplex::new(b"POST /classify HTTP/1.1\r\nContent-Length: 3\r\nExpect: 100-continue\r\n\r\n");
        assert!(read_request(&mut partial, 1024).is_err());
        assert!(partial.output.starts_with(b"HTTP/1.1 100 Continue"));
    }

    #[test]
    fn header_block_is_capped() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEADER_BYTES + 10));
        raw.extend_from_slice(b"\r\n\r\n");
        let mut stream = Duplex::new(&raw);
        assert!(matches!(
            read_request(&mut stream, 1024).unwrap(),
            ReadOutcome::BadRequest(_)
        ));
    }

    #[test]
    fn error_response_shape() {
        let mut out = Vec::new();
        write_response(&mut out, &Response::error(413, "File too large")).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(text.contains("Connection: close"));
        let body = text.split("\r\n\r\n").nth(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "File too large");
    }

    #[test]
    fn find_respects_offset() {
        assert_eq!(find(b"abcabc", b"bc", 0), Some(1));
        assert_eq!(find(b"abcabc", b"bc", 2), Some(4));
        assert_eq!(find(b"abc", b"x", 0), None);
    }
}
