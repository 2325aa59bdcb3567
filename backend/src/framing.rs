//! Turns raw socket reads into whole application messages.
//!
//! Both framers keep their buffer in `self` and only await inside
//! `read_buf`, so `next_message` is cancel-safe and can sit in a
//! `tokio::select!` next to the other direction of the relay.

use crate::constants;
use crate::service::ProtocolType;
use bytes::{Bytes, BytesMut};
use http::Method;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("message larger than {0} bytes")]
    MessageTooLarge(usize),
}

/// Which side of an HTTP exchange a framer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpSide {
    /// Client to backend: requests.
    Request,
    /// Backend to client: responses.
    Response,
}

#[derive(Debug)]
pub enum StreamFramer {
    Tcp(TcpFramer),
    Http(HttpFramer),
}

impl StreamFramer {
    /// Framers for both directions of one connection, as
    /// `(client->backend, backend->client)`.
    pub fn pair(protocol: ProtocolType, max_message: usize) -> (Self, Self) {
        if protocol.is_http() {
            let (requests, responses) = HttpFramer::pair(max_message);
            (StreamFramer::Http(requests), StreamFramer::Http(responses))
        } else {
            (
                StreamFramer::Tcp(TcpFramer::new()),
                StreamFramer::Tcp(TcpFramer::new()),
            )
        }
    }

    pub async fn next_message<R>(&mut self, reader: &mut R) -> Result<Bytes, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        match self {
            StreamFramer::Tcp(f) => f.next_message(reader).await,
            StreamFramer::Http(f) => f.next_message(reader).await,
        }
    }
}

/// One successful read is one message.
#[derive(Debug, Default)]
pub struct TcpFramer {
    buf: BytesMut,
}

impl TcpFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(constants::network::READ_CHUNK_SIZE),
        }
    }

    pub async fn next_message<R>(&mut self, reader: &mut R) -> Result<Bytes, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        self.buf.reserve(constants::network::READ_CHUNK_SIZE);
        let n = reader.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Err(FramingError::ConnectionClosed);
        }
        Ok(self.buf.split().freeze())
    }
}

/// State both directions of one HTTP connection need to agree on.
#[derive(Debug, Default)]
struct Exchange {
    /// Methods of forwarded requests still waiting for a final response.
    methods: VecDeque<Method>,
    /// Set after `101` or a successful `CONNECT`; from then on neither side is HTTP.
    tunnel: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Body {
    Empty,
    Length(usize),
    Chunked,
    /// Response without a length: the body runs until the backend closes.
    UntilClose,
}

/// Bookkeeping applied to the [`Exchange`] once a message is handed out.
#[derive(Debug)]
enum Settle {
    Record(Method),
    Answer,
    Interim,
    Upgrade,
}

/// A parsed head whose message is still being assembled.
#[derive(Debug)]
struct Pending {
    head_len: usize,
    body: Body,
    settle: Settle,
    chunks: ChunkScan,
}

/// Yields one complete HTTP/1.x message (head + body) per call.
#[derive(Debug)]
pub struct HttpFramer {
    side: HttpSide,
    buf: BytesMut,
    max_message: usize,
    eof: bool,
    pending: Option<Pending>,
    exchange: Arc<Mutex<Exchange>>,
}

impl HttpFramer {
    /// A framer that does not see the other direction. Responses to `HEAD`
    /// cannot be recognised this way; relays use [`HttpFramer::pair`].
    pub fn new(side: HttpSide, max_message: usize) -> Self {
        Self::with_exchange(side, max_message, Arc::default())
    }

    /// Request and response framers for one connection.
    pub fn pair(max_message: usize) -> (Self, Self) {
        let exchange: Arc<Mutex<Exchange>> = Arc::default();
        (
            Self::with_exchange(HttpSide::Request, max_message, exchange.clone()),
            Self::with_exchange(HttpSide::Response, max_message, exchange),
        )
    }

    fn with_exchange(side: HttpSide, max_message: usize, exchange: Arc<Mutex<Exchange>>) -> Self {
        Self {
            side,
            buf: BytesMut::with_capacity(constants::network::READ_CHUNK_SIZE),
            max_message,
            eof: false,
            pending: None,
            exchange,
        }
    }

    pub async fn next_message<R>(&mut self, reader: &mut R) -> Result<Bytes, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(len) = self.complete_len() {
                let message = self.buf.split_to(len).freeze();
                self.settle();
                return Ok(message);
            }
            if self.eof {
                if self.buf.is_empty() {
                    return Err(FramingError::ConnectionClosed);
                }
                // Whatever is left is the last message, complete or not.
                self.pending = None;
                return Ok(self.buf.split().freeze());
            }
            if self.buf.len() > self.max_message {
                return Err(FramingError::MessageTooLarge(self.max_message));
            }

            self.buf.reserve(constants::network::READ_CHUNK_SIZE);
            if reader.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }

    /// Length of the first complete message in the buffer, if there is one.
    /// The parsed head and chunk position are kept between calls.
    fn complete_len(&mut self) -> Option<usize> {
        if self.buf.is_empty() {
            return None;
        }
        if self.pending.is_none() {
            if self.exchange.lock().tunnel {
                return Some(self.buf.len());
            }
            let head = match self.side {
                HttpSide::Request => parse_request_head(&self.buf),
                HttpSide::Response => {
                    let method = self.exchange.lock().methods.front().cloned();
                    parse_response_head(&self.buf, method.as_ref())
                }
            };
            match head {
                Head::Complete(pending) => self.pending = Some(pending),
                Head::Partial if self.buf.len() <= constants::framing::MAX_HEADER_BYTES => {
                    return None
                }
                Head::Partial => return Some(self.buf.len()),
                Head::NotHttp => return opaque_len(&self.buf),
            }
        }

        let pending = self.pending.as_mut()?;
        let head_len = pending.head_len;
        match pending.body {
            Body::Empty => Some(head_len),
            Body::Length(n) => {
                let total = head_len.checked_add(n)?;
                (self.buf.len() >= total).then_some(total)
            }
            Body::Chunked => match pending.chunks.advance(&self.buf[head_len..]) {
                Ok(Some(n)) => Some(head_len + n),
                Ok(None) => None,
                Err(()) => Some(self.buf.len()),
            },
            Body::UntilClose => None,
        }
    }

    fn settle(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let mut exchange = self.exchange.lock();
        match pending.settle {
            Settle::Record(method) => exchange.methods.push_back(method),
            Settle::Answer => {
                exchange.methods.pop_front();
            }
            Settle::Interim => {}
            Settle::Upgrade => {
                exchange.methods.pop_front();
                exchange.tunnel = true;
            }
        }
    }
}

/// Bytes that do not parse as HTTP are held until a blank line (or the
/// header limit) so a payload cannot be spread across reads.
fn opaque_len(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 4);
    }
    (buf.len() > constants::framing::MAX_HEADER_BYTES).then_some(buf.len())
}

enum Head {
    Complete(Pending),
    Partial,
    NotHttp,
}

impl Head {
    fn complete(head_len: usize, body: Body, settle: Settle) -> Self {
        Head::Complete(Pending {
            head_len,
            body,
            settle,
            chunks: ChunkScan::default(),
        })
    }
}

/// Header slots for a head that overflowed the default array: one per line
/// is always enough.
fn header_capacity(buf: &[u8]) -> usize {
    buf.iter()
        .take(constants::framing::MAX_HEADER_BYTES)
        .filter(|b| **b == b'\n')
        .count()
        + 1
}

fn parse_request_head(buf: &[u8]) -> Head {
    let mut headers = [httparse::EMPTY_HEADER; constants::framing::MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf) {
        Err(httparse::Error::TooManyHeaders) => {
            let mut headers = vec![httparse::EMPTY_HEADER; header_capacity(buf)];
            let mut req = httparse::Request::new(&mut headers);
            let status = req.parse(buf);
            request_head(status, &req)
        }
        status => request_head(status, &req),
    }
}

fn request_head(status: httparse::Result<usize>, req: &httparse::Request<'_, '_>) -> Head {
    let len = match status {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Head::Partial,
        Err(_) => return Head::NotHttp,
    };
    let Some(method) = req
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
    else {
        return Head::NotHttp;
    };
    match body_from_headers(req.headers) {
        Some(Body::UntilClose) => Head::complete(len, Body::Empty, Settle::Record(method)),
        Some(body) => Head::complete(len, body, Settle::Record(method)),
        None => Head::NotHttp,
    }
}

/// `method` is the oldest request not yet answered, when known.
fn parse_response_head(buf: &[u8], method: Option<&Method>) -> Head {
    let mut headers = [httparse::EMPTY_HEADER; constants::framing::MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);
    match resp.parse(buf) {
        Err(httparse::Error::TooManyHeaders) => {
            let mut headers = vec![httparse::EMPTY_HEADER; header_capacity(buf)];
            let mut resp = httparse::Response::new(&mut headers);
            let status = resp.parse(buf);
            response_head(status, &resp, method)
        }
        status => response_head(status, &resp, method),
    }
}

fn response_head(
    status: httparse::Result<usize>,
    resp: &httparse::Response<'_, '_>,
    method: Option<&Method>,
) -> Head {
    let len = match status {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Head::Partial,
        Err(_) => return Head::NotHttp,
    };
    let code = resp.code.unwrap_or(200);
    match code {
        101 => Head::complete(len, Body::Empty, Settle::Upgrade),
        100..=199 => Head::complete(len, Body::Empty, Settle::Interim),
        200..=299 if method == Some(&Method::CONNECT) => {
            Head::complete(len, Body::Empty, Settle::Upgrade)
        }
        204 | 304 => Head::complete(len, Body::Empty, Settle::Answer),
        _ if method == Some(&Method::HEAD) => Head::complete(len, Body::Empty, Settle::Answer),
        _ => match body_from_headers(resp.headers) {
            Some(body) => Head::complete(len, body, Settle::Answer),
            None => Head::NotHttp,
        },
    }
}

/// `None` when the framing headers are unusable (bad or conflicting lengths).
fn body_from_headers(headers: &[httparse::Header<'_>]) -> Option<Body> {
    let mut length: Option<usize> = None;
    let mut chunked = false;

    for h in headers {
        if h.name.eq_ignore_ascii_case("transfer-encoding") {
            let value = std::str::from_utf8(h.value).ok()?;
            if value
                .split(',')
                .any(|v| v.trim().eq_ignore_ascii_case("chunked"))
            {
                chunked = true;
            }
        } else if h.name.eq_ignore_ascii_case("content-length") {
            let value: usize = std::str::from_utf8(h.value).ok()?.trim().parse().ok()?;
            if length.is_some_and(|l| l != value) {
                return None;
            }
            length = Some(value);
        }
    }

    Some(match (chunked, length) {
        (true, _) => Body::Chunked,
        (false, Some(0)) => Body::Empty,
        (false, Some(n)) => Body::Length(n),
        (false, None) => Body::UntilClose,
    })
}

/// Walks a chunked body incrementally: `pos` only moves past whole chunks,
/// so each call resumes where the previous one stopped.
#[derive(Debug, Default)]
struct ChunkScan {
    pos: usize,
    trailers: bool,
}

impl ChunkScan {
    /// Size of the complete body including the last chunk and trailers.
    /// `Ok(None)` means more bytes are needed, `Err` means the encoding is broken.
    fn advance(&mut self, body: &[u8]) -> Result<Option<usize>, ()> {
        loop {
            if self.trailers {
                // trailer section ends with an empty line
                let Some(end) = find_crlf(&body[self.pos..]) else {
                    return Ok(None);
                };
                self.pos += end + 2;
                if end == 0 {
                    return Ok(Some(self.pos));
                }
                continue;
            }

            let (consumed, size) = match httparse::parse_chunk_size(&body[self.pos..]) {
                Ok(httparse::Status::Complete(v)) => v,
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(_) => return Err(()),
            };
            if size == 0 {
                self.pos += consumed;
                self.trailers = true;
                continue;
            }

            let size = usize::try_from(size).map_err(|_| ())?;
            let chunk_end = self
                .pos
                .checked_add(consumed)
                .and_then(|p| p.checked_add(size))
                .ok_or(())?;
            let end = chunk_end.checked_add(2).ok_or(())?;
            if body.len() < end {
                return Ok(None);
            }
            if &body[chunk_end..end] != b"\r\n" {
                return Err(());
            }
            self.pos = end;
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const MAX: usize = 1024 * 1024;

    fn http(side: HttpSide) -> StreamFramer {
        StreamFramer::Http(HttpFramer::new(side, MAX))
    }

    async fn drain(framer: &mut StreamFramer, reader: &mut tokio_test::io::Mock) -> Vec<Bytes> {
        let mut out = Vec::new();
        loop {
            match framer.next_message(reader).await {
                Ok(m) => out.push(m),
                Err(FramingError::ConnectionClosed) => return out,
                Err(e) => panic!("unexpected framing error: {}", e),
            }
        }
    }

    #[tokio::test]
    async fn tcp_yields_each_read() {
        let mut reader = Builder::new().read(b"hel").read(b"lo").build();
        let mut framer = StreamFramer::pair(ProtocolType::Tcp, MAX).0;
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs, vec![Bytes::from_static(b"hel"), Bytes::from_static(b"lo")]);
    }

    #[tokio::test]
    async fn http_request_assembled_across_reads() {
        let mut reader = Builder::new()
            .read(b"POST /login HTTP/1.1\r\nHost: x\r\nContent-")
            .read(b"Length: 10\r\n\r\nuser=")
            .read(b"admin")
            .read(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .build();
        let mut framer = http(HttpSide::Request);
        let msgs = drain(&mut framer, &mut reader).await;

        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].ends_with(b"user=admin"));
        assert!(msgs[0].starts_with(b"POST /login"));
        assert_eq!(&msgs[1][..], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[tokio::test]
    async fn pipelined_requests_split() {
        let mut reader = Builder::new()
            .read(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n")
            .build();
        let mut framer = StreamFramer::pair(ProtocolType::Https, MAX).0;
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1].starts_with(b"GET /b"));
    }

    #[tokio::test]
    async fn chunked_response_with_trailer() {
        let mut reader = Builder::new()
            .read(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .read(b"5\r\nhello\r\n6;ext=1\r\n world\r\n")
            .read(b"0\r\nX-Trailer: yes\r\n\r\n")
            .build();
        let mut framer = http(HttpSide::Response);
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].ends_with(b"X-Trailer: yes\r\n\r\n"));
    }

    #[tokio::test]
    async fn response_without_length_runs_until_close() {
        let mut reader = Builder::new()
            .read(b"HTTP/1.0 200 OK\r\n\r\nstream")
            .read(b"ing body")
            .build();
        let mut framer = http(HttpSide::Response);
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].ends_with(b"streaming body"));
    }

    #[tokio::test]
    async fn no_content_response_has_no_body() {
        let mut reader = Builder::new()
            .read(b"HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .build();
        let mut framer = http(HttpSide::Response);
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1].ends_with(b"ok"));
    }

    #[tokio::test]
    async fn garbage_on_http_port_is_opaque() {
        let mut reader = Builder::new().read(b"\x00\x01binary junk\r\n\r\n").build();
        let mut framer = http(HttpSide::Request);
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs, vec![Bytes::from_static(b"\x00\x01binary junk\r\n\r\n")]);
    }

    #[tokio::test]
    async fn truncated_message_is_flushed_on_close() {
        let mut reader = Builder::new()
            .read(b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\nshort")
            .build();
        let mut framer = http(HttpSide::Request);
        let msgs = drain(&mut framer, &mut reader).await;
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].ends_with(b"short"));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let mut reader = Builder::new()
            .read(b"POST / HTTP/1.1\r\nContent-Length: 100000\r\n\r\n")
            .read(&[b'a'; 200])
            .build();
        let mut framer = HttpFramer::new(HttpSide::Request, 64);
        let result = framer.next_message(&mut reader).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(64))));
    }

    #[test]
    fn conflicting_content_length_is_not_http() {
        let head = b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd";
        assert!(matches!(parse_request_head(head), Head::NotHttp));
    }

    #[test]
    fn chunk_scan_detects_bad_terminator() {
        assert_eq!(ChunkScan::default().advance(b"3\r\nabcX\r\n"), Err(()));
        assert_eq!(ChunkScan::default().advance(b"3\r\nab"), Ok(None));
        assert_eq!(ChunkScan::default().advance(b"0\r\n\r\nextra"), Ok(Some(5)));
    }

    #[test]
    fn huge_chunk_size_is_rejected() {
        assert_eq!(ChunkScan::default().advance(b"ffffffffffffffed\r\nabc"), Err(()));
        assert_eq!(ChunkScan::default().advance(b"ffffffffffffffff\r\n"), Err(()));
    }

    #[test]
    fn chunk_scan_resumes_after_whole_chunks() {
        let body = b"3\r\nabc\r\n4\r\ndefg\r\n0\r\n\r\n";
        let mut scan = ChunkScan::default();

        assert_eq!(scan.advance(&body[..10]), Ok(None));
        assert_eq!(scan.pos, 8);
        assert_eq!(scan.advance(&body[..17]), Ok(None));
        assert_eq!(scan.pos, 17);
        assert_eq!(scan.advance(body), Ok(Some(body.len())));
    }

    #[tokio::test]
    async fn chunked_body_in_tiny_reads() {
        let mut builder = Builder::new();
        builder.read(b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        let chunk: &[u8] = b"2\r\nev\r\n";
        for _ in 0..200 {
            for piece in chunk.chunks(3) {
                builder.read(piece);
            }
        }
        builder.read(b"0\r\n\r\n");
        let mut reader = builder.build();

        let msgs = drain(&mut http(HttpSide::Request), &mut reader).await;
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].ends_with(b"ev\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn head_response_has_no_body() {
        let (requests, responses) = HttpFramer::pair(MAX);
        let mut requests = StreamFramer::Http(requests);
        let mut responses = StreamFramer::Http(responses);

        let mut client = Builder::new()
            .read(b"HEAD /big HTTP/1.1\r\nHost: x\r\n\r\n")
            .read(b"GET /small HTTP/1.1\r\nHost: x\r\n\r\n")
            .build();
        assert_eq!(drain(&mut requests, &mut client).await.len(), 2);

        let mut backend = Builder::new()
            .read(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .build();
        let msgs = drain(&mut responses, &mut backend).await;
        assert_eq!(msgs.len(), 2);
        assert_eq!(&msgs[0][..], b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n");
        assert!(msgs[1].ends_with(b"\r\n\r\nok"));
    }

    #[tokio::test]
    async fn connect_tunnel_is_passed_through() {
        let (requests, responses) = HttpFramer::pair(MAX);
        let mut requests = StreamFramer::Http(requests);
        let mut responses = StreamFramer::Http(responses);

        let mut client = Builder::new()
            .read(b"CONNECT db:5432 HTTP/1.1\r\nHost: db:5432\r\n\r\n")
            .build();
        let first = requests.next_message(&mut client).await.unwrap();
        assert!(first.starts_with(b"CONNECT"));

        let mut backend = Builder::new()
            .read(b"HTTP/1.1 200 Connection Established\r\n\r\nraw")
            .read(b" server bytes")
            .build();
        let msgs = drain(&mut responses, &mut backend).await;
        assert_eq!(msgs.len(), 3);
        assert!(msgs[0].ends_with(b"Established\r\n\r\n"));
        assert_eq!(&msgs[1][..], b"raw");
        assert_eq!(&msgs[2][..], b" server bytes");

        let mut client = Builder::new().read(b"\x16\x03\x01").read(b"hello").build();
        let msgs = drain(&mut requests, &mut client).await;
        assert_eq!(msgs, vec![Bytes::from_static(b"\x16\x03\x01"), Bytes::from_static(b"hello")]);
    }

    #[tokio::test]
    async fn many_headers_still_frame_the_body() {
        let mut head = String::from("POST /search HTTP/1.1\r\n");
        for i in 0..101 {
            head.push_str(&format!("X-Pad-{}: {}\r\n", i, i));
        }
        head.push_str("Content-Length: 8\r\n\r\n");

        let mut reader = Builder::new()
            .read(head.as_bytes())
            .read(b"q=ev")
            .read(b"il!!")
            .build();
        let msgs = drain(&mut http(HttpSide::Request), &mut reader).await;
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].ends_with(b"q=evil!!"));
    }

    #[tokio::test]
    async fn malformed_head_is_held_until_blank_line() {
        let mut reader = Builder::new()
            .read(b"BREW /pot HTCPCP\r\nx: ev")
            .read(b"il\r\n\r\n")
            .read(b"tail")
            .build();
        let msgs = drain(&mut http(HttpSide::Request), &mut reader).await;
        assert_eq!(msgs.len(), 2);
        assert_eq!(&msgs[0][..], b"BREW /pot HTCPCP\r\nx: evil\r\n\r\n");
        assert_eq!(&msgs[1][..], b"tail");
    }
}
