//! One non-blocking HTTP/1.1 exchange.
//!
//! A [`Transfer`] owns a socket for the duration of a single command:
//! connect, send the request, parse the response head, decode the body.
//! [`Transfer::perform`] drives as far as the socket allows and reports
//! either completion or the I/O interest to wait for; the caller owns the
//! waiting.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use mio::net::TcpStream;

use crate::backend::IoEvent;
use crate::error::{Error, Result};

/// What a [`Transfer::perform`] call accomplished.
#[derive(Debug)]
pub(crate) enum Step {
    /// The socket has nothing more to give; wait for this interest.
    Blocked(IoEvent),
    /// The response is fully received.
    Done,
}

/// A request line and everything needed to serialize it.
pub(crate) struct Request {
    pub method: &'static str,
    pub path: String,
    pub host: String,
    /// `Some` sends a Content-Length header, even when zero-length.
    pub body: Option<Bytes>,
}

impl Request {
    /// Serializes head and body into the output buffer.
    pub fn to_bytes(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(
            256 + self.path.len() + self.body.as_ref().map_or(0, Bytes::len),
        );
        out.put_slice(self.method.as_bytes());
        out.put_u8(b' ');
        out.put_slice(self.path.as_bytes());
        out.put_slice(b" HTTP/1.1\r\nHost: ");
        out.put_slice(self.host.as_bytes());
        out.put_slice(b"\r\nConnection: close\r\n");
        if let Some(body) = &self.body {
            out.put_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        out.put_slice(b"\r\n");
        if let Some(body) = &self.body {
            out.put_slice(body);
        }
        out
    }
}

enum State {
    Connecting,
    Sending,
    ReceivingHead,
    ReceivingBody,
    Complete,
}

/// How the response body is delimited.
enum BodyFraming {
    Length(usize),
    Chunked(ChunkDecoder),
    /// Delimited by the server closing the connection (we ask for
    /// `Connection: close`).
    Eof,
}

pub(crate) struct Transfer {
    stream: TcpStream,
    state: State,
    out: BytesMut,
    raw: BytesMut,
    status: u16,
    framing: Option<BodyFraming>,
    body: BytesMut,
}

impl Transfer {
    /// Resolves the server and starts a non-blocking connect.
    pub fn start(server: &str, port: u16, request: &Request) -> Result<Self> {
        let addr: SocketAddr = (server, port)
            .to_socket_addrs()
            .map_err(Error::from)?
            .next()
            .ok_or_else(|| {
                Error::Server(format!("could not resolve {server}:{port}"))
            })?;
        let stream = TcpStream::connect(addr).map_err(Error::from)?;
        Ok(Transfer {
            stream,
            state: State::Connecting,
            out: request.to_bytes(),
            raw: BytesMut::new(),
            status: 0,
            framing: None,
            body: BytesMut::new(),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drives the exchange until it completes or the socket would block.
    pub fn perform(&mut self) -> Result<Step> {
        loop {
            match self.state {
                State::Connecting => match self.check_connected()? {
                    true => self.state = State::Sending,
                    false => return Ok(Step::Blocked(IoEvent::WRITE)),
                },
                State::Sending => {
                    while !self.out.is_empty() {
                        match self.stream.write(&self.out) {
                            Ok(0) => {
                                return Err(Error::Server(
                                    "connection closed while sending".into(),
                                ));
                            },
                            Ok(n) => self.out.advance(n),
                            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                                return Ok(Step::Blocked(IoEvent::WRITE));
                            },
                            Err(e) if e.kind() == ErrorKind::Interrupted => {},
                            Err(e) => return Err(e.into()),
                        }
                    }
                    self.state = State::ReceivingHead;
                },
                State::ReceivingHead => {
                    match self.fill()? {
                        Filled::Data => {},
                        Filled::WouldBlock => {
                            return Ok(Step::Blocked(IoEvent::READ));
                        },
                        Filled::Eof => {
                            return Err(Error::Server(
                                "connection closed before response head"
                                    .into(),
                            ));
                        },
                    }
                    if self.parse_head()? {
                        self.state = State::ReceivingBody;
                        self.decode_body(false)?;
                    }
                },
                State::ReceivingBody => {
                    match self.fill()? {
                        Filled::Data => self.decode_body(false)?,
                        Filled::WouldBlock => {
                            return Ok(Step::Blocked(IoEvent::READ));
                        },
                        Filled::Eof => self.decode_body(true)?,
                    }
                },
                State::Complete => return Ok(Step::Done),
            }
        }
    }

    /// A non-blocking connect has finished once the socket reports a peer;
    /// a connect failure parks itself in SO_ERROR.
    fn check_connected(&mut self) -> Result<bool> {
        if let Some(e) = self.stream.take_error().map_err(Error::from)? {
            return Err(e.into());
        }
        match self.stream.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(false),
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
                Ok(false)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Reads once into the raw buffer.
    fn fill(&mut self) -> Result<Filled> {
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(Filled::Eof),
                Ok(n) => {
                    self.raw.extend_from_slice(&buf[..n]);
                    return Ok(Filled::Data);
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(Filled::WouldBlock);
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Attempts to parse the response head out of the raw buffer. True
    /// once the head is complete and the framing decided.
    fn parse_head(&mut self) -> Result<bool> {
        let (consumed, status, framing) = {
            let mut headers = [httparse::EMPTY_HEADER; 32];
            let mut response = httparse::Response::new(&mut headers);
            match response.parse(&self.raw) {
                Ok(httparse::Status::Partial) => return Ok(false),
                Ok(httparse::Status::Complete(n)) => {
                    let status = response.code.unwrap_or(0);
                    let mut framing = BodyFraming::Eof;
                    for header in response.headers.iter() {
                        if header.name.eq_ignore_ascii_case("content-length")
                        {
                            let text = std::str::from_utf8(header.value)
                                .map_err(bad_head)?;
                            let len = text
                                .trim()
                                .parse::<usize>()
                                .map_err(bad_head)?;
                            framing = BodyFraming::Length(len);
                        } else if header
                            .name
                            .eq_ignore_ascii_case("transfer-encoding")
                            && std::str::from_utf8(header.value)
                                .map_err(bad_head)?
                                .to_ascii_lowercase()
                                .contains("chunked")
                        {
                            framing =
                                BodyFraming::Chunked(ChunkDecoder::new());
                        }
                    }
                    // These statuses never carry a body.
                    if status == 204 || status == 304 {
                        framing = BodyFraming::Length(0);
                    }
                    (n, status, framing)
                },
                Err(e) => {
                    return Err(Error::Server(format!(
                        "malformed response head: {e}"
                    )));
                },
            }
        };
        self.raw.advance(consumed);
        self.status = status;
        self.framing = Some(framing);
        Ok(true)
    }

    /// Moves decoded body bytes out of the raw buffer; `eof` marks the
    /// server having closed the connection.
    fn decode_body(&mut self, eof: bool) -> Result<()> {
        // Panic safety: only called in ReceivingBody, after parse_head.
        let framing = self.framing.as_mut().unwrap();
        match framing {
            BodyFraming::Length(remaining) => {
                let take = (*remaining).min(self.raw.len());
                self.body.extend_from_slice(&self.raw[..take]);
                self.raw.advance(take);
                *remaining -= take;
                if *remaining == 0 {
                    self.state = State::Complete;
                } else if eof {
                    return Err(Error::Server("truncated response".into()));
                }
            },
            BodyFraming::Chunked(decoder) => {
                if decoder.decode(&mut self.raw, &mut self.body)? {
                    self.state = State::Complete;
                } else if eof {
                    return Err(Error::Server("truncated response".into()));
                }
            },
            BodyFraming::Eof => {
                self.body.extend_from_slice(&self.raw);
                self.raw.clear();
                if eof {
                    self.state = State::Complete;
                }
            },
        }
        Ok(())
    }
}

fn bad_head<E>(_: E) -> Error {
    Error::Server("malformed response head".into())
}

enum Filled {
    Data,
    WouldBlock,
    Eof,
}

enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailers,
    Done,
}

/// Decoder for `Transfer-Encoding: chunked` bodies.
struct ChunkDecoder {
    state: ChunkState,
}

impl ChunkDecoder {
    fn new() -> Self {
        ChunkDecoder { state: ChunkState::Size }
    }

    /// Consumes as much of `raw` as possible into `out`. True once the
    /// terminal chunk and trailers have been seen.
    fn decode(&mut self, raw: &mut BytesMut, out: &mut BytesMut) -> Result<bool> {
        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(line_end) = find_crlf(raw) else {
                        return Ok(false);
                    };
                    let line = std::str::from_utf8(&raw[..line_end])
                        .map_err(bad_chunk)?;
                    let size_text =
                        line.split(';').next().unwrap_or("").trim();
                    let size = usize::from_str_radix(size_text, 16)
                        .map_err(bad_chunk)?;
                    raw.advance(line_end + 2);
                    self.state = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(size)
                    };
                },
                ChunkState::Data(remaining) => {
                    let take = remaining.min(raw.len());
                    out.extend_from_slice(&raw[..take]);
                    raw.advance(take);
                    if take == remaining {
                        self.state = ChunkState::DataEnd;
                    } else {
                        self.state = ChunkState::Data(remaining - take);
                        return Ok(false);
                    }
                },
                ChunkState::DataEnd => {
                    if raw.len() < 2 {
                        return Ok(false);
                    }
                    if &raw[..2] != b"\r\n" {
                        return Err(Error::Server(
                            "malformed chunked encoding".into(),
                        ));
                    }
                    raw.advance(2);
                    self.state = ChunkState::Size;
                },
                ChunkState::Trailers => {
                    let Some(line_end) = find_crlf(raw) else {
                        return Ok(false);
                    };
                    let empty = line_end == 0;
                    raw.advance(line_end + 2);
                    if empty {
                        self.state = ChunkState::Done;
                    }
                },
                ChunkState::Done => return Ok(true),
            }
        }
    }
}

fn bad_chunk<E>(_: E) -> Error {
    Error::Server("malformed chunked encoding".into())
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request {
            method: "PUT",
            path: "/v1.0/a/q/m1?ttl=100".into(),
            host: "burrow.example:8080".into(),
            body: Some(Bytes::from_static(b"hello")),
        };
        assert_eq!(
            req.to_bytes().as_ref(),
            b"PUT /v1.0/a/q/m1?ttl=100 HTTP/1.1\r\n\
              Host: burrow.example:8080\r\n\
              Connection: close\r\n\
              Content-Length: 5\r\n\
              \r\n\
              hello" as &[u8]
        );
    }

    #[test]
    fn bodyless_request_has_no_length_header() {
        let req = Request {
            method: "GET",
            path: "/v1.0".into(),
            host: "h:1".into(),
            body: None,
        };
        let bytes = req.to_bytes();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn empty_post_sends_zero_length() {
        let req = Request {
            method: "POST",
            path: "/v1.0/a/q".into(),
            host: "h:1".into(),
            body: Some(Bytes::new()),
        };
        let bytes = req.to_bytes();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn chunked_decoding_across_splits() {
        let mut decoder = ChunkDecoder::new();
        let mut out = BytesMut::new();

        let mut raw = BytesMut::from(&b"5\r\nhel"[..]);
        assert!(!decoder.decode(&mut raw, &mut out).unwrap());
        raw.extend_from_slice(b"lo\r\n6;ext=1\r\n world\r\n0\r\n");
        assert!(!decoder.decode(&mut raw, &mut out).unwrap());
        raw.extend_from_slice(b"\r\n");
        assert!(decoder.decode(&mut raw, &mut out).unwrap());
        assert_eq!(out.as_ref(), b"hello world");
    }

    #[test]
    fn chunked_decoding_rejects_garbage() {
        let mut decoder = ChunkDecoder::new();
        let mut out = BytesMut::new();
        let mut raw = BytesMut::from(&b"zz\r\n"[..]);
        assert!(decoder.decode(&mut raw, &mut out).is_err());
    }
}
