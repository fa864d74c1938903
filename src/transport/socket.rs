use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::{
    ConnectOptions, Connection, Deadline, Endpoint, ResponseHead, Scheme, TransportConnector,
    classify_io_error, resolve_endpoint,
};
use crate::error::{TimeoutPhase, TransportError};
use crate::executor::WireRequest;

const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Plaintext HTTP/1.1 over `std::net::TcpStream`, one connection per attempt.
#[derive(Clone, Debug, Default)]
pub struct SocketTransport {
    connect_timeout: Option<Duration>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the connect phase below the attempt deadline.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }
}

impl TransportConnector for SocketTransport {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn connect(
        &self,
        endpoint: &Endpoint,
        _options: &ConnectOptions,
        deadline: Deadline,
    ) -> Result<Box<dyn Connection>, TransportError> {
        if endpoint.scheme == Scheme::Https {
            return Err(TransportError::other(
                "socket transport only speaks plaintext http; use the platform transport for https",
            ));
        }

        let mut last_error = None;
        for address in resolve_endpoint(endpoint)? {
            let mut budget = deadline.check(TimeoutPhase::Connect)?;
            if let Some(connect_timeout) = self.connect_timeout {
                budget = budget.min(connect_timeout);
            }
            match TcpStream::connect_timeout(&address, budget) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    debug!(%address, "socket connected");
                    return Ok(Box::new(SocketConnection::new(stream, endpoint.clone())));
                }
                Err(error) => {
                    last_error = Some(classify_io_error(
                        &error,
                        endpoint,
                        TimeoutPhase::Connect,
                        deadline,
                    ));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TransportError::NameResolutionFailed {
            host: endpoint.host.clone(),
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyFraming {
    Pending,
    Empty,
    Length(u64),
    Chunked { remaining: u64 },
    UntilClose,
    Finished,
}

/// Reads are armed with the attempt's remaining budget. Bytes read past the
/// response head stay in `buffered` and are handed out before the socket is
/// read again.
struct SocketConnection {
    stream: TcpStream,
    buffered: Vec<u8>,
    endpoint: Endpoint,
    framing: BodyFraming,
}

impl SocketConnection {
    fn new(stream: TcpStream, endpoint: Endpoint) -> Self {
        Self {
            stream,
            buffered: Vec::new(),
            endpoint,
            framing: BodyFraming::Pending,
        }
    }

    fn read_socket(
        &mut self,
        buf: &mut [u8],
        deadline: Deadline,
        phase: TimeoutPhase,
    ) -> Result<usize, TransportError> {
        let remaining = deadline.check(phase)?;
        self.stream
            .set_read_timeout(Some(remaining))
            .map_err(|error| classify_io_error(&error, &self.endpoint, phase, deadline))?;
        self.stream
            .read(buf)
            .map_err(|error| classify_io_error(&error, &self.endpoint, phase, deadline))
    }

    /// Appends the next socket read to `buffered`.
    fn fill(&mut self, deadline: Deadline, phase: TimeoutPhase) -> Result<(), TransportError> {
        if self.buffered.len() > MAX_HEAD_BYTES {
            return Err(TransportError::malformed(format!("{phase} exceeds {MAX_HEAD_BYTES} bytes")));
        }
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        let read = self.read_socket(&mut chunk, deadline, phase)?;
        if read == 0 {
            return Err(TransportError::malformed(format!(
                "connection closed while reading {phase}"
            )));
        }
        self.buffered.extend_from_slice(&chunk[..read]);
        Ok(())
    }

    /// Body bytes, drained from `buffered` first.
    fn read_raw(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize, TransportError> {
        if self.buffered.is_empty() {
            return self.read_socket(buf, deadline, TimeoutPhase::ResponseBody);
        }
        let taken = self.buffered.len().min(buf.len());
        buf[..taken].copy_from_slice(&self.buffered[..taken]);
        self.buffered.drain(..taken);
        Ok(taken)
    }

    fn next_chunk_size(&mut self, deadline: Deadline) -> Result<u64, TransportError> {
        loop {
            match httparse::parse_chunk_size(&self.buffered) {
                Ok(httparse::Status::Complete((consumed, size))) => {
                    self.buffered.drain(..consumed);
                    return Ok(size);
                }
                Ok(httparse::Status::Partial) => self.fill(deadline, TimeoutPhase::ResponseBody)?,
                Err(_) => return Err(TransportError::malformed("invalid chunk size")),
            }
        }
    }

    fn expect_chunk_terminator(&mut self, deadline: Deadline) -> Result<(), TransportError> {
        while self.buffered.len() < 2 {
            self.fill(deadline, TimeoutPhase::ResponseBody)?;
        }
        if !self.buffered.starts_with(b"\r\n") {
            return Err(TransportError::malformed("chunk missing terminator"));
        }
        self.buffered.drain(..2);
        Ok(())
    }

    fn skip_trailers(&mut self, deadline: Deadline) -> Result<(), TransportError> {
        loop {
            let parsed = {
                let mut trailers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                match httparse::parse_headers(&self.buffered, &mut trailers) {
                    Ok(httparse::Status::Complete((consumed, _))) => Some(consumed),
                    Ok(httparse::Status::Partial) => None,
                    Err(error) => {
                        return Err(TransportError::malformed(format!("invalid trailer: {error}")));
                    }
                }
            };
            match parsed {
                Some(consumed) => {
                    self.buffered.drain(..consumed);
                    return Ok(());
                }
                None => self.fill(deadline, TimeoutPhase::ResponseBody)?,
            }
        }
    }
}

impl Connection for SocketConnection {
    fn send(&mut self, request: &WireRequest, deadline: Deadline) -> Result<(), TransportError> {
        let remaining = deadline.check(TimeoutPhase::Send)?;
        let endpoint = &self.endpoint;
        let stream = &mut self.stream;
        let classify = |error: std::io::Error| {
            classify_io_error(&error, endpoint, TimeoutPhase::Send, deadline)
        };

        stream.set_write_timeout(Some(remaining)).map_err(classify)?;
        stream.write_all(&request.encode_head()).map_err(classify)?;
        if !request.body.is_empty() {
            stream.write_all(&request.body).map_err(classify)?;
        }
        stream.flush().map_err(classify)
    }

    fn receive_head(&mut self, deadline: Deadline) -> Result<ResponseHead, TransportError> {
        loop {
            let Some((consumed, head)) = parse_head(&self.buffered)? else {
                self.fill(deadline, TimeoutPhase::ResponseHead)?;
                continue;
            };
            self.buffered.drain(..consumed);

            // interim 1xx responses precede the real one
            if (100..200).contains(&head.status) && head.status != 101 {
                continue;
            }

            self.framing = body_framing(head.status, &head.headers)?;
            return Ok(head);
        }
    }

    fn read_body(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.framing {
                BodyFraming::Pending => {
                    return Err(TransportError::other(
                        "response body read before response head",
                    ));
                }
                BodyFraming::Empty | BodyFraming::Finished | BodyFraming::Length(0) => {
                    self.framing = BodyFraming::Finished;
                    return Ok(0);
                }
                BodyFraming::Length(remaining) => {
                    let limit = clamp_to_buffer(remaining, buf.len());
                    let read = self.read_raw(&mut buf[..limit], deadline)?;
                    if read == 0 {
                        return Err(TransportError::malformed(format!(
                            "connection closed with {remaining} body bytes outstanding"
                        )));
                    }
                    self.framing = BodyFraming::Length(remaining - read as u64);
                    return Ok(read);
                }
                BodyFraming::UntilClose => {
                    let read = self.read_raw(buf, deadline)?;
                    if read == 0 {
                        self.framing = BodyFraming::Finished;
                    }
                    return Ok(read);
                }
                BodyFraming::Chunked { remaining: 0 } => {
                    let size = self.next_chunk_size(deadline)?;
                    if size == 0 {
                        self.skip_trailers(deadline)?;
                        self.framing = BodyFraming::Finished;
                        return Ok(0);
                    }
                    self.framing = BodyFraming::Chunked { remaining: size };
                }
                BodyFraming::Chunked { remaining } => {
                    let limit = clamp_to_buffer(remaining, buf.len());
                    let read = self.read_raw(&mut buf[..limit], deadline)?;
                    if read == 0 {
                        return Err(TransportError::malformed(
                            "connection closed inside a chunk",
                        ));
                    }
                    let left = remaining - read as u64;
                    if left == 0 {
                        self.expect_chunk_terminator(deadline)?;
                    }
                    self.framing = BodyFraming::Chunked { remaining: left };
                    return Ok(read);
                }
            }
        }
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn clamp_to_buffer(remaining: u64, buffer_len: usize) -> usize {
    usize::try_from(remaining).map_or(buffer_len, |remaining| remaining.min(buffer_len))
}

/// `Ok(None)` until `buffer` holds a complete status line and header block.
fn parse_head(buffer: &[u8]) -> Result<Option<(usize, ResponseHead)>, TransportError> {
    let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut header_slots);
    let consumed = match response.parse(buffer) {
        Ok(httparse::Status::Complete(consumed)) => consumed,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(error) => {
            return Err(TransportError::malformed(format!("invalid response head: {error}")));
        }
    };
    let status = response
        .code
        .ok_or_else(|| TransportError::malformed("response head without status code"))?;

    let mut headers = HeaderMap::with_capacity(response.headers.len());
    for header in response.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|error| TransportError::malformed(format!("invalid header name: {error}")))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|error| TransportError::malformed(format!("invalid header value: {error}")))?;
        headers.append(name, value);
    }
    Ok(Some((consumed, ResponseHead { status, headers })))
}

fn body_framing(status: u16, headers: &HeaderMap) -> Result<BodyFraming, TransportError> {
    if status == 204 || status == 304 || (100..200).contains(&status) {
        return Ok(BodyFraming::Empty);
    }

    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        return Ok(BodyFraming::Chunked { remaining: 0 });
    }

    match headers.get(CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(BodyFraming::Length)
            .ok_or_else(|| TransportError::malformed("invalid content-length")),
        None => Ok(BodyFraming::UntilClose),
    }
}
