use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use crate::http::request::{FieldMap, RequestLine};

/// Query parameter that makes the origin hang up instead of reading a body.
pub const CLOSE_CLIENT_BODY: &str = "close_client_body";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line without a method or a target, or not UTF-8
    InvalidRequestLine,
    /// Header line that is not UTF-8
    InvalidHeader,
    /// `Content-Length` that is not an unsigned integer
    InvalidContentLength,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidRequestLine => f.write_str("invalid request line"),
            ParseError::InvalidHeader => f.write_str("invalid header line"),
            ParseError::InvalidContentLength => f.write_str("invalid Content-Length"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Where request assembly currently stands. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    AwaitingRequestLine,
    AwaitingHeaders,
    AwaitingBody,
    Finished,
}

/// Result of one [`RequestState::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are needed before the next boundary
    Pending,
    /// The request just became complete; respond exactly once
    Complete,
    /// `close_client_body` was requested: hang up without reading the body
    RejectBody,
    /// Already finished earlier; nothing to do
    Idle,
}

/// Per-connection request assembly state.
///
/// Bytes are appended with [`feed`](Self::feed) and consumed by
/// [`advance`](Self::advance) only once they form a complete line or body,
/// so the outcome depends on the accumulated bytes and never on how many
/// reads delivered them.
#[derive(Debug)]
pub struct RequestState {
    buffer: BytesMut,
    phase: Phase,
    request_line: Option<RequestLine>,
    params: FieldMap,
    headers: FieldMap,
    body: Option<Bytes>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestState {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            phase: Phase::AwaitingRequestLine,
            request_line: None,
            params: FieldMap::new(),
            headers: FieldMap::new(),
            body: None,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Moves through as many phases as the buffered bytes allow.
    pub fn advance(&mut self) -> Result<Progress, ParseError> {
        if self.phase == Phase::Finished {
            return Ok(Progress::Idle);
        }

        if self.phase == Phase::AwaitingRequestLine {
            let Some(line) = take_line(&mut self.buffer) else {
                return Ok(Progress::Pending);
            };

            let line = std::str::from_utf8(&line).map_err(|_| ParseError::InvalidRequestLine)?;
            let request_line = RequestLine::parse(line).ok_or(ParseError::InvalidRequestLine)?;

            self.params = request_line.query_params();
            self.request_line = Some(request_line);
            self.phase = Phase::AwaitingHeaders;
        }

        if self.phase == Phase::AwaitingHeaders {
            loop {
                let Some(line) = take_line(&mut self.buffer) else {
                    return Ok(Progress::Pending);
                };

                if line.is_empty() {
                    break;
                }

                let line = std::str::from_utf8(&line).map_err(|_| ParseError::InvalidHeader)?;
                match line.split_once(": ") {
                    Some((name, value)) => self.headers.insert(name, value),
                    None => self.headers.insert(line, ""),
                }
            }

            self.phase = if self.headers.contains_lower("content-length") {
                Phase::AwaitingBody
            } else {
                Phase::Finished
            };
        }

        if self.phase == Phase::AwaitingBody {
            if self.params.contains_lower(CLOSE_CLIENT_BODY) {
                return Ok(Progress::RejectBody);
            }

            let length = self
                .content_length()
                .transpose()?
                .ok_or(ParseError::InvalidContentLength)?;

            if self.buffer.len() < length {
                return Ok(Progress::Pending);
            }

            self.body = Some(self.buffer.split_to(length).freeze());
            self.phase = Phase::Finished;
        }

        Ok(Progress::Complete)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn request_line(&self) -> Option<&RequestLine> {
        self.request_line.as_ref()
    }

    /// Query parameters of the request line; empty until it has parsed.
    pub fn params(&self) -> &FieldMap {
        &self.params
    }

    pub fn headers(&self) -> &FieldMap {
        &self.headers
    }

    /// The request body, present once `Content-Length` bytes arrived.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Declared `Content-Length`, if the header was sent.
    pub fn content_length(&self) -> Option<Result<usize, ParseError>> {
        self.headers.get_lower("content-length").map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength)
        })
    }

    /// Bytes received but not consumed by any phase.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn discard_buffered(&mut self) {
        self.buffer.clear();
    }
}

/// Removes one line from the front of `buf`, without its terminator.
///
/// Accepts `\n` and `\r\n`. Returns `None` (consuming nothing) while the
/// terminator has not arrived.
fn take_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let newline = buf.iter().position(|&b| b == b'\n')?;

    let mut line = buf.split_to(newline);
    buf.advance(1);

    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }

    Some(line)
}
