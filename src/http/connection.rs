use std::io::{self, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr};

use mio::net::TcpStream;

use crate::http::parser::{Phase, Progress, RequestState};
use crate::http::response::{Checkpoint, Directives, ResponsePlan};
use crate::http::writer::{Outcome, ResponseWriter};
use crate::server::signal::StopSignal;

/// What the event loop should do with a connection after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave it registered and wait for more readiness
    Keep,
    /// Deregister and drop it; dropping closes the socket
    Close(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer finished sending (EOF)
    PeerClosed,
    /// A close directive fired
    Fault(Checkpoint),
    /// The request could not be parsed
    Malformed,
    /// The server stopped while the response was in progress
    Stopped,
}

/// One accepted socket and the request being assembled on it.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    state: RequestState,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            state: RequestState::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Handles one readable event.
    ///
    /// Drains the socket into the request buffer, advances the parser and
    /// writes the response the first time the request completes. Errors are
    /// plain I/O errors for the event loop to classify.
    pub fn on_readable(
        &mut self,
        scratch: &mut [u8],
        echo_prefix: &str,
        stop: &StopSignal,
    ) -> io::Result<Disposition> {
        let eof = self.fill(scratch)?;

        if self.state.phase() == Phase::Finished {
            // Response already sent; whatever else arrives is ignored.
            self.state.discard_buffered();
        }

        let progress = match self.state.advance() {
            Ok(progress) => progress,
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Dropping malformed request");
                return Ok(Disposition::Close(CloseReason::Malformed));
            }
        };

        match progress {
            Progress::Pending | Progress::Idle => {}

            Progress::RejectBody => {
                tracing::debug!(peer = %self.peer, "Closing before request body");
                return Ok(Disposition::Close(CloseReason::Fault(
                    Checkpoint::BeforeRequestBody,
                )));
            }

            Progress::Complete => {
                if let Some(reason) = self.respond(echo_prefix, stop)? {
                    return Ok(Disposition::Close(reason));
                }
            }
        }

        if eof {
            return Ok(Disposition::Close(CloseReason::PeerClosed));
        }

        Ok(Disposition::Keep)
    }

    /// Reads until the socket would block. Returns `true` on EOF.
    fn fill(&mut self, scratch: &mut [u8]) -> io::Result<bool> {
        loop {
            match self.stream.read(scratch) {
                Ok(0) => return Ok(true),
                Ok(n) => self.state.feed(&scratch[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn respond(&mut self, echo_prefix: &str, stop: &StopSignal) -> io::Result<Option<CloseReason>> {
        let Some(line) = self.state.request_line() else {
            return Ok(None);
        };

        tracing::debug!(
            peer = %self.peer,
            method = line.method.as_str(),
            target = %line.target,
            body_len = ?self.state.body().map(|b| b.len()),
            "Request received"
        );

        let directives = Directives::from_params(self.state.params());
        let plan = ResponsePlan::build(&directives, &line.path, echo_prefix);

        let mut writer = ResponseWriter::new(plan);
        match writer.execute(&mut self.stream, stop)? {
            Outcome::Aborted(checkpoint) => {
                tracing::debug!(peer = %self.peer, ?checkpoint, sent = writer.written(), "Response aborted");
                Ok(Some(CloseReason::Fault(checkpoint)))
            }
            Outcome::Stopped => {
                tracing::debug!(peer = %self.peer, sent = writer.written(), "Response cut short by stop");
                Ok(Some(CloseReason::Stopped))
            }
            Outcome::Completed => {
                tracing::debug!(
                    peer = %self.peer,
                    status = directives.status(),
                    sent = writer.written(),
                    "Response sent"
                );
                // No keep-alive: signal end of response, wait for the peer's EOF.
                self.stream.shutdown(Shutdown::Write)?;
                Ok(None)
            }
        }
    }
}
