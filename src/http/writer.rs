use std::io::{self, ErrorKind, Write};
use std::time::Duration;

use crate::http::response::{Checkpoint, ResponsePlan, Step};
use crate::server::signal::StopSignal;

/// Back-off while a non-blocking socket's send buffer is full.
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

/// How a response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every step ran; the connection may close normally
    Completed,
    /// A close directive fired at this checkpoint; the socket must be dropped
    Aborted(Checkpoint),
    /// The server is stopping; the rest of the plan was skipped
    Stopped,
}

/// Runs a [`ResponsePlan`] against a socket.
///
/// Pauses block the calling thread. Since the event loop is single-threaded,
/// a paused response holds up every other connection. Pauses and write
/// back-offs wait on the server's [`StopSignal`], so a stop cuts them short.
pub struct ResponseWriter {
    steps: Vec<Step>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(plan: ResponsePlan) -> Self {
        Self {
            steps: plan.into_steps(),
            written: 0,
        }
    }

    /// Total bytes handed to the socket so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn execute<W: Write>(&mut self, stream: &mut W, stop: &StopSignal) -> io::Result<Outcome> {
        for step in &self.steps {
            if stop.is_raised() {
                return Ok(Outcome::Stopped);
            }

            match step {
                Step::Pause(checkpoint, delay) => {
                    tracing::debug!(?checkpoint, ?delay, "Pausing response");
                    if stop.wait_timeout(*delay) {
                        return Ok(Outcome::Stopped);
                    }
                }
                Step::Send(bytes) => {
                    let sent = write_fully(stream, bytes, stop)?;
                    self.written += sent;
                    if sent < bytes.len() {
                        return Ok(Outcome::Stopped);
                    }
                }
                Step::Abort(checkpoint) => {
                    stream.flush()?;
                    return Ok(Outcome::Aborted(*checkpoint));
                }
            }
        }

        stream.flush()?;
        Ok(Outcome::Completed)
    }
}

/// `write_all` for non-blocking sockets: waits out `WouldBlock` instead of
/// failing on it, until `stop` is raised.
///
/// Returns the number of bytes written, which is short of `buf.len()` only
/// when the wait was cut short by a stop.
fn write_fully<W: Write>(stream: &mut W, buf: &[u8], stop: &StopSignal) -> io::Result<usize> {
    let mut sent = 0;

    while sent < buf.len() {
        match stream.write(&buf[sent..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "connection closed while writing",
                ));
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if stop.wait_timeout(WOULD_BLOCK_BACKOFF) {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::Directives;

    /// Accepts at most `chunk` bytes per call and reports `WouldBlock` every
    /// other call.
    struct Choppy {
        out: Vec<u8>,
        chunk: usize,
        block_next: bool,
    }

    impl Write for Choppy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.block_next = !self.block_next;
            if !self.block_next {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.chunk);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A peer that never reads: every write would block.
    struct Stuck;

    impl Write for Stuck {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(ErrorKind::WouldBlock.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_fully_survives_would_block() {
        let mut sink = Choppy { out: Vec::new(), chunk: 3, block_next: false };
        let sent = write_fully(&mut sink, b"hello world", &StopSignal::new()).unwrap();
        assert_eq!(sent, 11);
        assert_eq!(sink.out, b"hello world");
    }

    #[test]
    fn write_fully_gives_up_on_stop() {
        let stop = StopSignal::new();
        let raiser = stop.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            raiser.raise();
        });

        assert_eq!(write_fully(&mut Stuck, b"never sent", &stop).unwrap(), 0);
        thread.join().unwrap();
    }

    #[test]
    fn raised_stop_skips_pauses() {
        let directives = Directives {
            sleep_status: Some(Duration::from_secs(30)),
            ..Directives::default()
        };
        let plan = ResponsePlan::build(&directives, "/", "/echo");

        let stop = StopSignal::new();
        stop.raise();

        let started = std::time::Instant::now();
        let mut writer = ResponseWriter::new(plan);
        let mut out = Vec::new();

        assert_eq!(writer.execute(&mut out, &stop).unwrap(), Outcome::Stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(out.is_empty());
    }

    #[test]
    fn execute_reports_bytes_written() {
        let plan = ResponsePlan::build(&Directives::default(), "/echo/abc", "/echo");
        let expected = plan.wire_bytes();

        let mut writer = ResponseWriter::new(plan);
        let mut out = Vec::new();

        assert_eq!(
            writer.execute(&mut out, &StopSignal::new()).unwrap(),
            Outcome::Completed
        );
        assert_eq!(out, expected);
        assert_eq!(writer.written(), expected.len());
    }
}
