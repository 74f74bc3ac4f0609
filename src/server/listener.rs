use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::http::connection::{Connection, Disposition};
use crate::server::signal::StopSignal;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

/// Single-threaded, readiness-driven origin server.
///
/// Owns the listening socket and every live [`Connection`]. Nothing outside
/// the thread running [`Server::run`] touches the connection map, so no
/// locking is involved. Response delays run inside dispatch and therefore
/// stall all other connections for their duration, unless a stop cuts them
/// short.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    scratch: Vec<u8>,
    echo_prefix: String,
    max_events: usize,
    waker: Arc<Waker>,
    stop: StopSignal,
}

/// Asks a running [`Server`] to stop. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct StopHandle {
    waker: Arc<Waker>,
    signal: StopSignal,
}

impl StopHandle {
    /// Interrupts any response pause in progress and wakes the loop, which
    /// then closes every remaining connection and exits.
    pub fn stop(&self) -> io::Result<()> {
        self.signal.raise();
        self.waker.wake()
    }
}

/// A server running on its own thread. Dropping the handle stops it.
pub struct ServerHandle {
    addr: SocketAddr,
    stop: StopHandle,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Whether the server thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops the server and waits for its thread.
    pub fn stop(mut self) -> anyhow::Result<()> {
        self.shutdown()
    }

    /// Waits for the server to exit on its own (or via a [`StopHandle`]).
    pub fn wait(mut self) -> anyhow::Result<()> {
        match self.thread.take() {
            Some(thread) => join(thread),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.stop.stop().context("Failed to wake server loop")?;
        join(thread)
    }
}

fn join(thread: JoinHandle<anyhow::Result<()>>) -> anyhow::Result<()> {
    match thread.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Server thread panicked"),
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Server did not stop cleanly");
        }
    }
}

impl Server {
    /// Binds the listening socket and prepares the poller.
    pub fn bind(cfg: &Config) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", cfg.listen_addr))?;

        let poll = Poll::new().context("Failed to create poller")?;
        let mut listener = TcpListener::bind(addr)
            .with_context(|| format!("Failed to bind {}", addr))?;

        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("Failed to register listener")?;

        let waker = Waker::new(poll.registry(), WAKER).context("Failed to create waker")?;

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            scratch: vec![0; cfg.read_buffer_size.max(1)],
            echo_prefix: cfg.echo_prefix.clone(),
            max_events: cfg.max_events.max(1),
            waker: Arc::new(waker),
            stop: StopSignal::new(),
        })
    }

    /// The bound address; useful after binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            waker: Arc::clone(&self.waker),
            signal: self.stop.clone(),
        }
    }

    /// Runs the loop on a new thread.
    pub fn spawn(self) -> anyhow::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let stop = self.stop_handle();

        let thread = std::thread::Builder::new()
            .name("faultline-server".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn server thread")?;

        Ok(ServerHandle {
            addr,
            stop,
            thread: Some(thread),
        })
    }

    /// Blocks on readiness and dispatches until stopped.
    pub fn run(mut self) -> anyhow::Result<()> {
        let mut events = Events::with_capacity(self.max_events);
        info!("Listening on {}", self.local_addr()?);

        while !self.stop.is_raised() {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("Readiness wait failed");
            }

            for event in events.iter() {
                if self.stop.is_raised() {
                    break;
                }

                match event.token() {
                    LISTENER => self.accept_pending(),
                    WAKER => {}
                    token => self.dispatch(token),
                }
            }
        }

        info!(abandoned = self.connections.len(), "Server stopped");
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.remove(token);
        }

        Ok(())
    }

    /// Accepts every queued connection; readiness is edge-triggered.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                    {
                        error!(%peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    debug!(%peer, ?token, "Accepted connection");
                    self.connections.insert(token, Connection::new(stream, peer));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match conn.on_readable(&mut self.scratch, &self.echo_prefix, &self.stop) {
            Ok(Disposition::Keep) => {}
            Ok(Disposition::Close(reason)) => {
                debug!(peer = %conn.peer(), ?token, ?reason, "Closing connection");
                self.remove(token);
            }
            Err(e) if is_disconnect(&e) => {
                debug!(peer = %conn.peer(), ?token, error = %e, "Peer went away");
                self.remove(token);
            }
            Err(e) => {
                error!(peer = %conn.peer(), ?token, error = %e, "Connection error");
                self.remove(token);
            }
        }
    }

    /// Drops a connection; dropping the stream closes the socket.
    fn remove(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                debug!(peer = %conn.peer(), ?token, error = %e, "Deregister failed");
            }
        }
    }
}

/// Errors that mean the peer hung up, which half-close scenarios produce on
/// purpose.
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::WriteZero
    )
}

