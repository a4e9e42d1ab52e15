//! # Line stream
//!
//! A TCP stream framed by newlines, used by the line binding. Every read is bounded by a timeout so
//! the owning loop can keep checking its shutdown flag.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::{Duration, Instant}
};

use super::Address;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest line accepted before the peer is considered broken.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const READ_CHUNK: usize = 1024;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A newline framed TCP stream.
#[derive(Debug)]
pub struct LineStream {
    stream: TcpStream,

    peer: SocketAddr,

    /// Bytes received but not yet returned as a line
    buf: Vec<u8>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LineStreamError {
    #[error("Could not resolve {0}: {1}")]
    ResolveError(String, io::Error),

    #[error("Could not connect to {0}: {1}")]
    ConnectError(String, io::Error),

    #[error("Could not configure the stream: {0}")]
    ConfigError(io::Error),

    #[error("Could not send a line: {0}")]
    SendError(io::Error),

    #[error("Could not receive a line: {0}")]
    RecvError(io::Error),

    #[error("No complete line was received within {0:?}")]
    Timeout(Duration),

    #[error("The peer closed the connection")]
    Closed,

    #[error("The peer sent a line longer than {} bytes", MAX_LINE_LEN)]
    LineTooLong
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LineStream {
    /// Connect to the given address, trying each resolved socket address in turn.
    ///
    /// Each attempt is bounded by `timeout`.
    pub fn connect(addr: &Address, timeout: Duration) -> Result<Self, LineStreamError> {
        let sock_addrs = addr.resolve()
            .map_err(|e| LineStreamError::ResolveError(addr.to_string(), e))?;

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");

        for sa in sock_addrs {
            match TcpStream::connect_timeout(&sa, timeout) {
                Ok(s) => return Self::from_stream(s),
                Err(e) => last_err = e
            }
        }

        Err(LineStreamError::ConnectError(addr.to_string(), last_err))
    }

    /// Wrap an already connected stream, e.g. one returned by a listener.
    pub fn from_stream(stream: TcpStream) -> Result<Self, LineStreamError> {
        stream.set_nonblocking(false)
            .map_err(|e| LineStreamError::ConfigError(e))?;
        stream.set_nodelay(true)
            .map_err(|e| LineStreamError::ConfigError(e))?;

        let peer = stream.peer_addr()
            .map_err(|e| LineStreamError::ConfigError(e))?;

        Ok(Self {
            stream,
            peer,
            buf: Vec::new()
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Set the timeout of a single read. A zero duration is not allowed by the OS, so it is
    /// rounded up to one millisecond.
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<(), LineStreamError> {
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))
            .map_err(|e| LineStreamError::ConfigError(e))
    }

    pub fn set_write_timeout(&self, timeout: Duration) -> Result<(), LineStreamError> {
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_write_timeout(Some(timeout))
            .map_err(|e| LineStreamError::ConfigError(e))
    }

    /// Clone the underlying stream. Shutting the clone down unblocks any read on this stream.
    pub fn try_clone_stream(&self) -> Result<TcpStream, LineStreamError> {
        self.stream.try_clone()
            .map_err(|e| LineStreamError::ConfigError(e))
    }

    /// Send one line. The newline is appended here.
    pub fn send_line(&mut self, line: &[u8]) -> Result<(), LineStreamError> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line);
        frame.push(b'\n');

        self.stream.write_all(&frame)
            .and_then(|_| self.stream.flush())
            .map_err(|e| LineStreamError::SendError(e))
    }

    /// Receive one line, without its terminator.
    ///
    /// Returns `Ok(None)` if no complete line arrived before the read timeout elapsed. Any partial
    /// line is kept and completed by later calls.
    pub fn recv_line(&mut self) -> Result<Option<Vec<u8>>, LineStreamError> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line))
            }

            if self.buf.len() > MAX_LINE_LEN {
                return Err(LineStreamError::LineTooLong)
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(LineStreamError::Closed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) => match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => return Ok(None),
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(LineStreamError::RecvError(e))
                }
            }
        }
    }

    /// Receive one line, waiting no longer than `timeout` in total.
    pub fn recv_line_within(&mut self, timeout: Duration) -> Result<Vec<u8>, LineStreamError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::from_secs(0) {
                return Err(LineStreamError::Timeout(timeout))
            }

            self.set_read_timeout(remaining)?;

            if let Some(line) = self.recv_line()? {
                return Ok(line)
            }
        }
    }

    /// Shut down both directions of the stream.
    pub fn shutdown(&self) {
        // Fails only if the stream is already closed
        self.stream.shutdown(Shutdown::Both).ok();
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;

        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(line)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;

    fn pair() -> (LineStream, LineStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = Address::from(listener.local_addr().unwrap());

        let client = LineStream::connect(&addr, Duration::from_secs(1)).unwrap();
        let (server, _) = listener.accept().unwrap();

        (client, LineStream::from_stream(server).unwrap())
    }

    #[test]
    fn test_lines_are_framed() {
        let (mut client, mut server) = pair();
        server.set_read_timeout(Duration::from_millis(500)).unwrap();

        client.send_line(b"PING").unwrap();
        client.send_line(b"MODE TELEOP").unwrap();

        assert_eq!(server.recv_line().unwrap(), Some(b"PING".to_vec()));
        assert_eq!(server.recv_line().unwrap(), Some(b"MODE TELEOP".to_vec()));
    }

    #[test]
    fn test_partial_line_and_crlf() {
        let (client, mut server) = pair();
        server.set_read_timeout(Duration::from_millis(100)).unwrap();

        let mut raw = client.try_clone_stream().unwrap();
        raw.write_all(b"RES").unwrap();

        // Incomplete, times out but keeps the bytes
        assert_eq!(server.recv_line().unwrap(), None);

        raw.write_all(b"ET\r\n").unwrap();
        assert_eq!(server.recv_line_within(Duration::from_secs(1)).unwrap(), b"RESET".to_vec());
    }

    #[test]
    fn test_timeout_and_close() {
        let (client, mut server) = pair();

        assert!(matches!(
            server.recv_line_within(Duration::from_millis(50)),
            Err(LineStreamError::Timeout(_))
        ));

        client.shutdown();
        drop(client);

        assert!(matches!(
            server.recv_line_within(Duration::from_secs(1)),
            Err(LineStreamError::Closed)
        ));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop so the port is very likely closed
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let res = LineStream::connect(&Address::new("127.0.0.1", port), Duration::from_millis(200));
        assert!(matches!(res, Err(LineStreamError::ConnectError(..))));
    }
}
