//! Framed TLV messages over one TCP association.

use crate::abort::AbortFlag;
use crate::error::ConnectionError;
use crate::logger::ProtocolLogger;
use byteorder::{BigEndian, ByteOrder};
use bytes::BytesMut;
use codec::{Message, MessageFactory, ProtocolDefinition, Version};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often a blocking read wakes up to poll the abort flag.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct RecvState {
    buf: BytesMut,
    /// Consecutive invalid messages; reset by any valid one.
    invalid_count: usize,
}

/// One TCP association carrying framed TLV messages of one protocol.
///
/// Sends are serialized under a dedicated mutex so that a complete message
/// always appears atomically on the wire, whatever thread sends it. Receives
/// hold their own mutex: one thread at a time may sit in a blocking
/// [`Connection::receive`], concurrently with any number of senders.
///
/// When `auto_error_response` is set, an invalid incoming message is
/// answered with the protocol's canonical error reply. After
/// `max_invalid_msg` consecutive invalid messages (0 = no limit), the
/// connection is closed.
pub struct Connection<P: ProtocolDefinition> {
    protocol: Arc<P>,
    auto_error_response: bool,
    max_invalid_msg: usize,
    stream: TcpStream,
    peer: SocketAddr,
    logger: ProtocolLogger,
    send_lock: Mutex<()>,
    recv: Mutex<RecvState>,
}

impl<P: ProtocolDefinition> Connection<P> {
    /// Connect to `addr` and frame messages of `protocol` on the stream.
    pub fn connect(
        addr: SocketAddr,
        protocol: Arc<P>,
        auto_error_response: bool,
        max_invalid_msg: usize,
        logger: ProtocolLogger,
    ) -> std::io::Result<Self> {
        info!("connecting to {} peer at {addr}", protocol.name());
        let stream = TcpStream::connect(addr)?;
        let conn = Self::from_stream(stream, protocol, auto_error_response, max_invalid_msg, logger)?;
        info!("connected to {} peer at {}", conn.protocol.name(), conn.peer);
        Ok(conn)
    }

    /// Frame messages on an already connected stream (accepted side, tests).
    pub fn from_stream(
        stream: TcpStream,
        protocol: Arc<P>,
        auto_error_response: bool,
        max_invalid_msg: usize,
        logger: ProtocolLogger,
    ) -> std::io::Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {e}");
        }
        // A short read timeout lets blocking receives poll the abort flag.
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
        let peer = stream.peer_addr()?;
        Ok(Connection {
            protocol,
            auto_error_response,
            max_invalid_msg,
            stream,
            peer,
            logger,
            send_lock: Mutex::new(()),
            recv: Mutex::new(RecvState { buf: BytesMut::with_capacity(4096), invalid_count: 0 }),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// The protocol version written in front of every framed message.
    pub fn version(&self) -> Option<Version> {
        self.protocol.syntax().version()
    }

    /// Wrap a body into a message of this connection's protocol version.
    pub fn message(&self, body: P::Body) -> Message<P::Body> {
        Message { version: self.version(), body }
    }

    /// Serialize and send one message, atomically on the wire.
    pub fn send(&self, msg: &Message<P::Body>) -> Result<(), ConnectionError> {
        self.logger.log(msg, &format!("sending message to {}", self.peer));
        let data = msg.to_bytes();
        let _guard = self.send_lock.lock();
        (&self.stream).write_all(&data)?;
        Ok(())
    }

    /// Receive the next valid message.
    ///
    /// Invalid messages are counted, optionally answered with the protocol
    /// error reply, and skipped until a valid one arrives or the limit is
    /// reached.
    pub fn receive(&self, abort: Option<&AbortFlag>) -> Result<Message<P::Body>, ConnectionError> {
        let header_size = if self.version().is_some() { 5 } else { 4 };
        let length_offset = header_size - 2;

        let mut state = self.recv.lock();
        loop {
            // Read the framing header, then exactly the announced body.
            state.buf.clear();
            state.buf.resize(header_size, 0);
            self.read_exact_abortable(&mut state.buf[..], abort)?;

            let length = usize::from(BigEndian::read_u16(&state.buf[length_offset..]));
            state.buf.resize(header_size + length, 0);
            self.read_exact_abortable(&mut state.buf[header_size..], abort)?;

            let frame = state.buf.split().freeze();
            let fact = MessageFactory::new(&frame, self.protocol.syntax());

            match fact.status() {
                Ok(()) => {
                    state.invalid_count = 0;
                    let body = self.protocol.build(&fact)?;
                    let msg = Message { version: fact.protocol_version(), body };
                    self.logger.log(&msg, &format!("received message from {}", self.peer));
                    return Ok(msg);
                }
                Err(err) => {
                    state.invalid_count += 1;
                    debug!("invalid message from {}: {err}", self.peer);

                    if self.auto_error_response {
                        let response = self.message(self.protocol.error_response(&fact));
                        self.send(&response)?;
                    }

                    if self.max_invalid_msg > 0 && state.invalid_count >= self.max_invalid_msg {
                        error!("too many invalid messages from {}, disconnecting", self.peer);
                        let count = state.invalid_count;
                        self.disconnect();
                        return Err(ConnectionError::TooManyInvalidMessages(count));
                    }
                }
            }
        }
    }

    /// Shut down both directions of the stream. Subsequent receives fail
    /// until the connection is re-established.
    pub fn disconnect(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn read_exact_abortable(
        &self,
        mut buf: &mut [u8],
        abort: Option<&AbortFlag>,
    ) -> Result<(), ConnectionError> {
        while !buf.is_empty() {
            if let Some(flag) = abort {
                if flag.is_set() {
                    return Err(ConnectionError::Aborted);
                }
            }
            match (&self.stream).read(buf) {
                Ok(0) => return Err(ConnectionError::Disconnected),
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(ConnectionError::Io(e)),
            }
        }
        Ok(())
    }
}
