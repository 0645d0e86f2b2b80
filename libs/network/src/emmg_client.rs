//! EMMG/PDG client: one TCP association with a MUX, plus an optional UDP
//! data path.

use crate::abort::AbortFlag;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::logger::ProtocolLogger;
use codec::{ChannelHeader, Serializer, StreamHeader, Tag};
use parking_lot::{Condvar, Mutex};
use protocols::emmgmux;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// How long a synchronous request waits for its response.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// TCP address of the MUX.
    pub mux: SocketAddr,
    /// When set, data_provision goes over UDP to this address (an
    /// unspecified IP is replaced by the MUX address). The TCP association
    /// stays up and its health is still required.
    pub udp: Option<SocketAddr>,
    pub client_id: u32,
    pub data_channel_id: u16,
    pub data_stream_id: u16,
    pub data_id: u16,
    pub data_type: u8,
    /// True to deliver section bytes, false for TS packets.
    pub section_format: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Destructing,
}

struct State {
    phase: Phase,
    connection: Option<Arc<Connection<emmgmux::Protocol>>>,
    abort: AbortFlag,
    udp_socket: Option<UdpSocket>,
    udp_address: Option<SocketAddr>,
    logger: ProtocolLogger,
    /// Tag of the last response observed by the receiver; 0 = none pending.
    last_response: Tag,
    allocated_bw: u16,
    error_status: Vec<u16>,
    error_info: Vec<u16>,
    /// Cached reply to channel_test.
    channel_status: emmgmux::ChannelStatus,
    /// Cached reply to stream_test.
    stream_status: emmgmux::StreamStatus,
    total_bytes: u64,
}

struct Shared {
    state: Mutex<State>,
    /// Signals the receiver thread that a connection is to be managed or
    /// that the client is being destroyed.
    work_to_do: Condvar,
    /// Signals synchronous waiters that a response arrived.
    got_response: Condvar,
}

/// The EMMG/PDG side of the EMMG/PDG <=> MUX protocol.
///
/// One receiver thread per client handles incoming messages: keep-alive
/// `channel_test` / `stream_test` are answered automatically from the cached
/// status messages, bandwidth allocations and error reports are stored for
/// later queries, and everything that answers a pending request signals the
/// synchronous waiter.
pub struct EmmgClient {
    protocol: Arc<emmgmux::Protocol>,
    shared: Arc<Shared>,
    receiver: Option<JoinHandle<()>>,
    response_timeout: Duration,
}

impl EmmgClient {
    pub fn new(protocol: emmgmux::Protocol) -> Self {
        EmmgClient {
            protocol: Arc::new(protocol),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    phase: Phase::Initial,
                    connection: None,
                    abort: AbortFlag::new(),
                    udp_socket: None,
                    udp_address: None,
                    logger: ProtocolLogger::default(),
                    last_response: 0,
                    allocated_bw: 0,
                    error_status: Vec::new(),
                    error_info: Vec::new(),
                    channel_status: emmgmux::ChannelStatus::default(),
                    stream_status: emmgmux::StreamStatus::default(),
                    total_bytes: 0,
                }),
                work_to_do: Condvar::new(),
                got_response: Condvar::new(),
            }),
            receiver: None,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Shorten the synchronous response timeout (tests).
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().phase == Phase::Connected
    }

    /// Cumulative datagram bytes handed to data_provision.
    pub fn total_bytes(&self) -> u64 {
        self.shared.state.lock().total_bytes
    }

    /// The last bandwidth allocated by the MUX, in kbit/s.
    pub fn allocated_bandwidth(&self) -> u16 {
        self.shared.state.lock().allocated_bw
    }

    /// The error_status / error_information of the last channel_error or
    /// stream_error received from the MUX.
    pub fn get_last_error_response(&self) -> (Vec<u16>, Vec<u16>) {
        let state = self.shared.state.lock();
        (state.error_status.clone(), state.error_info.clone())
    }

    /// Connect to the MUX and negotiate the data channel and stream:
    /// channel_setup, await channel_status, stream_setup, await
    /// stream_status. On success the client is CONNECTED.
    pub fn connect(&mut self, config: &ConnectConfig, logger: ProtocolLogger) -> Result<(), ClientError> {
        // State check, receiver bring-up on first use.
        {
            let mut state = self.shared.state.lock();
            if state.phase == Phase::Initial {
                state.phase = Phase::Disconnected;
                drop(state);
                let shared = Arc::clone(&self.shared);
                self.receiver =
                    Some(thread::Builder::new().name("emmg-client-recv".into()).spawn(move || {
                        receiver_main(&shared);
                    })?);
            } else if state.phase != Phase::Disconnected {
                return Err(ClientError::AlreadyConnected);
            }
        }

        // TCP connection to the MUX.
        let connection = Arc::new(Connection::connect(
            config.mux,
            Arc::clone(&self.protocol),
            true,
            3,
            logger.clone(),
        )?);

        // UDP data path when requested.
        let udp_address = config.udp.map(|addr| {
            if addr.ip().is_unspecified() {
                SocketAddr::new(config.mux.ip(), addr.port())
            } else {
                addr
            }
        });
        let udp_socket = match udp_address {
            Some(addr) => {
                let local: SocketAddr = match addr {
                    SocketAddr::V4(_) => (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into(),
                    SocketAddr::V6(_) => (IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0).into(),
                };
                let socket = UdpSocket::bind(local)?;
                if let IpAddr::V4(ip) = addr.ip() {
                    if ip.is_broadcast() {
                        socket.set_broadcast(true)?;
                    }
                }
                Some(socket)
            }
            None => None,
        };

        {
            let mut state = self.shared.state.lock();
            state.abort = AbortFlag::new();
            state.logger = logger;
            state.connection = Some(Arc::clone(&connection));
            state.udp_address = udp_address;
            state.udp_socket = udp_socket;

            // Automatic response to channel_test. The on-wire flag is the
            // inverse of the section_format notion.
            state.channel_status = emmgmux::ChannelStatus {
                channel: ChannelHeader::new(config.data_channel_id),
                client_id: config.client_id,
                section_tspkt_flag: !config.section_format,
            };
            // Automatic response to stream_test.
            state.stream_status = emmgmux::StreamStatus {
                stream: StreamHeader::new(config.data_channel_id, config.data_stream_id),
                client_id: config.client_id,
                data_id: config.data_id,
                data_type: config.data_type,
            };
            state.last_response = 0;
        }

        // channel_setup, then hand the connection to the receiver thread.
        let channel_setup = connection.message(emmgmux::Body::ChannelSetup(emmgmux::ChannelSetup {
            channel: ChannelHeader::new(config.data_channel_id),
            client_id: config.client_id,
            section_tspkt_flag: !config.section_format,
        }));
        if connection.send(&channel_setup).is_err() {
            return self.abort_connection("MUX channel_setup send failed");
        }
        {
            let mut state = self.shared.state.lock();
            state.phase = Phase::Connecting;
            self.shared.work_to_do.notify_one();
        }

        match self.wait_response() {
            0 => return self.abort_connection("MUX channel_setup response timeout"),
            emmgmux::tags::CHANNEL_STATUS => {}
            other => {
                error!("unexpected response 0x{other:04X} from MUX (expected channel_status)");
                return self.abort_connection("");
            }
        }

        self.cleanup_response();

        // stream_setup.
        let stream_setup = connection.message(emmgmux::Body::StreamSetup(emmgmux::StreamSetup {
            stream: StreamHeader::new(config.data_channel_id, config.data_stream_id),
            client_id: config.client_id,
            data_id: config.data_id,
            data_type: config.data_type,
        }));
        if connection.send(&stream_setup).is_err() {
            return self.abort_connection("MUX stream_setup send failed");
        }

        match self.wait_response() {
            0 => return self.abort_connection("MUX stream_setup response timeout"),
            emmgmux::tags::STREAM_STATUS => {}
            other => {
                error!("unexpected response 0x{other:04X} from MUX (expected stream_status)");
                return self.abort_connection("");
            }
        }

        // Data stream established.
        let mut state = self.shared.state.lock();
        state.total_bytes = 0;
        state.phase = Phase::Connected;
        Ok(())
    }

    /// Politely close the stream and the channel, then drop the TCP
    /// association.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        let previous = {
            let mut state = self.shared.state.lock();
            let previous = state.phase;
            if previous == Phase::Connecting || previous == Phase::Connected {
                state.phase = Phase::Disconnecting;
            }
            previous
        };

        let mut result = Ok(());
        if previous == Phase::Connected {
            self.cleanup_response();

            let (connection, close_request) = {
                let state = self.shared.state.lock();
                let connection = state.connection.clone();
                let close_request = emmgmux::Body::StreamCloseRequest(emmgmux::StreamCloseRequest {
                    stream: state.stream_status.stream,
                    client_id: state.stream_status.client_id,
                });
                (connection, close_request)
            };

            if let Some(connection) = connection {
                result = connection
                    .send(&connection.message(close_request))
                    .map_err(ClientError::from)
                    .and_then(|()| match self.wait_response() {
                        emmgmux::tags::STREAM_CLOSE_RESPONSE => Ok(()),
                        0 => Err(ClientError::Timeout("stream_close_request")),
                        got => {
                            Err(ClientError::UnexpectedResponse { expected: "stream_close_response", got })
                        }
                    });

                if result.is_ok() {
                    let channel_close = {
                        let state = self.shared.state.lock();
                        emmgmux::Body::ChannelClose(emmgmux::ChannelClose {
                            channel: ChannelHeader::new(state.channel_status.channel.channel_id),
                            client_id: state.channel_status.client_id,
                        })
                    };
                    result =
                        connection.send(&connection.message(channel_close)).map_err(ClientError::from);
                }
            }
        }

        // TCP teardown.
        let mut state = self.shared.state.lock();
        if previous == Phase::Connecting || previous == Phase::Connected {
            state.phase = Phase::Disconnected;
            if let Some(connection) = state.connection.take() {
                connection.disconnect();
            }
            self.shared.work_to_do.notify_one();
        }
        state.udp_socket = None;
        state.udp_address = None;
        result
    }

    /// Request bandwidth for the data stream. In synchronous mode, waits for
    /// the stream_BW_allocation (then available via
    /// [`EmmgClient::allocated_bandwidth`]).
    pub fn request_bandwidth(&self, bandwidth: u16, synchronous: bool) -> Result<(), ClientError> {
        self.cleanup_response();

        let (connection, request) = {
            let state = self.shared.state.lock();
            let connection = state.connection.clone().ok_or(ClientError::NotConnected)?;
            let request = emmgmux::Body::StreamBwRequest(emmgmux::StreamBwRequest {
                stream: state.stream_status.stream,
                client_id: state.stream_status.client_id,
                bandwidth: Some(bandwidth),
            });
            (connection, request)
        };
        connection.send(&connection.message(request))?;

        if !synchronous {
            return Ok(());
        }

        match self.wait_response() {
            0 => Err(ClientError::Timeout("stream_BW_request")),
            emmgmux::tags::CHANNEL_ERROR | emmgmux::tags::STREAM_ERROR => Err(ClientError::PeerError),
            emmgmux::tags::STREAM_BW_ALLOCATION => Ok(()),
            got => Err(ClientError::UnexpectedResponse { expected: "stream_BW_allocation", got }),
        }
    }

    /// Send one datagram chunk.
    pub fn data_provision_one(&self, data: Vec<u8>) -> Result<(), ClientError> {
        self.data_provision(vec![data])
    }

    /// Send EMM or private data chunks as one data_provision message, over
    /// UDP when configured, otherwise over the TCP association.
    pub fn data_provision(&self, data: Vec<Vec<u8>>) -> Result<(), ClientError> {
        let (connection, udp, request, logger) = {
            let mut state = self.shared.state.lock();
            state.total_bytes += data.iter().map(|chunk| chunk.len() as u64).sum::<u64>();
            let request = emmgmux::DataProvision {
                stream: state.stream_status.stream,
                client_id: state.stream_status.client_id,
                data_id: state.stream_status.data_id,
                datagram: data,
            };
            let udp = match (&state.udp_socket, state.udp_address) {
                (Some(socket), Some(addr)) => Some((socket.try_clone()?, addr)),
                _ => None,
            };
            (state.connection.clone(), udp, request, state.logger.clone())
        };

        match udp {
            Some((socket, addr)) => {
                // UDP datagrams still require a healthy TCP association.
                if !self.is_connected() {
                    error!("MUX is disconnected");
                    return Err(ClientError::NotConnected);
                }
                let msg = codec::Message {
                    version: Some(self.protocol.version()),
                    body: emmgmux::Body::DataProvision(request),
                };
                logger.log(&msg, &format!("sending UDP message to {addr}"));
                let mut zer = Serializer::new();
                msg.serialize(&mut zer);
                socket.send_to(&zer.finish(), addr)?;
                Ok(())
            }
            None => {
                let connection = connection.ok_or(ClientError::NotConnected)?;
                let msg = connection.message(emmgmux::Body::DataProvision(request));
                connection.send(&msg).map_err(ClientError::from)
            }
        }
    }

    /// Send sections: packed as-is in section mode, packetized through
    /// `packetize` in TS-packet mode (TS packetization itself is outside
    /// this crate).
    pub fn data_provision_sections(
        &self,
        sections: &[Vec<u8>],
        packetize: impl FnOnce(&[Vec<u8>]) -> Vec<u8>,
    ) -> Result<(), ClientError> {
        let tspkt_mode = self.shared.state.lock().channel_status.section_tspkt_flag;
        if tspkt_mode {
            self.data_provision(vec![packetize(sections)])
        } else {
            self.data_provision(sections.to_vec())
        }
    }

    fn cleanup_response(&self) {
        self.shared.state.lock().last_response = 0;
    }

    /// Wait for the receiver thread to store a response tag, up to the
    /// response timeout. Returns 0 on timeout or disconnection.
    fn wait_response(&self) -> Tag {
        let deadline = Instant::now() + self.response_timeout;
        let mut state = self.shared.state.lock();
        while state.last_response == 0
            && state.phase != Phase::Disconnected
            && state.phase != Phase::Destructing
        {
            if self.shared.got_response.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.last_response
    }

    /// Report the error if any, break the connection, return failure.
    fn abort_connection(&self, message: &str) -> Result<(), ClientError> {
        if !message.is_empty() {
            error!("{message}");
        }
        let mut state = self.shared.state.lock();
        state.phase = Phase::Disconnected;
        state.abort.abort();
        if let Some(connection) = state.connection.take() {
            connection.disconnect();
        }
        state.udp_socket = None;
        self.shared.work_to_do.notify_one();
        Err(ClientError::NotConnected)
    }
}

impl Drop for EmmgClient {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.abort.abort();
            if let Some(connection) = state.connection.take() {
                connection.disconnect();
            }
            state.udp_socket = None;
            state.phase = Phase::Destructing;
            self.shared.work_to_do.notify_one();
            self.shared.got_response.notify_all();
        }
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
    }
}

/// Receiver thread: blocks in `Connection::receive`, answers keep-alives,
/// stores reports, signals synchronous waiters.
fn receiver_main(shared: &Shared) {
    loop {
        // Wait for a connection to manage.
        let (connection, abort) = {
            let mut state = shared.state.lock();
            while state.phase == Phase::Disconnected || state.phase == Phase::Initial {
                shared.work_to_do.wait(&mut state);
            }
            if state.phase == Phase::Destructing {
                return;
            }
            match &state.connection {
                Some(connection) => (Arc::clone(connection), state.abort.clone()),
                None => continue,
            }
        };

        // Message reception loop.
        loop {
            let msg = match connection.receive(Some(&abort)) {
                Ok(msg) => msg,
                Err(err) => {
                    debug!("receive terminated: {err}");
                    break;
                }
            };
            let tag = msg.tag();

            // Keep-alive messages are answered from the cached status and
            // never touch the response slot.
            let mut report_response = true;
            let mut send_failed = false;

            match msg.body {
                emmgmux::Body::ChannelTest(_) => {
                    report_response = false;
                    let reply = shared.state.lock().channel_status.clone();
                    send_failed = connection
                        .send(&connection.message(emmgmux::Body::ChannelStatus(reply)))
                        .is_err();
                }
                emmgmux::Body::StreamTest(_) => {
                    report_response = false;
                    let reply = shared.state.lock().stream_status.clone();
                    send_failed = connection
                        .send(&connection.message(emmgmux::Body::StreamStatus(reply)))
                        .is_err();
                }
                emmgmux::Body::StreamBwAllocation(allocation) => {
                    shared.state.lock().allocated_bw = allocation.bandwidth.unwrap_or(0);
                }
                emmgmux::Body::StreamError(report) => {
                    let mut state = shared.state.lock();
                    state.error_status = report.error_status;
                    state.error_info = report.error_information;
                }
                emmgmux::Body::ChannelError(report) => {
                    let mut state = shared.state.lock();
                    state.error_status = report.error_status;
                    state.error_info = report.error_information;
                }
                _ => {}
            }

            if report_response {
                let mut state = shared.state.lock();
                state.last_response = tag;
                shared.got_response.notify_one();
            }
            if send_failed {
                break;
            }
        }

        // Receive failure, most likely a disconnection.
        {
            let mut state = shared.state.lock();
            if state.phase == Phase::Destructing {
                return;
            }
            if state.phase != Phase::Disconnected {
                state.phase = Phase::Disconnected;
                if let Some(connection) = state.connection.take() {
                    connection.disconnect();
                }
                // Unblock any synchronous waiter.
                shared.got_response.notify_all();
            }
        }
    }
}
