//! EMMG/PDG client scenarios against a mock MUX.

use codec::{ChannelHeader, StreamHeader};
use network::{ClientError, ConnectConfig, Connection, EmmgClient, ProtocolLogger};
use protocols::emmgmux::{self, Body};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CLIENT_ID: u32 = 0x12345678;
const CHANNEL_ID: u16 = 5;
const STREAM_ID: u16 = 7;
const DATA_ID: u16 = 1;

fn mux_connection(stream: TcpStream) -> Connection<emmgmux::Protocol> {
    Connection::from_stream(
        stream,
        Arc::new(emmgmux::Protocol::new()),
        false,
        0,
        ProtocolLogger::silent(),
    )
    .expect("mux connection")
}

fn connect_config(mux: std::net::SocketAddr, udp: Option<std::net::SocketAddr>) -> ConnectConfig {
    ConnectConfig {
        mux,
        udp,
        client_id: CLIENT_ID,
        data_channel_id: CHANNEL_ID,
        data_stream_id: STREAM_ID,
        data_id: DATA_ID,
        data_type: emmgmux::data_types::EMM,
        section_format: true,
    }
}

/// Accept the client and answer the channel/stream negotiation.
fn accept_and_negotiate(listener: TcpListener) -> Connection<emmgmux::Protocol> {
    let (stream, _) = listener.accept().expect("accept");
    let conn = mux_connection(stream);

    // channel_setup, with the inverted section_TSpkt_flag.
    let msg = conn.receive(None).expect("channel_setup");
    match msg.body {
        Body::ChannelSetup(setup) => {
            assert_eq!(setup.channel.channel_id, CHANNEL_ID);
            assert_eq!(setup.client_id, CLIENT_ID);
            assert!(!setup.section_tspkt_flag);
        }
        other => panic!("expected channel_setup, got {other:?}"),
    }
    conn.send(&conn.message(Body::ChannelStatus(emmgmux::ChannelStatus {
        channel: ChannelHeader::new(CHANNEL_ID),
        client_id: CLIENT_ID,
        section_tspkt_flag: false,
    })))
    .expect("channel_status");

    // stream_setup.
    let msg = conn.receive(None).expect("stream_setup");
    match msg.body {
        Body::StreamSetup(setup) => {
            assert_eq!(setup.stream.channel_id, CHANNEL_ID);
            assert_eq!(setup.stream.stream_id, STREAM_ID);
            assert_eq!(setup.client_id, CLIENT_ID);
            assert_eq!(setup.data_id, DATA_ID);
        }
        other => panic!("expected stream_setup, got {other:?}"),
    }
    conn.send(&conn.message(Body::StreamStatus(emmgmux::StreamStatus {
        stream: StreamHeader::new(CHANNEL_ID, STREAM_ID),
        client_id: CLIENT_ID,
        data_id: DATA_ID,
        data_type: emmgmux::data_types::EMM,
    })))
    .expect("stream_status");

    conn
}

#[test]
fn connect_keepalive_data_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mux = thread::spawn(move || {
        let conn = accept_and_negotiate(listener);

        // Keep-alive: the client must answer channel_test with the cached
        // channel_status and stream_test with the cached stream_status,
        // without disturbing its state.
        conn.send(&conn.message(Body::ChannelTest(emmgmux::ChannelTest {
            channel: ChannelHeader::new(CHANNEL_ID),
            client_id: CLIENT_ID,
        })))
        .expect("channel_test");
        match conn.receive(None).expect("keep-alive reply").body {
            Body::ChannelStatus(status) => {
                assert_eq!(status.channel.channel_id, CHANNEL_ID);
                assert_eq!(status.client_id, CLIENT_ID);
                assert!(!status.section_tspkt_flag);
            }
            other => panic!("expected channel_status, got {other:?}"),
        }

        conn.send(&conn.message(Body::StreamTest(emmgmux::StreamTest {
            stream: StreamHeader::new(CHANNEL_ID, STREAM_ID),
            client_id: CLIENT_ID,
        })))
        .expect("stream_test");
        match conn.receive(None).expect("keep-alive reply").body {
            Body::StreamStatus(status) => {
                assert_eq!(status.stream.stream_id, STREAM_ID);
                assert_eq!(status.data_id, DATA_ID);
            }
            other => panic!("expected stream_status, got {other:?}"),
        }

        // data_provision over the TCP association.
        match conn.receive(None).expect("data_provision").body {
            Body::DataProvision(data) => {
                assert_eq!(data.stream.channel_id, CHANNEL_ID);
                assert_eq!(data.stream.stream_id, STREAM_ID);
                assert_eq!(data.client_id, CLIENT_ID);
                assert_eq!(data.data_id, DATA_ID);
                assert_eq!(data.datagram, vec![vec![0xCA, 0xFE], vec![0xBE, 0xEF]]);
            }
            other => panic!("expected data_provision, got {other:?}"),
        }

        // Graceful close initiated by the client.
        match conn.receive(None).expect("stream_close_request").body {
            Body::StreamCloseRequest(req) => {
                assert_eq!(req.stream.stream_id, STREAM_ID);
            }
            other => panic!("expected stream_close_request, got {other:?}"),
        }
        conn.send(&conn.message(Body::StreamCloseResponse(emmgmux::StreamCloseResponse {
            stream: StreamHeader::new(CHANNEL_ID, STREAM_ID),
            client_id: CLIENT_ID,
        })))
        .expect("stream_close_response");

        match conn.receive(None).expect("channel_close").body {
            Body::ChannelClose(close) => {
                assert_eq!(close.channel.channel_id, CHANNEL_ID);
            }
            other => panic!("expected channel_close, got {other:?}"),
        }
    });

    let mut client = EmmgClient::new(emmgmux::Protocol::new());
    client
        .connect(&connect_config(addr, None), ProtocolLogger::silent())
        .expect("connect");
    assert!(client.is_connected());

    // Leave the keep-alive exchange to the receiver thread, then push data.
    thread::sleep(Duration::from_millis(200));
    assert!(client.is_connected());

    client
        .data_provision(vec![vec![0xCA, 0xFE], vec![0xBE, 0xEF]])
        .expect("data_provision");
    assert_eq!(client.total_bytes(), 4);

    client.disconnect().expect("disconnect");
    assert!(!client.is_connected());

    mux.join().expect("mux thread");
}

#[test]
fn sync_request_times_out_without_response() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mux = thread::spawn(move || {
        let conn = accept_and_negotiate(listener);
        // Swallow the stream_BW_request and never answer.
        match conn.receive(None).expect("stream_BW_request").body {
            Body::StreamBwRequest(req) => {
                assert_eq!(req.bandwidth, Some(500));
            }
            other => panic!("expected stream_BW_request, got {other:?}"),
        }
    });

    let mut client = EmmgClient::new(emmgmux::Protocol::new());
    client
        .connect(&connect_config(addr, None), ProtocolLogger::silent())
        .expect("connect");
    client.set_response_timeout(Duration::from_millis(300));

    match client.request_bandwidth(500, true) {
        Err(ClientError::Timeout(_)) => {}
        other => panic!("expected timeout, got {other:?}"),
    }

    mux.join().expect("mux thread");
}

#[test]
fn bandwidth_allocation_is_stored() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mux = thread::spawn(move || {
        let conn = accept_and_negotiate(listener);
        match conn.receive(None).expect("stream_BW_request").body {
            Body::StreamBwRequest(req) => {
                assert_eq!(req.bandwidth, Some(750));
            }
            other => panic!("expected stream_BW_request, got {other:?}"),
        }
        conn.send(&conn.message(Body::StreamBwAllocation(emmgmux::StreamBwAllocation {
            stream: StreamHeader::new(CHANNEL_ID, STREAM_ID),
            client_id: CLIENT_ID,
            bandwidth: Some(600),
        })))
        .expect("stream_BW_allocation");
    });

    let mut client = EmmgClient::new(emmgmux::Protocol::new());
    client
        .connect(&connect_config(addr, None), ProtocolLogger::silent())
        .expect("connect");

    client.request_bandwidth(750, true).expect("bandwidth granted");
    assert_eq!(client.allocated_bandwidth(), 600);

    mux.join().expect("mux thread");
}

#[test]
fn udp_data_provision_requires_live_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let udp_receiver = UdpSocket::bind("127.0.0.1:0").expect("udp bind");
    udp_receiver
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("udp timeout");
    let udp_addr = udp_receiver.local_addr().expect("udp addr");

    let mux = thread::spawn(move || {
        let conn = accept_and_negotiate(listener);
        // Keep the association open until the client is done.
        let _ = conn.receive(None);
    });

    let mut client = EmmgClient::new(emmgmux::Protocol::new());
    client
        .connect(&connect_config(addr, Some(udp_addr)), ProtocolLogger::silent())
        .expect("connect");

    client.data_provision(vec![vec![0x11, 0x22, 0x33]]).expect("udp data_provision");

    // The datagram is one complete serialized data_provision message.
    let mut buf = [0u8; 2048];
    let (len, _) = udp_receiver.recv_from(&mut buf).expect("udp datagram");
    let protocol = emmgmux::Protocol::new();
    let fact = codec::MessageFactory::new(&buf[..len], codec::ProtocolDefinition::syntax(&protocol));
    assert_eq!(fact.status(), Ok(()));
    match codec::ProtocolDefinition::build(&protocol, &fact).expect("build") {
        Body::DataProvision(data) => {
            assert_eq!(data.client_id, CLIENT_ID);
            assert_eq!(data.datagram, vec![vec![0x11, 0x22, 0x33]]);
        }
        other => panic!("expected data_provision, got {other:?}"),
    }

    drop(client);
    mux.join().expect("mux thread");
}
