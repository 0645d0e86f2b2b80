//! Framed connection behavior against a raw peer.

use byteorder::{BigEndian, ByteOrder};
use codec::MessageFactory;
use codec::ProtocolDefinition;
use network::{Connection, ConnectionError, ProtocolLogger};
use protocols::emmgmux::{self, Body};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

/// Read one framed message from a raw stream and deserialize it.
fn read_frame(stream: &mut impl Read, protocol: &emmgmux::Protocol) -> Body {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).expect("frame header");
    let length = usize::from(BigEndian::read_u16(&header[3..5]));
    let mut frame = header.to_vec();
    frame.resize(5 + length, 0);
    stream.read_exact(&mut frame[5..]).expect("frame body");

    let fact = MessageFactory::new(&frame, protocol.syntax());
    assert_eq!(fact.status(), Ok(()));
    protocol.build(&fact).expect("build")
}

#[test]
fn invalid_frames_get_error_replies_then_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");

        // Three well-framed messages with an unknown command tag.
        let bad_frame = [0x03, 0x09, 0x99, 0x00, 0x00];
        for _ in 0..3 {
            stream.write_all(&bad_frame).expect("bad frame");
        }

        // Each must be answered with a channel_error mapping the fault to
        // inv_message_type, error information pointing at the command tag.
        let protocol = emmgmux::Protocol::new();
        for _ in 0..3 {
            match read_frame(&mut stream, &protocol) {
                Body::ChannelError(err) => {
                    assert_eq!(err.error_status, vec![emmgmux::errors::INV_MESSAGE_TYPE]);
                    assert_eq!(err.error_information, vec![1]);
                }
                other => panic!("expected channel_error, got {other:?}"),
            }
        }
    });

    let stream = std::net::TcpStream::connect(addr).expect("connect");
    let conn = Connection::from_stream(
        stream,
        Arc::new(emmgmux::Protocol::new()),
        true,
        3,
        ProtocolLogger::silent(),
    )
    .expect("connection");

    // The third consecutive invalid message closes the connection.
    match conn.receive(None) {
        Err(ConnectionError::TooManyInvalidMessages(3)) => {}
        other => panic!("expected invalid message limit, got {other:?}"),
    }

    // The connection stays dead.
    assert!(conn.receive(None).is_err());

    peer.join().expect("peer thread");
}

#[test]
fn valid_message_resets_the_invalid_counter() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let protocol = emmgmux::Protocol::new();
        let bad_frame = [0x03, 0x09, 0x99, 0x00, 0x00];

        // Two invalid frames, then a valid one, then two invalid again:
        // the limit of three is never reached.
        for _ in 0..2 {
            stream.write_all(&bad_frame).expect("bad frame");
        }
        let valid = protocol
            .message(Body::ChannelTest(emmgmux::ChannelTest {
                channel: codec::ChannelHeader::new(1),
                client_id: 2,
            }))
            .to_bytes();
        stream.write_all(&valid).expect("valid frame");
        for _ in 0..2 {
            stream.write_all(&bad_frame).expect("bad frame");
        }
        let valid = protocol
            .message(Body::ChannelTest(emmgmux::ChannelTest {
                channel: codec::ChannelHeader::new(3),
                client_id: 4,
            }))
            .to_bytes();
        stream.write_all(&valid).expect("valid frame");

        // Drain the four auto error replies.
        for _ in 0..4 {
            match read_frame(&mut stream, &protocol) {
                Body::ChannelError(_) => {}
                other => panic!("expected channel_error, got {other:?}"),
            }
        }
    });

    let stream = std::net::TcpStream::connect(addr).expect("connect");
    let conn = Connection::from_stream(
        stream,
        Arc::new(emmgmux::Protocol::new()),
        true,
        3,
        ProtocolLogger::silent(),
    )
    .expect("connection");

    match conn.receive(None).expect("first valid message").body {
        Body::ChannelTest(test) => assert_eq!(test.channel.channel_id, 1),
        other => panic!("expected channel_test, got {other:?}"),
    }
    match conn.receive(None).expect("second valid message").body {
        Body::ChannelTest(test) => assert_eq!(test.channel.channel_id, 3),
        other => panic!("expected channel_test, got {other:?}"),
    }

    peer.join().expect("peer thread");
}

#[test]
fn abort_flag_interrupts_a_blocking_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let peer = thread::spawn(move || {
        // Accept and keep the socket open without sending anything.
        let (stream, _) = listener.accept().expect("accept");
        thread::sleep(std::time::Duration::from_secs(2));
        drop(stream);
    });

    let stream = std::net::TcpStream::connect(addr).expect("connect");
    let conn = Connection::from_stream(
        stream,
        Arc::new(emmgmux::Protocol::new()),
        false,
        0,
        ProtocolLogger::silent(),
    )
    .expect("connection");

    let abort = network::AbortFlag::new();
    let trip = abort.clone();
    thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(200));
        trip.abort();
    });

    match conn.receive(Some(&abort)) {
        Err(ConnectionError::Aborted) => {}
        other => panic!("expected aborted receive, got {other:?}"),
    }

    peer.join().expect("peer thread");
}
