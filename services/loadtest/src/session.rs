//! One channel to the ECMG: connection, receiver thread, stream table.

use crate::events::EventQueue;
use crate::stats::Statistics;
use crate::Config;
use codec::{ChannelHeader, StreamHeader};
use network::{Connection, ProtocolLogger};
use parking_lot::{Condvar, Mutex};
use protocols::ecmgscs;
use rand::RngCore;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::error;

/// How long the graceful close waits for pending stream_close_responses.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-stream crypto-period state.
#[derive(Debug, Clone, Default)]
struct Stream {
    ready: bool,
    closing: bool,
    cp_number: u16,
    start_request: Option<Instant>,
}

impl Stream {
    /// The CP number of the next request; strictly increasing across the
    /// stream, modulo 16-bit wraparound.
    fn next_cp(&mut self) -> u16 {
        let cp = self.cp_number;
        self.cp_number = self.cp_number.wrapping_add(1);
        cp
    }
}

struct SessionShared {
    cfg: Arc<Config>,
    stats: Arc<Statistics>,
    events: Arc<EventQueue>,
    conn: Connection<ecmgscs::Protocol>,
    channel_id: u16,
    first_ecm_id: u16,
    first_stream_id: u16,
    end_stream_id: u16,
    /// As returned by the ECMG in channel_status.
    cw_per_msg: AtomicU8,
    /// Latest channel_status from the ECMG, used to answer channel_test.
    channel_status: Mutex<ecmgscs::ChannelStatus>,
    streams: Mutex<Vec<Stream>>,
    /// Signalled by the receiver thread when a stream finishes closing.
    completed: Condvar,
}

/// One TCP association with the ECMG, carrying one channel with
/// `streams_per_channel` streams. Stream bring-up is sequential: each
/// stream_status triggers the first CW_provision of that stream and the
/// setup of the next one.
pub struct EcmgSession {
    shared: Arc<SessionShared>,
    receiver: Option<JoinHandle<()>>,
}

impl EcmgSession {
    pub fn new(
        cfg: Arc<Config>,
        stats: Arc<Statistics>,
        events: Arc<EventQueue>,
        index: u16,
    ) -> anyhow::Result<Self> {
        let channel_id = cfg.first_channel_id + index;

        let mut logger = ProtocolLogger::new(cfg.log_protocol);
        logger.set_tag_level(ecmgscs::tags::CW_PROVISION, Some(cfg.log_data));
        logger.set_tag_level(ecmgscs::tags::ECM_RESPONSE, Some(cfg.log_data));

        let conn = Connection::connect(
            cfg.ecmg_address,
            Arc::clone(&cfg.protocol),
            true,
            3,
            logger,
        )?;

        let shared = Arc::new(SessionShared {
            channel_id,
            first_ecm_id: cfg.first_ecm_id + index * cfg.streams_per_channel,
            first_stream_id: cfg.first_stream_id,
            end_stream_id: cfg.first_stream_id + cfg.streams_per_channel,
            cw_per_msg: AtomicU8::new(0),
            channel_status: Mutex::new(ecmgscs::ChannelStatus {
                channel: ChannelHeader::new(channel_id),
                ..Default::default()
            }),
            streams: Mutex::new(vec![Stream::default(); usize::from(cfg.streams_per_channel)]),
            completed: Condvar::new(),
            cfg,
            stats,
            events,
            conn,
        });

        let setup = shared.conn.message(ecmgscs::Body::ChannelSetup(ecmgscs::ChannelSetup {
            channel: ChannelHeader::new(channel_id),
            super_cas_id: shared.cfg.super_cas_id,
        }));
        shared.conn.send(&setup)?;

        let thread_shared = Arc::clone(&shared);
        let receiver = thread::Builder::new()
            .name(format!("ecmg-recv-{channel_id}"))
            .spawn(move || receiver_main(&thread_shared))?;

        Ok(EcmgSession { shared, receiver: Some(receiver) })
    }

    /// Send the next CW_provision of a stream.
    pub fn send_request(&self, stream_id: u16) {
        self.shared.send_request(stream_id);
    }

    /// Close all streams, then the channel, then drop the connection.
    pub fn terminate(&mut self) {
        let shared = &self.shared;
        let mut polite = true;

        {
            let mut streams = shared.streams.lock();
            for index in 0..streams.len() {
                if streams[index].ready {
                    let msg = shared.conn.message(ecmgscs::Body::StreamCloseRequest(
                        ecmgscs::StreamCloseRequest {
                            stream: StreamHeader::new(
                                shared.channel_id,
                                shared.first_stream_id + index as u16,
                            ),
                        },
                    ));
                    if shared.conn.send(&msg).is_err() {
                        polite = false;
                        break;
                    }
                    streams[index].ready = false;
                    streams[index].closing = true;
                }
            }
        }

        // Wait for the ECMG to answer every close request, with a deadline
        // in case the peer is gone.
        if polite {
            let deadline = Instant::now() + CLOSE_TIMEOUT;
            let mut streams = shared.streams.lock();
            while streams.iter().any(|s| s.ready || s.closing) {
                if shared.completed.wait_until(&mut streams, deadline).timed_out() {
                    break;
                }
            }
            drop(streams);

            let close = shared.conn.message(ecmgscs::Body::ChannelClose(ecmgscs::ChannelClose {
                channel: ChannelHeader::new(shared.channel_id),
            }));
            let _ = shared.conn.send(&close);
        }

        shared.conn.disconnect();
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
    }
}

impl SessionShared {
    fn check_channel(&self, channel_id: u16, name: &str) -> bool {
        if channel_id == self.channel_id {
            true
        } else {
            error!(
                "received invalid channel_id {channel_id} (should be {}) in {name}",
                self.channel_id
            );
            false
        }
    }

    fn check_stream(&self, stream: &StreamHeader, name: &str) -> bool {
        if !self.check_channel(stream.channel_id, name) {
            false
        } else if stream.stream_id < self.first_stream_id || stream.stream_id >= self.end_stream_id {
            error!(
                "received invalid stream_id {} (should be {} to {}) in {name}",
                stream.stream_id,
                self.first_stream_id,
                self.end_stream_id - 1
            );
            false
        } else {
            true
        }
    }

    fn send_stream_setup(&self, stream_id: u16) -> bool {
        let streams = self.streams.lock();
        let index = usize::from(stream_id.wrapping_sub(self.first_stream_id));
        if stream_id < self.first_stream_id || index >= streams.len() || streams[index].ready {
            error!("invalid stream id: {stream_id}");
            return false;
        }
        drop(streams);

        let msg = self.conn.message(ecmgscs::Body::StreamSetup(ecmgscs::StreamSetup {
            stream: StreamHeader::new(self.channel_id, stream_id),
            ecm_id: self.first_ecm_id + index as u16,
            nominal_cp_duration: self.cfg.cp_duration_ds,
        }));
        self.conn.send(&msg).is_ok()
    }

    fn send_request(&self, stream_id: u16) -> bool {
        let mut streams = self.streams.lock();
        let index = usize::from(stream_id.wrapping_sub(self.first_stream_id));
        if stream_id < self.first_stream_id || index >= streams.len() || !streams[index].ready {
            error!("invalid stream id: {stream_id}");
            return false;
        }

        let cp_number = streams[index].next_cp();
        let cw_count = usize::from(self.cw_per_msg.load(Ordering::Relaxed));
        let mut rng = rand::thread_rng();
        let cp_cw_combination = (0..cw_count)
            .map(|i| {
                let mut cw = vec![0u8; self.cfg.cw_size];
                rng.fill_bytes(&mut cw);
                ecmgscs::CpCwCombination::new(cp_number.wrapping_add(i as u16), cw)
            })
            .collect();

        let msg = self.conn.message(ecmgscs::Body::CwProvision(ecmgscs::CwProvision {
            stream: StreamHeader::new(self.channel_id, stream_id),
            cp_number,
            cw_encryption: None,
            cp_cw_combination,
            cp_duration: None,
            access_criteria: self.cfg.access_criteria.clone(),
        }));

        streams[index].start_request = Some(Instant::now());
        self.stats.one_request();
        self.conn.send(&msg).is_ok()
    }
}

/// Receiver thread for one channel.
fn receiver_main(shared: &SessionShared) {
    // Streams are set up one at a time; this walks the stream table.
    let mut next_stream_index: u16 = 0;
    let mut ok = true;

    while ok {
        let msg = match shared.conn.receive(None) {
            Ok(msg) => msg,
            Err(_) => break,
        };

        match &msg.body {
            ecmgscs::Body::ChannelStatus(status) => {
                if shared.check_channel(status.channel.channel_id, "channel_status") {
                    // Keep it for keep-alive replies and CW sizing.
                    *shared.channel_status.lock() = status.clone();
                    shared.cw_per_msg.store(status.cw_per_msg, Ordering::Relaxed);
                    if next_stream_index == 0 {
                        // Response to channel_setup: bring up the first stream.
                        ok = shared.send_stream_setup(shared.first_stream_id + next_stream_index);
                        next_stream_index += 1;
                    }
                }
            }

            ecmgscs::Body::ChannelTest(test) => {
                if shared.check_channel(test.channel.channel_id, "channel_test") {
                    let reply = shared.channel_status.lock().clone();
                    ok = shared.conn.send(&shared.conn.message(ecmgscs::Body::ChannelStatus(reply))).is_ok();
                }
            }

            ecmgscs::Body::StreamStatus(status) => {
                if shared.check_stream(&status.stream, "stream_status") {
                    let stream_id = status.stream.stream_id;
                    let first_time = {
                        let mut streams = shared.streams.lock();
                        let index = usize::from(stream_id - shared.first_stream_id);
                        let first_time = !streams[index].ready;
                        streams[index].ready = true;
                        first_time
                    };
                    if first_time {
                        // Response to stream_setup: start the request cycle
                        // and bring up the next stream.
                        ok = shared.send_request(stream_id);
                        if ok && next_stream_index < shared.cfg.streams_per_channel {
                            ok = shared
                                .send_stream_setup(shared.first_stream_id + next_stream_index);
                            next_stream_index += 1;
                        }
                    }
                }
            }

            ecmgscs::Body::StreamTest(test) => {
                if shared.check_stream(&test.stream, "stream_test") {
                    let reply = ecmgscs::StreamStatus {
                        stream: StreamHeader::new(shared.channel_id, test.stream.stream_id),
                        ecm_id: shared.first_ecm_id + test.stream.stream_id
                            - shared.first_stream_id,
                        access_criteria_transfer_mode: false,
                    };
                    ok = shared.conn.send(&shared.conn.message(ecmgscs::Body::StreamStatus(reply))).is_ok();
                }
            }

            ecmgscs::Body::ChannelError(_) | ecmgscs::Body::StreamError(_) => {
                error!("received error:\n{}", msg.dump(2));
            }

            ecmgscs::Body::EcmResponse(response) => {
                if shared.check_stream(&response.stream, "ECM_response") {
                    let mut streams = shared.streams.lock();
                    let index = usize::from(response.stream.stream_id - shared.first_stream_id);
                    match streams[index].start_request.take() {
                        Some(start) if streams[index].ready => {
                            shared.stats.one_response(start.elapsed());
                            // Schedule the next request one crypto-period
                            // after the previous one started.
                            shared.events.post_request(
                                start + shared.cfg.cp_duration,
                                response.stream.channel_id,
                                response.stream.stream_id,
                            );
                        }
                        _ => {
                            error!(
                                "unexpected ECM response, channel_id {}, stream_id {}",
                                response.stream.channel_id, response.stream.stream_id
                            );
                        }
                    }
                }
            }

            ecmgscs::Body::StreamCloseResponse(response) => {
                if shared.check_stream(&response.stream, "stream_close_response") {
                    let mut streams = shared.streams.lock();
                    let index = usize::from(response.stream.stream_id - shared.first_stream_id);
                    streams[index].ready = false;
                    streams[index].closing = false;
                    shared.completed.notify_one();
                }
            }

            _ => {
                error!("unexpected message:\n{}", msg.dump(2));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp_numbers_increase_strictly_and_wrap() {
        let mut stream = Stream::default();
        let mut previous = stream.next_cp();
        for _ in 0..100 {
            let cp = stream.next_cp();
            assert_eq!(cp, previous.wrapping_add(1));
            previous = cp;
        }

        stream.cp_number = u16::MAX;
        assert_eq!(stream.next_cp(), u16::MAX);
        assert_eq!(stream.next_cp(), 0);
    }
}
