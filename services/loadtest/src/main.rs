//! Exercise a DVB SimulCrypt compliant ECMG with an artificial load.
//!
//! Opens a configurable number of channels (one TCP association each), sets
//! up streams in every channel, sends CW_provision requests at crypto-period
//! cadence and reports ECM response latency statistics.

mod events;
mod session;
mod stats;

use anyhow::{bail, Context};
use clap::Parser;
use events::EventQueue;
use protocols::ecmgscs;
use session::EcmgSession;
use stats::Statistics;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about = "Test a DVB SimulCrypt compliant ECMG with an artificial load")]
struct Args {
    /// Host name and port of the ECM generator to test (host:port)
    ecmg: String,

    /// DVB SimulCrypt Super_CAS_id (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_u32)]
    super_cas_id: u32,

    /// Access criteria sent in every CW_provision, as hexadecimal digits
    #[arg(short = 'a', long)]
    access_criteria: Option<String>,

    /// Number of channels to open, one TCP connection each
    #[arg(short = 'c', long, default_value_t = 10)]
    channels: u16,

    /// Number of streams to open in each channel
    #[arg(short = 's', long, default_value_t = 10)]
    streams_per_channel: u16,

    /// First ECM_channel_id; subsequent connections use sequential values
    #[arg(long, default_value_t = 0)]
    first_channel_id: u16,

    /// First ECM_stream_id in each channel
    #[arg(long, default_value_t = 0)]
    first_stream_id: u16,

    /// First ECM_id; defaults to first-channel-id times streams-per-channel
    #[arg(long)]
    first_ecm_id: Option<u16>,

    /// Crypto-period duration in seconds
    #[arg(long, default_value_t = 10)]
    cp_duration: u64,

    /// Size in bytes of control words
    #[arg(long, default_value_t = 8)]
    cw_size: usize,

    /// Version of the ECMG <=> SCS DVB SimulCrypt protocol (2 or 3)
    #[arg(long, default_value_t = 2)]
    ecmg_scs_version: u8,

    /// Stop after this number of ECM requests
    #[arg(long)]
    max_ecm: Option<u64>,

    /// Stop after this number of seconds
    #[arg(long)]
    max_seconds: Option<u64>,

    /// Seconds between two statistics lines, 0 to disable periodic reports
    #[arg(long, default_value_t = 10)]
    statistics_interval: u64,

    /// Level for logging protocol messages (error, warn, info, debug, trace)
    #[arg(long, default_value = "debug")]
    log_protocol: String,

    /// Same as --log-protocol but for CW_provision and ECM_response only
    #[arg(long)]
    log_data: Option<String>,
}

/// Resolved command line, shared with all sessions.
pub struct Config {
    pub ecmg_address: SocketAddr,
    pub protocol: Arc<ecmgscs::Protocol>,
    pub super_cas_id: u32,
    pub access_criteria: Option<Vec<u8>>,
    pub cp_duration: Duration,
    /// The wire value of nominal_CP_duration, in tenths of a second.
    pub cp_duration_ds: u16,
    pub channels: u16,
    pub streams_per_channel: u16,
    pub first_channel_id: u16,
    pub first_stream_id: u16,
    pub first_ecm_id: u16,
    pub cw_size: usize,
    pub log_protocol: Level,
    pub log_data: Level,
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn parse_level(value: &str) -> anyhow::Result<Level> {
    value.parse().map_err(|_| anyhow::anyhow!("invalid log level: {value}"))
}

fn build_config(args: &Args) -> anyhow::Result<Config> {
    let ecmg_address = args
        .ecmg
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {}", args.ecmg))?
        .next()
        .with_context(|| format!("no address for {}", args.ecmg))?;

    if !matches!(args.ecmg_scs_version, 2 | 3) {
        bail!("invalid --ecmg-scs-version {}, valid values are 2 and 3", args.ecmg_scs_version);
    }

    let first_ecm_id =
        args.first_ecm_id.unwrap_or(args.first_channel_id.wrapping_mul(args.streams_per_channel));

    // The id spaces are 16-bit; reject allocations that would wrap.
    if usize::from(args.first_channel_id) + usize::from(args.channels) > 0x10000 {
        bail!("--channels too large for --first-channel-id");
    }
    if usize::from(args.first_stream_id) + usize::from(args.streams_per_channel) > 0x10000 {
        bail!("--streams-per-channel too large for --first-stream-id");
    }
    if usize::from(first_ecm_id)
        + usize::from(args.channels) * usize::from(args.streams_per_channel)
        > 0x10000
    {
        bail!("combination of --channels and --streams-per-channel too large for --first-ecm-id");
    }

    let access_criteria = match &args.access_criteria {
        Some(digits) => {
            Some(hex::decode(digits).context("--access-criteria must be hexadecimal digits")?)
        }
        None => None,
    };

    if args.cw_size == 0 {
        bail!("--cw-size must be positive");
    }

    let log_protocol = parse_level(&args.log_protocol)?;
    let log_data = match &args.log_data {
        Some(level) => parse_level(level)?,
        None => log_protocol,
    };

    Ok(Config {
        ecmg_address,
        protocol: Arc::new(ecmgscs::Protocol::with_version(args.ecmg_scs_version)),
        super_cas_id: args.super_cas_id,
        access_criteria,
        cp_duration: Duration::from_secs(args.cp_duration),
        cp_duration_ds: (args.cp_duration * 10).min(u64::from(u16::MAX)) as u16,
        channels: args.channels,
        streams_per_channel: args.streams_per_channel,
        first_channel_id: args.first_channel_id,
        first_stream_id: args.first_stream_id,
        first_ecm_id,
        cw_size: args.cw_size,
        log_protocol,
        log_data,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let cfg = Arc::new(build_config(&args)?);

    let stats = Arc::new(Statistics::new(Duration::from_secs(args.statistics_interval)));

    let events = Arc::new(EventQueue::new(args.max_ecm));
    if let Some(max_seconds) = args.max_seconds {
        events.post_termination(Instant::now() + Duration::from_secs(max_seconds));
    }

    // Initialize all channels, one connection to the ECMG each.
    let mut sessions = Vec::with_capacity(usize::from(cfg.channels));
    for index in 0..cfg.channels {
        sessions.push(
            EcmgSession::new(Arc::clone(&cfg), Arc::clone(&stats), Arc::clone(&events), index)
                .with_context(|| {
                    format!("channel {} setup failed", cfg.first_channel_id + index)
                })?,
        );
    }

    // Send ECM requests as they come due.
    while let Some((channel_id, stream_id)) = events.wait_event() {
        let index = usize::from(channel_id - cfg.first_channel_id);
        sessions[index].send_request(stream_id);
    }

    // Terminate all connections and wait for termination.
    for session in &mut sessions {
        session.terminate();
    }
    stats.terminate();
    Ok(())
}
