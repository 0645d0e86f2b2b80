//! DVB SimulCrypt ECMG <=> SCS protocol (ETSI TS 103 197).

use byteorder::{BigEndian, ByteOrder};
use codec::message::{
    dump_bytes, dump_decimal, dump_optional_bytes, dump_optional_decimal, dump_vector,
};
use codec::{
    message::dump_hexa, ChannelHeader, InternalError, Message, MessageFactory, ProtocolDefinition,
    StreamHeader, Tag, TlvError, Version,
};

const PROTOCOL_NAME: &str = "ECMG<=>SCS";

/// Current version of the ECMG <=> SCS protocol.
pub const CURRENT_VERSION: Version = 0x03;

/// True when `tag` is a command of the ECMG <=> SCS protocol.
pub fn is_valid_command(tag: u16) -> bool {
    (0x0001..=0x0005).contains(&tag) || (0x0101..=0x0106).contains(&tag) || (0x0201..=0x0202).contains(&tag)
}

/// Command and parameter tags, fixed by ETSI TS 103 197.
pub mod tags {
    use codec::Tag;

    pub const CHANNEL_SETUP: Tag = 0x0001;
    pub const CHANNEL_TEST: Tag = 0x0002;
    pub const CHANNEL_STATUS: Tag = 0x0003;
    pub const CHANNEL_CLOSE: Tag = 0x0004;
    pub const CHANNEL_ERROR: Tag = 0x0005;
    pub const STREAM_SETUP: Tag = 0x0101;
    pub const STREAM_TEST: Tag = 0x0102;
    pub const STREAM_STATUS: Tag = 0x0103;
    pub const STREAM_CLOSE_REQUEST: Tag = 0x0104;
    pub const STREAM_CLOSE_RESPONSE: Tag = 0x0105;
    pub const STREAM_ERROR: Tag = 0x0106;
    pub const CW_PROVISION: Tag = 0x0201;
    pub const ECM_RESPONSE: Tag = 0x0202;

    pub const SUPER_CAS_ID: Tag = 0x0001;
    pub const SECTION_TSPKT_FLAG: Tag = 0x0002;
    pub const DELAY_START: Tag = 0x0003;
    pub const DELAY_STOP: Tag = 0x0004;
    pub const TRANSITION_DELAY_START: Tag = 0x0005;
    pub const TRANSITION_DELAY_STOP: Tag = 0x0006;
    pub const ECM_REP_PERIOD: Tag = 0x0007;
    pub const MAX_STREAMS: Tag = 0x0008;
    pub const MIN_CP_DURATION: Tag = 0x0009;
    pub const LEAD_CW: Tag = 0x000A;
    pub const CW_PER_MSG: Tag = 0x000B;
    pub const MAX_COMP_TIME: Tag = 0x000C;
    pub const ACCESS_CRITERIA: Tag = 0x000D;
    pub const ECM_CHANNEL_ID: Tag = 0x000E;
    pub const ECM_STREAM_ID: Tag = 0x000F;
    pub const NOMINAL_CP_DURATION: Tag = 0x0010;
    pub const ACCESS_CRITERIA_TRANSFER_MODE: Tag = 0x0011;
    pub const CP_NUMBER: Tag = 0x0012;
    pub const CP_DURATION: Tag = 0x0013;
    pub const CP_CW_COMBINATION: Tag = 0x0014;
    pub const ECM_DATAGRAM: Tag = 0x0015;
    pub const AC_DELAY_START: Tag = 0x0016;
    pub const AC_DELAY_STOP: Tag = 0x0017;
    pub const CW_ENCRYPTION: Tag = 0x0018;
    pub const ECM_ID: Tag = 0x0019;
    pub const ERROR_STATUS: Tag = 0x7000;
    pub const ERROR_INFORMATION: Tag = 0x7001;
}

/// ECMG <=> SCS error status values.
pub mod errors {
    pub const INV_MESSAGE: u16 = 0x0001;
    pub const INV_PROTO_VERSION: u16 = 0x0002;
    pub const INV_MESSAGE_TYPE: u16 = 0x0003;
    pub const MESSAGE_TOO_LONG: u16 = 0x0004;
    pub const INV_SUPER_CAS_ID: u16 = 0x0005;
    pub const INV_CHANNEL_ID: u16 = 0x0006;
    pub const INV_STREAM_ID: u16 = 0x0007;
    pub const TOO_MANY_CHANNELS: u16 = 0x0008;
    pub const TOO_MANY_STM_CHAN: u16 = 0x0009;
    pub const TOO_MANY_STM_ECMG: u16 = 0x000A;
    pub const NOT_ENOUGH_CW: u16 = 0x000B;
    pub const OUT_OF_STORAGE: u16 = 0x000C;
    pub const OUT_OF_COMPUTE: u16 = 0x000D;
    pub const INV_PARAM_TYPE: u16 = 0x000E;
    pub const INV_PARAM_LENGTH: u16 = 0x000F;
    pub const MISSING_PARAM: u16 = 0x0010;
    pub const INV_PARAM_VALUE: u16 = 0x0011;
    pub const INV_ECM_ID: u16 = 0x0012;
    pub const CHANNEL_ID_IN_USE: u16 = 0x0013;
    pub const STREAM_ID_IN_USE: u16 = 0x0014;
    pub const ECM_ID_IN_USE: u16 = 0x0015;
    pub const UNKNOWN_ERROR: u16 = 0x7000;
    pub const UNRECOVERABLE_ERROR: u16 = 0x7001;

    /// Readable label for a status code, for dumps and logs.
    pub fn name(status: u16) -> &'static str {
        match status {
            INV_MESSAGE => "invalid message",
            INV_PROTO_VERSION => "invalid protocol version",
            INV_MESSAGE_TYPE => "invalid message type",
            MESSAGE_TOO_LONG => "message too long",
            INV_SUPER_CAS_ID => "invalid Super_CAS_id",
            INV_CHANNEL_ID => "invalid ECM_channel_id",
            INV_STREAM_ID => "invalid ECM_stream_id",
            TOO_MANY_CHANNELS => "too many channels on this ECMG",
            TOO_MANY_STM_CHAN => "too many streams on this channel",
            TOO_MANY_STM_ECMG => "too many streams on this ECMG",
            NOT_ENOUGH_CW => "not enough control words to compute ECM",
            OUT_OF_STORAGE => "ECMG out of storage capacity",
            OUT_OF_COMPUTE => "ECMG out of computational resources",
            INV_PARAM_TYPE => "invalid parameter type",
            INV_PARAM_LENGTH => "invalid parameter length",
            MISSING_PARAM => "missing mandatory parameter",
            INV_PARAM_VALUE => "invalid parameter value",
            INV_ECM_ID => "unknown ECM_id value",
            CHANNEL_ID_IN_USE => "ECM_channel_id value already in use",
            STREAM_ID_IN_USE => "ECM_stream_id value already in use",
            ECM_ID_IN_USE => "ECM_id value already in use",
            UNKNOWN_ERROR => "unknown error",
            UNRECOVERABLE_ERROR => "unrecoverable error",
            _ => "unknown error code",
        }
    }
}

/// The ECMG <=> SCS protocol: versioned syntax table plus message dispatch.
pub struct Protocol {
    version: Version,
    syntax: codec::Protocol,
}

impl Protocol {
    pub fn new() -> Self {
        Self::with_version(CURRENT_VERSION)
    }

    /// Syntax for a specific DVB SimulCrypt version (2 and 3 share it).
    pub fn with_version(version: Version) -> Self {
        use tags::*;
        let mut syntax = codec::Protocol::with_version(version);

        syntax.add_parameter(CHANNEL_SETUP, SUPER_CAS_ID, 4, 4, 1, 1);
        syntax.add_parameter(CHANNEL_SETUP, ECM_CHANNEL_ID, 2, 2, 1, 1);

        syntax.add_parameter(CHANNEL_TEST, ECM_CHANNEL_ID, 2, 2, 1, 1);

        syntax.add_parameter(CHANNEL_STATUS, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, SECTION_TSPKT_FLAG, 1, 1, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, AC_DELAY_START, 2, 2, 0, 1);
        syntax.add_parameter(CHANNEL_STATUS, AC_DELAY_STOP, 2, 2, 0, 1);
        syntax.add_parameter(CHANNEL_STATUS, DELAY_START, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, DELAY_STOP, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, TRANSITION_DELAY_START, 2, 2, 0, 1);
        syntax.add_parameter(CHANNEL_STATUS, TRANSITION_DELAY_STOP, 2, 2, 0, 1);
        syntax.add_parameter(CHANNEL_STATUS, ECM_REP_PERIOD, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, MAX_STREAMS, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, MIN_CP_DURATION, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, LEAD_CW, 1, 1, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, CW_PER_MSG, 1, 1, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, MAX_COMP_TIME, 2, 2, 1, 1);

        syntax.add_parameter(CHANNEL_CLOSE, ECM_CHANNEL_ID, 2, 2, 1, 1);

        syntax.add_parameter(CHANNEL_ERROR, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_ERROR, ERROR_STATUS, 2, 2, 1, 0xFFFF);
        syntax.add_parameter(CHANNEL_ERROR, ERROR_INFORMATION, 2, 2, 0, 0xFFFF);

        syntax.add_parameter(STREAM_SETUP, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_SETUP, ECM_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_SETUP, ECM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_SETUP, NOMINAL_CP_DURATION, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_TEST, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_TEST, ECM_STREAM_ID, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_STATUS, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_STATUS, ECM_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_STATUS, ECM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_STATUS, ACCESS_CRITERIA_TRANSFER_MODE, 1, 1, 1, 1);

        syntax.add_parameter(STREAM_CLOSE_REQUEST, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_CLOSE_REQUEST, ECM_STREAM_ID, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_CLOSE_RESPONSE, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_CLOSE_RESPONSE, ECM_STREAM_ID, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_ERROR, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_ERROR, ECM_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_ERROR, ERROR_STATUS, 2, 2, 1, 0xFFFF);
        syntax.add_parameter(STREAM_ERROR, ERROR_INFORMATION, 2, 2, 0, 0xFFFF);

        syntax.add_parameter(CW_PROVISION, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(CW_PROVISION, ECM_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(CW_PROVISION, CP_NUMBER, 2, 2, 1, 1);
        syntax.add_parameter(CW_PROVISION, CW_ENCRYPTION, 0, 0xFFFF, 0, 1);
        syntax.add_parameter(CW_PROVISION, CP_CW_COMBINATION, 2, 0xFFFF, 0, 0xFFFF);
        syntax.add_parameter(CW_PROVISION, CP_DURATION, 2, 2, 0, 1);
        syntax.add_parameter(CW_PROVISION, ACCESS_CRITERIA, 0, 0xFFFF, 0, 1);

        syntax.add_parameter(ECM_RESPONSE, ECM_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(ECM_RESPONSE, ECM_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(ECM_RESPONSE, CP_NUMBER, 2, 2, 1, 1);
        syntax.add_parameter(ECM_RESPONSE, ECM_DATAGRAM, 0, 0xFFFF, 1, 1);

        Protocol { version, syntax }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Wrap a command body into a complete message of this protocol version.
    pub fn message(&self, body: Body) -> Message<Body> {
        Message { version: Some(self.version), body }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolDefinition for Protocol {
    type Body = Body;

    fn syntax(&self) -> &codec::Protocol {
        &self.syntax
    }

    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn build(&self, fact: &MessageFactory<'_>) -> Result<Body, InternalError> {
        Ok(match fact.command_tag() {
            tags::CHANNEL_SETUP => Body::ChannelSetup(ChannelSetup::from_factory(fact)?),
            tags::CHANNEL_TEST => Body::ChannelTest(ChannelTest::from_factory(fact)?),
            tags::CHANNEL_STATUS => Body::ChannelStatus(ChannelStatus::from_factory(fact)?),
            tags::CHANNEL_CLOSE => Body::ChannelClose(ChannelClose::from_factory(fact)?),
            tags::CHANNEL_ERROR => Body::ChannelError(ChannelError::from_factory(fact)?),
            tags::STREAM_SETUP => Body::StreamSetup(StreamSetup::from_factory(fact)?),
            tags::STREAM_TEST => Body::StreamTest(StreamTest::from_factory(fact)?),
            tags::STREAM_STATUS => Body::StreamStatus(StreamStatus::from_factory(fact)?),
            tags::STREAM_CLOSE_REQUEST => {
                Body::StreamCloseRequest(StreamCloseRequest::from_factory(fact)?)
            }
            tags::STREAM_CLOSE_RESPONSE => {
                Body::StreamCloseResponse(StreamCloseResponse::from_factory(fact)?)
            }
            tags::STREAM_ERROR => Body::StreamError(StreamError::from_factory(fact)?),
            tags::CW_PROVISION => Body::CwProvision(CwProvision::from_factory(fact)?),
            tags::ECM_RESPONSE => Body::EcmResponse(EcmResponse::from_factory(fact)?),
            other => {
                return Err(InternalError::new(format!(
                    "{PROTOCOL_NAME} message 0x{other:04X} unimplemented"
                )))
            }
        })
    }

    fn error_response(&self, fact: &MessageFactory<'_>) -> Body {
        // The canonical reply to an invalid message is a channel_error,
        // echoing the channel id of the faulty message when recoverable.
        let channel_id = fact.get_u16(tags::ECM_CHANNEL_ID).unwrap_or(0);
        let status = match fact.status() {
            Ok(()) | Err(TlvError::InvalidMessage { .. }) => errors::INV_MESSAGE,
            Err(TlvError::UnsupportedVersion { .. }) => errors::INV_PROTO_VERSION,
            Err(TlvError::UnknownCommandTag { .. }) => errors::INV_MESSAGE_TYPE,
            Err(TlvError::UnknownParameterTag { .. }) => errors::INV_PARAM_TYPE,
            Err(TlvError::InvalidParameterLength { .. }) => errors::INV_PARAM_LENGTH,
            Err(TlvError::InvalidParameterCount { .. }) | Err(TlvError::MissingParameter { .. }) => {
                errors::MISSING_PARAM
            }
        };
        Body::ChannelError(ChannelError {
            channel: ChannelHeader::new(channel_id),
            error_status: vec![status],
            error_information: vec![fact.error_information()],
        })
    }
}

/// channel_setup command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSetup {
    pub channel: ChannelHeader,
    pub super_cas_id: u32,
}

impl ChannelSetup {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelSetup {
            channel: ChannelHeader::from_factory(fact, tags::ECM_CHANNEL_ID)?,
            super_cas_id: fact.get_u32(tags::SUPER_CAS_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.channel.channel_id);
        zer.put_u32(tags::SUPER_CAS_ID, self.super_cas_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.channel.channel_id)
            + &dump_hexa(indent, "Super_CAS_id", self.super_cas_id)
    }
}

/// channel_test command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelTest {
    pub channel: ChannelHeader,
}

impl ChannelTest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelTest { channel: ChannelHeader::from_factory(fact, tags::ECM_CHANNEL_ID)? })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.channel.channel_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.channel.channel_id)
    }
}

/// channel_status command, the ECMG's negotiated channel parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    pub channel: ChannelHeader,
    pub section_tspkt_flag: bool,
    pub ac_delay_start: Option<i16>,
    pub ac_delay_stop: Option<i16>,
    pub delay_start: i16,
    pub delay_stop: i16,
    pub transition_delay_start: Option<i16>,
    pub transition_delay_stop: Option<i16>,
    pub ecm_rep_period: u16,
    pub max_streams: u16,
    pub min_cp_duration: u16,
    pub lead_cw: u8,
    pub cw_per_msg: u8,
    pub max_comp_time: u16,
}

impl ChannelStatus {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelStatus {
            channel: ChannelHeader::from_factory(fact, tags::ECM_CHANNEL_ID)?,
            section_tspkt_flag: fact.get_bool(tags::SECTION_TSPKT_FLAG)?,
            ac_delay_start: fact.get_i16_opt(tags::AC_DELAY_START)?,
            ac_delay_stop: fact.get_i16_opt(tags::AC_DELAY_STOP)?,
            delay_start: fact.get_i16(tags::DELAY_START)?,
            delay_stop: fact.get_i16(tags::DELAY_STOP)?,
            transition_delay_start: fact.get_i16_opt(tags::TRANSITION_DELAY_START)?,
            transition_delay_stop: fact.get_i16_opt(tags::TRANSITION_DELAY_STOP)?,
            ecm_rep_period: fact.get_u16(tags::ECM_REP_PERIOD)?,
            max_streams: fact.get_u16(tags::MAX_STREAMS)?,
            min_cp_duration: fact.get_u16(tags::MIN_CP_DURATION)?,
            lead_cw: fact.get_u8(tags::LEAD_CW)?,
            cw_per_msg: fact.get_u8(tags::CW_PER_MSG)?,
            max_comp_time: fact.get_u16(tags::MAX_COMP_TIME)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.channel.channel_id);
        zer.put_bool(tags::SECTION_TSPKT_FLAG, self.section_tspkt_flag);
        if let Some(v) = self.ac_delay_start {
            zer.put_i16(tags::AC_DELAY_START, v);
        }
        if let Some(v) = self.ac_delay_stop {
            zer.put_i16(tags::AC_DELAY_STOP, v);
        }
        zer.put_i16(tags::DELAY_START, self.delay_start);
        zer.put_i16(tags::DELAY_STOP, self.delay_stop);
        if let Some(v) = self.transition_delay_start {
            zer.put_i16(tags::TRANSITION_DELAY_START, v);
        }
        if let Some(v) = self.transition_delay_stop {
            zer.put_i16(tags::TRANSITION_DELAY_STOP, v);
        }
        zer.put_u16(tags::ECM_REP_PERIOD, self.ecm_rep_period);
        zer.put_u16(tags::MAX_STREAMS, self.max_streams);
        zer.put_u16(tags::MIN_CP_DURATION, self.min_cp_duration);
        zer.put_u8(tags::LEAD_CW, self.lead_cw);
        zer.put_u8(tags::CW_PER_MSG, self.cw_per_msg);
        zer.put_u16(tags::MAX_COMP_TIME, self.max_comp_time);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.channel.channel_id)
            + &dump_decimal(indent, "section_TSpkt_flag", u8::from(self.section_tspkt_flag))
            + &dump_optional_decimal(indent, "AC_delay_start", &self.ac_delay_start)
            + &dump_optional_decimal(indent, "AC_delay_stop", &self.ac_delay_stop)
            + &dump_decimal(indent, "delay_start", self.delay_start)
            + &dump_decimal(indent, "delay_stop", self.delay_stop)
            + &dump_optional_decimal(indent, "transition_delay_start", &self.transition_delay_start)
            + &dump_optional_decimal(indent, "transition_delay_stop", &self.transition_delay_stop)
            + &dump_decimal(indent, "ECM_rep_period", self.ecm_rep_period)
            + &dump_decimal(indent, "max_streams", self.max_streams)
            + &dump_decimal(indent, "min_CP_duration", self.min_cp_duration)
            + &dump_decimal(indent, "lead_CW", self.lead_cw)
            + &dump_decimal(indent, "CW_per_msg", self.cw_per_msg)
            + &dump_decimal(indent, "max_comp_time", self.max_comp_time)
    }
}

/// channel_close command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelClose {
    pub channel: ChannelHeader,
}

impl ChannelClose {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelClose { channel: ChannelHeader::from_factory(fact, tags::ECM_CHANNEL_ID)? })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.channel.channel_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.channel.channel_id)
    }
}

/// channel_error command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelError {
    pub channel: ChannelHeader,
    pub error_status: Vec<u16>,
    pub error_information: Vec<u16>,
}

impl ChannelError {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelError {
            channel: ChannelHeader::from_factory(fact, tags::ECM_CHANNEL_ID)?,
            error_status: fact.get_u16_all(tags::ERROR_STATUS)?,
            error_information: fact.get_u16_all(tags::ERROR_INFORMATION)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.channel.channel_id);
        zer.put_u16_all(tags::ERROR_STATUS, &self.error_status);
        zer.put_u16_all(tags::ERROR_INFORMATION, &self.error_information);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.channel.channel_id)
            + &dump_vector(indent, "error_status", &self.error_status, Some(errors::name))
            + &dump_vector(indent, "error_information", &self.error_information, None)
    }
}

/// stream_setup command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSetup {
    pub stream: StreamHeader,
    pub ecm_id: u16,
    /// Nominal crypto-period duration in tenths of a second.
    pub nominal_cp_duration: u16,
}

impl StreamSetup {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamSetup {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
            ecm_id: fact.get_u16(tags::ECM_ID)?,
            nominal_cp_duration: fact.get_u16(tags::NOMINAL_CP_DURATION)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
        zer.put_u16(tags::ECM_ID, self.ecm_id);
        zer.put_u16(tags::NOMINAL_CP_DURATION, self.nominal_cp_duration);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
            + &dump_hexa(indent, "ECM_id", self.ecm_id)
            + &dump_decimal(indent, "nominal_CP_duration", self.nominal_cp_duration)
    }
}

/// stream_test command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamTest {
    pub stream: StreamHeader,
}

impl StreamTest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamTest {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
    }
}

/// stream_status command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamStatus {
    pub stream: StreamHeader,
    pub ecm_id: u16,
    pub access_criteria_transfer_mode: bool,
}

impl StreamStatus {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamStatus {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
            ecm_id: fact.get_u16(tags::ECM_ID)?,
            access_criteria_transfer_mode: fact.get_bool(tags::ACCESS_CRITERIA_TRANSFER_MODE)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
        zer.put_u16(tags::ECM_ID, self.ecm_id);
        zer.put_bool(tags::ACCESS_CRITERIA_TRANSFER_MODE, self.access_criteria_transfer_mode);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
            + &dump_hexa(indent, "ECM_id", self.ecm_id)
            + &dump_decimal(
                indent,
                "access_criteria_transfer_mode",
                u8::from(self.access_criteria_transfer_mode),
            )
    }
}

/// stream_close_request command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamCloseRequest {
    pub stream: StreamHeader,
}

impl StreamCloseRequest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamCloseRequest {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
    }
}

/// stream_close_response command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamCloseResponse {
    pub stream: StreamHeader,
}

impl StreamCloseResponse {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamCloseResponse {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
    }
}

/// stream_error command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamError {
    pub stream: StreamHeader,
    pub error_status: Vec<u16>,
    pub error_information: Vec<u16>,
}

impl StreamError {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamError {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
            error_status: fact.get_u16_all(tags::ERROR_STATUS)?,
            error_information: fact.get_u16_all(tags::ERROR_INFORMATION)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
        zer.put_u16_all(tags::ERROR_STATUS, &self.error_status);
        zer.put_u16_all(tags::ERROR_INFORMATION, &self.error_information);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
            + &dump_vector(indent, "error_status", &self.error_status, Some(errors::name))
            + &dump_vector(indent, "error_information", &self.error_information, None)
    }
}

/// One (crypto-period, control-word) pair of a CW_provision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpCwCombination {
    pub cp: u16,
    pub cw: Vec<u8>,
}

impl CpCwCombination {
    pub fn new(cp: u16, cw: Vec<u8>) -> Self {
        CpCwCombination { cp, cw }
    }
}

/// CW_provision command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CwProvision {
    pub stream: StreamHeader,
    pub cp_number: u16,
    pub cw_encryption: Option<Vec<u8>>,
    pub cp_cw_combination: Vec<CpCwCombination>,
    /// Crypto-period duration in tenths of a second.
    pub cp_duration: Option<u16>,
    pub access_criteria: Option<Vec<u8>>,
}

impl CwProvision {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        // The CP/CW combination value is a 2-byte CP number followed by a
        // variable-length control word; the minimum size is enforced by the
        // syntax table.
        let cp_cw_combination = fact
            .get_params(tags::CP_CW_COMBINATION)
            .iter()
            .map(|view| {
                let value = fact.bytes(view);
                CpCwCombination { cp: BigEndian::read_u16(value), cw: value[2..].to_vec() }
            })
            .collect();
        Ok(CwProvision {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
            cp_number: fact.get_u16(tags::CP_NUMBER)?,
            cw_encryption: fact.get_bytes_opt(tags::CW_ENCRYPTION)?,
            cp_cw_combination,
            cp_duration: fact.get_u16_opt(tags::CP_DURATION)?,
            access_criteria: fact.get_bytes_opt(tags::ACCESS_CRITERIA)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
        zer.put_u16(tags::CP_NUMBER, self.cp_number);
        if let Some(cw_encryption) = &self.cw_encryption {
            zer.put_bytes(tags::CW_ENCRYPTION, cw_encryption);
        }
        if let Some(cp_duration) = self.cp_duration {
            zer.put_u16(tags::CP_DURATION, cp_duration);
        }
        if let Some(access_criteria) = &self.access_criteria {
            zer.put_bytes(tags::ACCESS_CRITERIA, access_criteria);
        }
        for combination in &self.cp_cw_combination {
            zer.open_tlv(tags::CP_CW_COMBINATION);
            zer.append_u16(combination.cp);
            zer.append_bytes(&combination.cw);
            zer.close_tlv();
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        let mut out = dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
            + &dump_decimal(indent, "CP_number", self.cp_number)
            + &dump_optional_bytes(indent, "CW_encryption", &self.cw_encryption)
            + &dump_optional_decimal(indent, "CP_duration", &self.cp_duration)
            + &dump_optional_bytes(indent, "access_criteria", &self.access_criteria);
        for combination in &self.cp_cw_combination {
            out.push_str(&dump_decimal(indent, "CP", combination.cp));
            out.push_str(&dump_bytes(indent, "CW", &combination.cw));
        }
        out
    }
}

/// ECM_response command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EcmResponse {
    pub stream: StreamHeader,
    pub cp_number: u16,
    /// ECM as section or TS packets, depending on the channel mode.
    pub ecm_datagram: Vec<u8>,
}

impl EcmResponse {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(EcmResponse {
            stream: StreamHeader::from_factory(fact, tags::ECM_CHANNEL_ID, tags::ECM_STREAM_ID)?,
            cp_number: fact.get_u16(tags::CP_NUMBER)?,
            ecm_datagram: fact.get_bytes(tags::ECM_DATAGRAM)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::ECM_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::ECM_STREAM_ID, self.stream.stream_id);
        zer.put_u16(tags::CP_NUMBER, self.cp_number);
        zer.put_bytes(tags::ECM_DATAGRAM, &self.ecm_datagram);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "ECM_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "ECM_stream_id", self.stream.stream_id)
            + &dump_decimal(indent, "CP_number", self.cp_number)
            + &dump_bytes(indent, "ECM_datagram", &self.ecm_datagram)
    }
}

/// All ECMG <=> SCS commands, discriminated by the command tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    ChannelSetup(ChannelSetup),
    ChannelTest(ChannelTest),
    ChannelStatus(ChannelStatus),
    ChannelClose(ChannelClose),
    ChannelError(ChannelError),
    StreamSetup(StreamSetup),
    StreamTest(StreamTest),
    StreamStatus(StreamStatus),
    StreamCloseRequest(StreamCloseRequest),
    StreamCloseResponse(StreamCloseResponse),
    StreamError(StreamError),
    CwProvision(CwProvision),
    EcmResponse(EcmResponse),
}

impl codec::Body for Body {
    fn tag(&self) -> Tag {
        match self {
            Body::ChannelSetup(_) => tags::CHANNEL_SETUP,
            Body::ChannelTest(_) => tags::CHANNEL_TEST,
            Body::ChannelStatus(_) => tags::CHANNEL_STATUS,
            Body::ChannelClose(_) => tags::CHANNEL_CLOSE,
            Body::ChannelError(_) => tags::CHANNEL_ERROR,
            Body::StreamSetup(_) => tags::STREAM_SETUP,
            Body::StreamTest(_) => tags::STREAM_TEST,
            Body::StreamStatus(_) => tags::STREAM_STATUS,
            Body::StreamCloseRequest(_) => tags::STREAM_CLOSE_REQUEST,
            Body::StreamCloseResponse(_) => tags::STREAM_CLOSE_RESPONSE,
            Body::StreamError(_) => tags::STREAM_ERROR,
            Body::CwProvision(_) => tags::CW_PROVISION,
            Body::EcmResponse(_) => tags::ECM_RESPONSE,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Body::ChannelSetup(_) => "channel_setup",
            Body::ChannelTest(_) => "channel_test",
            Body::ChannelStatus(_) => "channel_status",
            Body::ChannelClose(_) => "channel_close",
            Body::ChannelError(_) => "channel_error",
            Body::StreamSetup(_) => "stream_setup",
            Body::StreamTest(_) => "stream_test",
            Body::StreamStatus(_) => "stream_status",
            Body::StreamCloseRequest(_) => "stream_close_request",
            Body::StreamCloseResponse(_) => "stream_close_response",
            Body::StreamError(_) => "stream_error",
            Body::CwProvision(_) => "CW_provision",
            Body::EcmResponse(_) => "ECM_response",
        }
    }

    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        match self {
            Body::ChannelSetup(msg) => msg.serialize_parameters(zer),
            Body::ChannelTest(msg) => msg.serialize_parameters(zer),
            Body::ChannelStatus(msg) => msg.serialize_parameters(zer),
            Body::ChannelClose(msg) => msg.serialize_parameters(zer),
            Body::ChannelError(msg) => msg.serialize_parameters(zer),
            Body::StreamSetup(msg) => msg.serialize_parameters(zer),
            Body::StreamTest(msg) => msg.serialize_parameters(zer),
            Body::StreamStatus(msg) => msg.serialize_parameters(zer),
            Body::StreamCloseRequest(msg) => msg.serialize_parameters(zer),
            Body::StreamCloseResponse(msg) => msg.serialize_parameters(zer),
            Body::StreamError(msg) => msg.serialize_parameters(zer),
            Body::CwProvision(msg) => msg.serialize_parameters(zer),
            Body::EcmResponse(msg) => msg.serialize_parameters(zer),
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        match self {
            Body::ChannelSetup(msg) => msg.dump_fields(indent),
            Body::ChannelTest(msg) => msg.dump_fields(indent),
            Body::ChannelStatus(msg) => msg.dump_fields(indent),
            Body::ChannelClose(msg) => msg.dump_fields(indent),
            Body::ChannelError(msg) => msg.dump_fields(indent),
            Body::StreamSetup(msg) => msg.dump_fields(indent),
            Body::StreamTest(msg) => msg.dump_fields(indent),
            Body::StreamStatus(msg) => msg.dump_fields(indent),
            Body::StreamCloseRequest(msg) => msg.dump_fields(indent),
            Body::StreamCloseResponse(msg) => msg.dump_fields(indent),
            Body::StreamError(msg) => msg.dump_fields(indent),
            Body::CwProvision(msg) => msg.dump_fields(indent),
            Body::EcmResponse(msg) => msg.dump_fields(indent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference_channel_status() -> ChannelStatus {
        ChannelStatus {
            channel: ChannelHeader::new(2),
            section_tspkt_flag: true,
            ac_delay_start: Some(-200),
            ac_delay_stop: Some(-200),
            delay_start: -300,
            delay_stop: 100,
            transition_delay_start: Some(-500),
            transition_delay_stop: Some(100),
            ecm_rep_period: 100,
            max_streams: 2,
            min_cp_duration: 10,
            lead_cw: 1,
            cw_per_msg: 2,
            max_comp_time: 500,
        }
    }

    const CHANNEL_STATUS_BYTES: &[u8] = &[
        0x03, //
        0x00, 0x03, 0x00, 0x51, // channel_status, 0x51 bytes
        0x00, 0x0E, 0x00, 0x02, 0x00, 0x02, //
        0x00, 0x02, 0x00, 0x01, 0x01, //
        0x00, 0x16, 0x00, 0x02, 0xFF, 0x38, //
        0x00, 0x17, 0x00, 0x02, 0xFF, 0x38, //
        0x00, 0x03, 0x00, 0x02, 0xFE, 0xD4, //
        0x00, 0x04, 0x00, 0x02, 0x00, 0x64, //
        0x00, 0x05, 0x00, 0x02, 0xFE, 0x0C, //
        0x00, 0x06, 0x00, 0x02, 0x00, 0x64, //
        0x00, 0x07, 0x00, 0x02, 0x00, 0x64, //
        0x00, 0x08, 0x00, 0x02, 0x00, 0x02, //
        0x00, 0x09, 0x00, 0x02, 0x00, 0x0A, //
        0x00, 0x0A, 0x00, 0x01, 0x01, //
        0x00, 0x0B, 0x00, 0x01, 0x02, //
        0x00, 0x0C, 0x00, 0x02, 0x01, 0xF4,
    ];

    #[test]
    fn channel_status_serializes_to_reference_bytes() {
        let protocol = Protocol::new();
        let message = protocol.message(Body::ChannelStatus(reference_channel_status()));
        assert_eq!(message.to_bytes(), CHANNEL_STATUS_BYTES);
    }

    #[test]
    fn channel_status_deserializes_from_reference_bytes() {
        let protocol = Protocol::new();
        let fact = MessageFactory::new(CHANNEL_STATUS_BYTES, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(fact.command_tag(), tags::CHANNEL_STATUS);
        let body = protocol.build(&fact).unwrap();
        assert_eq!(body, Body::ChannelStatus(reference_channel_status()));
    }

    #[test]
    fn channel_status_dump_matches_reference() {
        let protocol = Protocol::new();
        let message = protocol.message(Body::ChannelStatus(reference_channel_status()));
        let expected = "  channel_status (ECMG<=>SCS)\n\
                        \x20 protocol_version = 0x03\n\
                        \x20 message_type = 0x0003\n\
                        \x20 ECM_channel_id = 0x0002\n\
                        \x20 section_TSpkt_flag = 1\n\
                        \x20 AC_delay_start = -200\n\
                        \x20 AC_delay_stop = -200\n\
                        \x20 delay_start = -300\n\
                        \x20 delay_stop = 100\n\
                        \x20 transition_delay_start = -500\n\
                        \x20 transition_delay_stop = 100\n\
                        \x20 ECM_rep_period = 100\n\
                        \x20 max_streams = 2\n\
                        \x20 min_CP_duration = 10\n\
                        \x20 lead_CW = 1\n\
                        \x20 CW_per_msg = 2\n\
                        \x20 max_comp_time = 500\n";
        assert_eq!(message.dump(2), expected);
    }

    #[test]
    fn stream_error_round_trip() {
        let protocol = Protocol::new();
        let reference = StreamError {
            stream: StreamHeader::new(2, 3),
            error_status: vec![errors::INV_ECM_ID, errors::OUT_OF_COMPUTE],
            error_information: vec![0x1234],
        };
        let bytes = protocol.message(Body::StreamError(reference.clone())).to_bytes();
        let expected: &[u8] = &[
            0x03, //
            0x01, 0x06, 0x00, 0x1E, //
            0x00, 0x0E, 0x00, 0x02, 0x00, 0x02, //
            0x00, 0x0F, 0x00, 0x02, 0x00, 0x03, //
            0x70, 0x00, 0x00, 0x02, 0x00, 0x12, //
            0x70, 0x00, 0x00, 0x02, 0x00, 0x0D, //
            0x70, 0x01, 0x00, 0x02, 0x12, 0x34,
        ];
        assert_eq!(bytes, expected);

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::StreamError(reference));
    }

    #[test]
    fn cw_provision_round_trip() {
        let protocol = Protocol::new();
        let reference = CwProvision {
            stream: StreamHeader::new(7, 9),
            cp_number: 41,
            cw_encryption: None,
            cp_cw_combination: vec![
                CpCwCombination::new(41, vec![0x11; 8]),
                CpCwCombination::new(42, vec![0x22; 8]),
            ],
            cp_duration: Some(100),
            access_criteria: Some(vec![0xDE, 0xAD]),
        };
        let bytes = protocol.message(Body::CwProvision(reference.clone())).to_bytes();
        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::CwProvision(reference));
    }

    #[test]
    fn wrong_version_maps_to_inv_proto_version() {
        let protocol = Protocol::new();
        let mut bytes =
            protocol.message(Body::ChannelSetup(ChannelSetup::default())).to_bytes();
        bytes[0] = 0x02;
        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Err(TlvError::UnsupportedVersion { offset: 0 }));
        assert_eq!(fact.error_information(), 0);

        let response = protocol.error_response(&fact);
        match response {
            Body::ChannelError(err) => {
                assert_eq!(err.error_status, vec![errors::INV_PROTO_VERSION]);
                assert_eq!(err.error_information, vec![0]);
                assert_eq!(err.channel.channel_id, 0);
            }
            other => panic!("expected channel_error, got {other:?}"),
        }
    }

    #[test]
    fn error_response_echoes_channel_id_when_parseable() {
        let protocol = Protocol::new();
        // channel_test with one undeclared parameter: the channel id itself
        // is still recovered for the error reply.
        let mut zer = codec::Serializer::new();
        zer.append_u8(CURRENT_VERSION);
        zer.open_tlv(tags::CHANNEL_TEST);
        zer.put_u16(tags::ECM_CHANNEL_ID, 0x0042);
        zer.put_u8(0x0FFF, 1);
        zer.close_tlv();
        let bytes = zer.finish();

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert!(matches!(fact.status(), Err(TlvError::UnknownParameterTag { .. })));
        match protocol.error_response(&fact) {
            Body::ChannelError(err) => {
                assert_eq!(err.channel.channel_id, 0x0042);
                assert_eq!(err.error_status, vec![errors::INV_PARAM_TYPE]);
            }
            other => panic!("expected channel_error, got {other:?}"),
        }
    }

    #[test]
    fn command_tag_ranges() {
        assert!(is_valid_command(0x0001));
        assert!(is_valid_command(0x0106));
        assert!(is_valid_command(0x0202));
        assert!(!is_valid_command(0x0000));
        assert!(!is_valid_command(0x0107));
        assert!(!is_valid_command(0x0203));
    }
}
