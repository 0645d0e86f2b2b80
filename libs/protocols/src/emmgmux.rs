//! DVB SimulCrypt EMMG/PDG <=> MUX protocol.

use codec::message::{dump_decimal, dump_optional_decimal, dump_vector};
use codec::{
    message::dump_hexa, ChannelHeader, InternalError, Message, MessageFactory, ProtocolDefinition,
    StreamHeader, Tag, TlvError, Version,
};

const PROTOCOL_NAME: &str = "EMMG/PDG<=>MUX";

/// Current version of the EMMG/PDG <=> MUX protocol.
pub const CURRENT_VERSION: Version = 0x03;

/// True when `tag` is a command of the EMMG/PDG <=> MUX protocol.
pub fn is_valid_command(tag: u16) -> bool {
    (0x0011..=0x0015).contains(&tag) || (0x0111..=0x0118).contains(&tag) || tag == 0x0211
}

/// Command and parameter tags, fixed by ETSI TS 103 197.
pub mod tags {
    use codec::Tag;

    pub const CHANNEL_SETUP: Tag = 0x0011;
    pub const CHANNEL_TEST: Tag = 0x0012;
    pub const CHANNEL_STATUS: Tag = 0x0013;
    pub const CHANNEL_CLOSE: Tag = 0x0014;
    pub const CHANNEL_ERROR: Tag = 0x0015;
    pub const STREAM_SETUP: Tag = 0x0111;
    pub const STREAM_TEST: Tag = 0x0112;
    pub const STREAM_STATUS: Tag = 0x0113;
    pub const STREAM_CLOSE_REQUEST: Tag = 0x0114;
    pub const STREAM_CLOSE_RESPONSE: Tag = 0x0115;
    pub const STREAM_ERROR: Tag = 0x0116;
    pub const STREAM_BW_REQUEST: Tag = 0x0117;
    pub const STREAM_BW_ALLOCATION: Tag = 0x0118;
    pub const DATA_PROVISION: Tag = 0x0211;

    pub const CLIENT_ID: Tag = 0x0001;
    pub const SECTION_TSPKT_FLAG: Tag = 0x0002;
    pub const DATA_CHANNEL_ID: Tag = 0x0003;
    pub const DATA_STREAM_ID: Tag = 0x0004;
    pub const DATAGRAM: Tag = 0x0005;
    pub const BANDWIDTH: Tag = 0x0006;
    pub const DATA_TYPE: Tag = 0x0007;
    pub const DATA_ID: Tag = 0x0008;
    pub const ERROR_STATUS: Tag = 0x7000;
    pub const ERROR_INFORMATION: Tag = 0x7001;
}

/// EMMG/PDG <=> MUX error status values.
pub mod errors {
    pub const INV_MESSAGE: u16 = 0x0001;
    pub const INV_PROTO_VERSION: u16 = 0x0002;
    pub const INV_MESSAGE_TYPE: u16 = 0x0003;
    pub const MESSAGE_TOO_LONG: u16 = 0x0004;
    pub const INV_DATA_STREAM_ID: u16 = 0x0005;
    pub const INV_DATA_CHANNEL_ID: u16 = 0x0006;
    pub const TOO_MANY_CHANNELS: u16 = 0x0007;
    pub const TOO_MANY_STM_CHAN: u16 = 0x0008;
    pub const TOO_MANY_STM_MUX: u16 = 0x0009;
    pub const INV_PARAM_TYPE: u16 = 0x000A;
    pub const INV_PARAM_LENGTH: u16 = 0x000B;
    pub const MISSING_PARAM: u16 = 0x000C;
    pub const INV_PARAM_VALUE: u16 = 0x000D;
    pub const INV_CLIENT_ID: u16 = 0x000E;
    pub const EXCEEDED_BW: u16 = 0x000F;
    pub const INV_DATA_ID: u16 = 0x0010;
    pub const CHANNEL_ID_IN_USE: u16 = 0x0011;
    pub const STREAM_ID_IN_USE: u16 = 0x0012;
    pub const DATA_ID_IN_USE: u16 = 0x0013;
    pub const CLIENT_ID_IN_USE: u16 = 0x0014;
    pub const UNKNOWN_ERROR: u16 = 0x7000;
    pub const UNRECOVERABLE_ERROR: u16 = 0x7001;

    /// Readable label for a status code, for dumps and logs.
    pub fn name(status: u16) -> &'static str {
        match status {
            INV_MESSAGE => "invalid message",
            INV_PROTO_VERSION => "invalid protocol version",
            INV_MESSAGE_TYPE => "invalid message type",
            MESSAGE_TOO_LONG => "message too long",
            INV_DATA_STREAM_ID => "invalid data_stream_id",
            INV_DATA_CHANNEL_ID => "invalid data_channel_id",
            TOO_MANY_CHANNELS => "too many channels on this MUX",
            TOO_MANY_STM_CHAN => "too many streams on this channel",
            TOO_MANY_STM_MUX => "too many streams on this MUX",
            INV_PARAM_TYPE => "invalid parameter type",
            INV_PARAM_LENGTH => "invalid parameter length",
            MISSING_PARAM => "missing mandatory parameter",
            INV_PARAM_VALUE => "invalid parameter value",
            INV_CLIENT_ID => "invalid client_id",
            EXCEEDED_BW => "exceeded bandwidth",
            INV_DATA_ID => "invalid data_id",
            CHANNEL_ID_IN_USE => "data_channel_id value already in use",
            STREAM_ID_IN_USE => "data_stream_id value already in use",
            DATA_ID_IN_USE => "data_id value already in use",
            CLIENT_ID_IN_USE => "client_id value already in use",
            UNKNOWN_ERROR => "unknown error",
            UNRECOVERABLE_ERROR => "unrecoverable error",
            _ => "unknown error code",
        }
    }
}

/// EMMG <=> MUX data types carried by `data_type`.
pub mod data_types {
    pub const EMM: u8 = 0x00;
    pub const PRIVATE: u8 = 0x01;
    /// DVB-reserved.
    pub const ECM: u8 = 0x02;
}

/// Placeholder for the channel and stream ids of a `data_provision` received
/// without them (UDP case). Carried verbatim from the reference
/// implementation; treated as a sentinel, never as a real id.
pub const NO_ID: u16 = 0xFFFF;

/// The EMMG/PDG <=> MUX protocol: versioned syntax table plus dispatch.
pub struct Protocol {
    version: Version,
    syntax: codec::Protocol,
}

impl Protocol {
    pub fn new() -> Self {
        Self::with_version(CURRENT_VERSION)
    }

    pub fn with_version(version: Version) -> Self {
        use tags::*;
        let mut syntax = codec::Protocol::with_version(version);

        syntax.add_parameter(CHANNEL_SETUP, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(CHANNEL_SETUP, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_SETUP, SECTION_TSPKT_FLAG, 1, 1, 1, 1);

        syntax.add_parameter(CHANNEL_TEST, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(CHANNEL_TEST, DATA_CHANNEL_ID, 2, 2, 1, 1);

        syntax.add_parameter(CHANNEL_STATUS, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_STATUS, SECTION_TSPKT_FLAG, 1, 1, 1, 1);

        syntax.add_parameter(CHANNEL_CLOSE, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(CHANNEL_CLOSE, DATA_CHANNEL_ID, 2, 2, 1, 1);

        syntax.add_parameter(CHANNEL_ERROR, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(CHANNEL_ERROR, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(CHANNEL_ERROR, ERROR_STATUS, 2, 2, 1, 0xFFFF);
        syntax.add_parameter(CHANNEL_ERROR, ERROR_INFORMATION, 2, 2, 0, 0xFFFF);

        syntax.add_parameter(STREAM_SETUP, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_SETUP, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_SETUP, DATA_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_SETUP, DATA_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_SETUP, DATA_TYPE, 1, 1, 1, 1);

        syntax.add_parameter(STREAM_TEST, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_TEST, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_TEST, DATA_STREAM_ID, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_STATUS, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_STATUS, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_STATUS, DATA_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_STATUS, DATA_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_STATUS, DATA_TYPE, 1, 1, 1, 1);

        syntax.add_parameter(STREAM_CLOSE_REQUEST, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_CLOSE_REQUEST, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_CLOSE_REQUEST, DATA_STREAM_ID, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_CLOSE_RESPONSE, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_CLOSE_RESPONSE, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_CLOSE_RESPONSE, DATA_STREAM_ID, 2, 2, 1, 1);

        syntax.add_parameter(STREAM_ERROR, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_ERROR, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_ERROR, DATA_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_ERROR, ERROR_STATUS, 2, 2, 1, 0xFFFF);
        syntax.add_parameter(STREAM_ERROR, ERROR_INFORMATION, 2, 2, 0, 0xFFFF);

        syntax.add_parameter(STREAM_BW_REQUEST, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_BW_REQUEST, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_BW_REQUEST, DATA_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_BW_REQUEST, BANDWIDTH, 2, 2, 0, 1);

        syntax.add_parameter(STREAM_BW_ALLOCATION, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(STREAM_BW_ALLOCATION, DATA_CHANNEL_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_BW_ALLOCATION, DATA_STREAM_ID, 2, 2, 1, 1);
        syntax.add_parameter(STREAM_BW_ALLOCATION, BANDWIDTH, 2, 2, 0, 1);

        // On TCP the channel and stream ids are required, on UDP forbidden;
        // the syntax accepts both and the deserializer substitutes NO_ID.
        syntax.add_parameter(DATA_PROVISION, CLIENT_ID, 4, 4, 1, 1);
        syntax.add_parameter(DATA_PROVISION, DATA_CHANNEL_ID, 2, 2, 0, 1);
        syntax.add_parameter(DATA_PROVISION, DATA_STREAM_ID, 2, 2, 0, 1);
        syntax.add_parameter(DATA_PROVISION, DATA_ID, 2, 2, 1, 1);
        syntax.add_parameter(DATA_PROVISION, DATAGRAM, 0, 0xFFFF, 1, 0xFFFF);

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
            tags::STREAM_BW_REQUEST => Body::StreamBwRequest(StreamBwRequest::from_factory(fact)?),
            tags::STREAM_BW_ALLOCATION => {
                Body::StreamBwAllocation(StreamBwAllocation::from_factory(fact)?)
            }
            tags::DATA_PROVISION => Body::DataProvision(DataProvision::from_factory(fact)?),
            other => {
                return Err(InternalError::new(format!(
                    "{PROTOCOL_NAME} message 0x{other:04X} unimplemented"
                )))
            }
        })
    }

    fn error_response(&self, fact: &MessageFactory<'_>) -> Body {
        let channel_id = fact.get_u16(tags::DATA_CHANNEL_ID).unwrap_or(0);
        let client_id = fact.get_u32(tags::CLIENT_ID).unwrap_or(0);
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
            client_id,
            error_status: vec![status],
            error_information: vec![fact.error_information()],
        })
    }
}

/// channel_setup command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSetup {
    pub channel: ChannelHeader,
    pub client_id: u32,
    /// 0 = sections, 1 = TS packets.
    pub section_tspkt_flag: bool,
}

impl ChannelSetup {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelSetup {
            channel: ChannelHeader::from_factory(fact, tags::DATA_CHANNEL_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            section_tspkt_flag: fact.get_bool(tags::SECTION_TSPKT_FLAG)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.channel.channel_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_bool(tags::SECTION_TSPKT_FLAG, self.section_tspkt_flag);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.channel.channel_id)
            + &dump_decimal(indent, "section_TSpkt_flag", u8::from(self.section_tspkt_flag))
    }
}

/// channel_test command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelTest {
    pub channel: ChannelHeader,
    pub client_id: u32,
}

impl ChannelTest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelTest {
            channel: ChannelHeader::from_factory(fact, tags::DATA_CHANNEL_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.channel.channel_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.channel.channel_id)
    }
}

/// channel_status command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    pub channel: ChannelHeader,
    pub client_id: u32,
    pub section_tspkt_flag: bool,
}

impl ChannelStatus {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelStatus {
            channel: ChannelHeader::from_factory(fact, tags::DATA_CHANNEL_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            section_tspkt_flag: fact.get_bool(tags::SECTION_TSPKT_FLAG)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.channel.channel_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_bool(tags::SECTION_TSPKT_FLAG, self.section_tspkt_flag);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.channel.channel_id)
            + &dump_decimal(indent, "section_TSpkt_flag", u8::from(self.section_tspkt_flag))
    }
}

/// channel_close command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelClose {
    pub channel: ChannelHeader,
    pub client_id: u32,
}

impl ChannelClose {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelClose {
            channel: ChannelHeader::from_factory(fact, tags::DATA_CHANNEL_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.channel.channel_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.channel.channel_id)
    }
}

/// channel_error command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelError {
    pub channel: ChannelHeader,
    pub client_id: u32,
    pub error_status: Vec<u16>,
    pub error_information: Vec<u16>,
}

impl ChannelError {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(ChannelError {
            channel: ChannelHeader::from_factory(fact, tags::DATA_CHANNEL_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            error_status: fact.get_u16_all(tags::ERROR_STATUS)?,
            error_information: fact.get_u16_all(tags::ERROR_INFORMATION)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.channel.channel_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_u16_all(tags::ERROR_STATUS, &self.error_status);
        zer.put_u16_all(tags::ERROR_INFORMATION, &self.error_information);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.channel.channel_id)
            + &dump_vector(indent, "error_status", &self.error_status, Some(errors::name))
            + &dump_vector(indent, "error_information", &self.error_information, None)
    }
}

/// stream_setup command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSetup {
    pub stream: StreamHeader,
    pub client_id: u32,
    pub data_id: u16,
    pub data_type: u8,
}

impl StreamSetup {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamSetup {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            data_id: fact.get_u16(tags::DATA_ID)?,
            data_type: fact.get_u8(tags::DATA_TYPE)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_u16(tags::DATA_ID, self.data_id);
        zer.put_u8(tags::DATA_TYPE, self.data_type);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
            + &dump_hexa(indent, "data_id", self.data_id)
            + &dump_hexa(indent, "data_type", self.data_type)
    }
}

/// stream_test command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamTest {
    pub stream: StreamHeader,
    pub client_id: u32,
}

impl StreamTest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamTest {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
    }
}

/// stream_status command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamStatus {
    pub stream: StreamHeader,
    pub client_id: u32,
    pub data_id: u16,
    pub data_type: u8,
}

impl StreamStatus {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamStatus {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            data_id: fact.get_u16(tags::DATA_ID)?,
            data_type: fact.get_u8(tags::DATA_TYPE)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_u16(tags::DATA_ID, self.data_id);
        zer.put_u8(tags::DATA_TYPE, self.data_type);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
            + &dump_hexa(indent, "data_id", self.data_id)
            + &dump_hexa(indent, "data_type", self.data_type)
    }
}

/// stream_close_request command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamCloseRequest {
    pub stream: StreamHeader,
    pub client_id: u32,
}

impl StreamCloseRequest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamCloseRequest {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
    }
}

/// stream_close_response command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamCloseResponse {
    pub stream: StreamHeader,
    pub client_id: u32,
}

impl StreamCloseResponse {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamCloseResponse {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
    }
}

/// stream_error command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamError {
    pub stream: StreamHeader,
    pub client_id: u32,
    pub error_status: Vec<u16>,
    pub error_information: Vec<u16>,
}

impl StreamError {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamError {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            error_status: fact.get_u16_all(tags::ERROR_STATUS)?,
            error_information: fact.get_u16_all(tags::ERROR_INFORMATION)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_u16_all(tags::ERROR_STATUS, &self.error_status);
        zer.put_u16_all(tags::ERROR_INFORMATION, &self.error_information);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
            + &dump_vector(indent, "error_status", &self.error_status, Some(errors::name))
            + &dump_vector(indent, "error_information", &self.error_information, None)
    }
}

/// stream_BW_request command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamBwRequest {
    pub stream: StreamHeader,
    pub client_id: u32,
    /// Requested bandwidth in kbit/s.
    pub bandwidth: Option<u16>,
}

impl StreamBwRequest {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamBwRequest {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            bandwidth: fact.get_u16_opt(tags::BANDWIDTH)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        if let Some(bandwidth) = self.bandwidth {
            zer.put_u16(tags::BANDWIDTH, bandwidth);
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
            + &dump_optional_decimal(indent, "bandwidth", &self.bandwidth)
    }
}

/// stream_BW_allocation command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamBwAllocation {
    pub stream: StreamHeader,
    pub client_id: u32,
    /// Allocated bandwidth in kbit/s.
    pub bandwidth: Option<u16>,
}

impl StreamBwAllocation {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(StreamBwAllocation {
            stream: StreamHeader::from_factory(fact, tags::DATA_CHANNEL_ID, tags::DATA_STREAM_ID)?,
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            bandwidth: fact.get_u16_opt(tags::BANDWIDTH)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        if let Some(bandwidth) = self.bandwidth {
            zer.put_u16(tags::BANDWIDTH, bandwidth);
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
            + &dump_optional_decimal(indent, "bandwidth", &self.bandwidth)
    }
}

/// data_provision command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataProvision {
    /// Channel and stream ids; [`NO_ID`] when received without them (UDP).
    pub stream: StreamHeader,
    pub client_id: u32,
    pub data_id: u16,
    /// EMM or private data chunks.
    pub datagram: Vec<Vec<u8>>,
}

impl DataProvision {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(DataProvision {
            stream: StreamHeader::new(
                fact.get_u16_opt(tags::DATA_CHANNEL_ID)?.unwrap_or(NO_ID),
                fact.get_u16_opt(tags::DATA_STREAM_ID)?.unwrap_or(NO_ID),
            ),
            client_id: fact.get_u32(tags::CLIENT_ID)?,
            data_id: fact.get_u16(tags::DATA_ID)?,
            datagram: fact.get_bytes_all(tags::DATAGRAM),
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::DATA_CHANNEL_ID, self.stream.channel_id);
        zer.put_u16(tags::DATA_STREAM_ID, self.stream.stream_id);
        zer.put_u32(tags::CLIENT_ID, self.client_id);
        zer.put_u16(tags::DATA_ID, self.data_id);
        for chunk in &self.datagram {
            zer.put_bytes(tags::DATAGRAM, chunk);
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        let mut out = dump_hexa(indent, "client_id", self.client_id)
            + &dump_hexa(indent, "data_channel_id", self.stream.channel_id)
            + &dump_hexa(indent, "data_stream_id", self.stream.stream_id)
            + &dump_hexa(indent, "data_id", self.data_id);
        for chunk in &self.datagram {
            out.push_str(&dump_decimal(indent, "datagram", format!("{} bytes", chunk.len())));
        }
        out
    }
}

/// All EMMG/PDG <=> MUX commands, discriminated by the command tag.
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
    StreamBwRequest(StreamBwRequest),
    StreamBwAllocation(StreamBwAllocation),
    DataProvision(DataProvision),
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
            Body::StreamBwRequest(_) => tags::STREAM_BW_REQUEST,
            Body::StreamBwAllocation(_) => tags::STREAM_BW_ALLOCATION,
            Body::DataProvision(_) => tags::DATA_PROVISION,
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
            Body::StreamBwRequest(_) => "stream_BW_request",
            Body::StreamBwAllocation(_) => "stream_BW_allocation",
            Body::DataProvision(_) => "data_provision",
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
            Body::StreamBwRequest(msg) => msg.serialize_parameters(zer),
            Body::StreamBwAllocation(msg) => msg.serialize_parameters(zer),
            Body::DataProvision(msg) => msg.serialize_parameters(zer),
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
            Body::StreamBwRequest(msg) => msg.dump_fields(indent),
            Body::StreamBwAllocation(msg) => msg.dump_fields(indent),
            Body::DataProvision(msg) => msg.dump_fields(indent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stream_bw_allocation_round_trip() {
        let protocol = Protocol::new();
        let reference = StreamBwAllocation {
            stream: StreamHeader::new(0x1234, 0x5678),
            client_id: 0x98765432,
            bandwidth: Some(200),
        };
        let bytes = protocol.message(Body::StreamBwAllocation(reference.clone())).to_bytes();
        let expected: &[u8] = &[
            0x03, //
            0x01, 0x18, 0x00, 0x1A, //
            0x00, 0x03, 0x00, 0x02, 0x12, 0x34, //
            0x00, 0x04, 0x00, 0x02, 0x56, 0x78, //
            0x00, 0x01, 0x00, 0x04, 0x98, 0x76, 0x54, 0x32, //
            0x00, 0x06, 0x00, 0x02, 0x00, 0xC8,
        ];
        assert_eq!(bytes, expected);

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::StreamBwAllocation(reference));
    }

    #[test]
    fn stream_error_round_trip() {
        let protocol = Protocol::new();
        let reference = StreamError {
            stream: StreamHeader::new(2, 3),
            client_id: 4,
            error_status: vec![errors::EXCEEDED_BW, errors::CLIENT_ID_IN_USE],
            error_information: vec![0x1234],
        };
        let bytes = protocol.message(Body::StreamError(reference.clone())).to_bytes();
        let expected: &[u8] = &[
            0x03, //
            0x01, 0x16, 0x00, 0x26, //
            0x00, 0x03, 0x00, 0x02, 0x00, 0x02, //
            0x00, 0x04, 0x00, 0x02, 0x00, 0x03, //
            0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x04, //
            0x70, 0x00, 0x00, 0x02, 0x00, 0x0F, //
            0x70, 0x00, 0x00, 0x02, 0x00, 0x14, //
            0x70, 0x01, 0x00, 0x02, 0x12, 0x34,
        ];
        assert_eq!(bytes, expected);

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::StreamError(reference));
    }

    #[test]
    fn data_provision_without_ids_gets_sentinel() {
        let protocol = Protocol::new();
        // A UDP-style data_provision: no channel or stream id.
        let mut zer = codec::Serializer::new();
        zer.append_u8(CURRENT_VERSION);
        zer.open_tlv(tags::DATA_PROVISION);
        zer.put_u32(tags::CLIENT_ID, 0x12345678);
        zer.put_u16(tags::DATA_ID, 7);
        zer.put_bytes(tags::DATAGRAM, &[0x01, 0x02, 0x03]);
        zer.close_tlv();
        let bytes = zer.finish();

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        match protocol.build(&fact).unwrap() {
            Body::DataProvision(msg) => {
                assert_eq!(msg.stream.channel_id, NO_ID);
                assert_eq!(msg.stream.stream_id, NO_ID);
                assert_eq!(msg.client_id, 0x12345678);
                assert_eq!(msg.datagram, vec![vec![0x01, 0x02, 0x03]]);
            }
            other => panic!("expected data_provision, got {other:?}"),
        }
    }

    #[test]
    fn data_provision_multiple_datagrams_keep_order() {
        let protocol = Protocol::new();
        let reference = DataProvision {
            stream: StreamHeader::new(1, 2),
            client_id: 9,
            data_id: 3,
            datagram: vec![vec![0xAA], vec![0xBB, 0xBB], vec![]],
        };
        let bytes = protocol.message(Body::DataProvision(reference.clone())).to_bytes();
        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::DataProvision(reference));
    }

    #[test]
    fn missing_client_id_is_reported_with_tag() {
        let protocol = Protocol::new();
        let mut zer = codec::Serializer::new();
        zer.append_u8(CURRENT_VERSION);
        zer.open_tlv(tags::CHANNEL_TEST);
        zer.put_u16(tags::DATA_CHANNEL_ID, 1);
        zer.close_tlv();
        let bytes = zer.finish();

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Err(TlvError::MissingParameter { tag: tags::CLIENT_ID }));
        assert_eq!(fact.error_information(), tags::CLIENT_ID);
        match protocol.error_response(&fact) {
            Body::ChannelError(err) => {
                assert_eq!(err.channel.channel_id, 1);
                assert_eq!(err.error_status, vec![errors::MISSING_PARAM]);
                assert_eq!(err.error_information, vec![tags::CLIENT_ID]);
            }
            other => panic!("expected channel_error, got {other:?}"),
        }
    }

    #[test]
    fn command_tag_ranges() {
        assert!(is_valid_command(0x0011));
        assert!(is_valid_command(0x0118));
        assert!(is_valid_command(0x0211));
        assert!(!is_valid_command(0x0016));
        assert!(!is_valid_command(0x0119));
        assert!(!is_valid_command(0x0201));
    }
}
