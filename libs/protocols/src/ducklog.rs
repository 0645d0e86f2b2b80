//! A proprietary TLV protocol shipping sections and tables over the
//! SimulCrypt framing, used by logging pipelines.

use codec::message::{dump_bytes, dump_optional_hexa};
use codec::{
    message::dump_hexa, InternalError, Message, MessageFactory, ProtocolDefinition,
    SimulCryptDate, Tag, TlvError, Version,
};

const PROTOCOL_NAME: &str = "duck-log";

/// Current version of the duck-log protocol.
pub const CURRENT_VERSION: Version = 0x80;

/// Shortest valid section: a short section header.
pub const MIN_SECTION_SIZE: usize = 3;
/// Longest valid section: a maximum private section.
pub const MAX_SECTION_SIZE: usize = 4096;

/// Command and parameter tags.
pub mod tags {
    use codec::Tag;

    pub const MSG_LOG_SECTION: Tag = 0xAA01;
    pub const MSG_LOG_TABLE: Tag = 0xAA02;
    pub const MSG_ERROR: Tag = 0xAA04;

    pub const PRM_PID: Tag = 0x0000;
    pub const PRM_TIMESTAMP: Tag = 0x0001;
    pub const PRM_SECTION: Tag = 0x0002;
    pub const PRM_ERROR_CODE: Tag = 0x0003;
}

/// duck-log error status values.
pub mod errors {
    pub const INV_MESSAGE: u16 = 0x0001;
    pub const INV_PROTO_VERSION: u16 = 0x0002;
    pub const INV_MESSAGE_TYPE: u16 = 0x0003;
    pub const INV_PARAM_TYPE: u16 = 0x000E;
    pub const INV_PARAM_LENGTH: u16 = 0x000F;
    pub const MISSING_PARAM: u16 = 0x0010;
    pub const UNKNOWN_ERROR: u16 = 0x7000;
}

/// The duck-log protocol: versioned syntax table plus dispatch.
pub struct Protocol {
    syntax: codec::Protocol,
}

impl Protocol {
    pub fn new() -> Self {
        use tags::*;
        let mut syntax = codec::Protocol::with_version(CURRENT_VERSION);

        syntax.add_parameter(MSG_LOG_SECTION, PRM_PID, 2, 2, 0, 1);
        syntax.add_parameter(MSG_LOG_SECTION, PRM_TIMESTAMP, 8, 8, 0, 1);
        syntax.add_parameter(MSG_LOG_SECTION, PRM_SECTION, MIN_SECTION_SIZE, MAX_SECTION_SIZE, 1, 1);

        syntax.add_parameter(MSG_LOG_TABLE, PRM_PID, 2, 2, 0, 1);
        syntax.add_parameter(MSG_LOG_TABLE, PRM_TIMESTAMP, 8, 8, 0, 1);
        syntax.add_parameter(MSG_LOG_TABLE, PRM_SECTION, MIN_SECTION_SIZE, MAX_SECTION_SIZE, 1, 256);

        syntax.add_parameter(MSG_ERROR, PRM_ERROR_CODE, 2, 2, 1, 1);

        Protocol { syntax }
    }

    pub fn version(&self) -> Version {
        CURRENT_VERSION
    }

    /// Wrap a command body into a complete message of this protocol.
    pub fn message(&self, body: Body) -> Message<Body> {
        Message { version: Some(CURRENT_VERSION), body }
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
            tags::MSG_LOG_SECTION => Body::LogSection(LogSection::from_factory(fact)?),
            tags::MSG_LOG_TABLE => Body::LogTable(LogTable::from_factory(fact)?),
            tags::MSG_ERROR => Body::Error(Error::from_factory(fact)?),
            other => {
                return Err(InternalError::new(format!(
                    "{PROTOCOL_NAME} message 0x{other:04X} unimplemented"
                )))
            }
        })
    }

    fn error_response(&self, fact: &MessageFactory<'_>) -> Body {
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
        Body::Error(Error { error_status: status })
    }
}

/// Log one section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogSection {
    pub pid: Option<u16>,
    pub timestamp: Option<SimulCryptDate>,
    pub section: Vec<u8>,
}

impl LogSection {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        let timestamp = if fact.count(tags::PRM_TIMESTAMP) == 1 {
            Some(SimulCryptDate::get(fact, tags::PRM_TIMESTAMP)?)
        } else {
            None
        };
        Ok(LogSection {
            pid: fact.get_u16_opt(tags::PRM_PID)?,
            timestamp,
            section: fact.get_bytes(tags::PRM_SECTION)?,
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        if let Some(pid) = self.pid {
            zer.put_u16(tags::PRM_PID, pid);
        }
        if let Some(timestamp) = &self.timestamp {
            timestamp.put(zer, tags::PRM_TIMESTAMP);
        }
        zer.put_bytes(tags::PRM_SECTION, &self.section);
    }

    fn dump_fields(&self, indent: usize) -> String {
        let mut out = dump_optional_hexa(indent, "PID", &self.pid);
        if let Some(timestamp) = &self.timestamp {
            out.push_str(&format!("{:indent$}Timestamp = {timestamp}\n", "", indent = indent));
        }
        out.push_str(&dump_bytes(indent, "Section", &self.section));
        out
    }
}

/// Log a complete table as its sections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogTable {
    pub pid: Option<u16>,
    pub timestamp: Option<SimulCryptDate>,
    pub sections: Vec<Vec<u8>>,
}

impl LogTable {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        let timestamp = if fact.count(tags::PRM_TIMESTAMP) == 1 {
            Some(SimulCryptDate::get(fact, tags::PRM_TIMESTAMP)?)
        } else {
            None
        };
        Ok(LogTable {
            pid: fact.get_u16_opt(tags::PRM_PID)?,
            timestamp,
            sections: fact.get_bytes_all(tags::PRM_SECTION),
        })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        if let Some(pid) = self.pid {
            zer.put_u16(tags::PRM_PID, pid);
        }
        if let Some(timestamp) = &self.timestamp {
            timestamp.put(zer, tags::PRM_TIMESTAMP);
        }
        for section in &self.sections {
            zer.put_bytes(tags::PRM_SECTION, section);
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        let mut out = dump_optional_hexa(indent, "PID", &self.pid);
        if let Some(timestamp) = &self.timestamp {
            out.push_str(&format!("{:indent$}Timestamp = {timestamp}\n", "", indent = indent));
        }
        for section in &self.sections {
            out.push_str(&dump_bytes(indent, "Section", section));
        }
        out
    }
}

/// Error reply for a faulty peer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Error {
    pub error_status: u16,
}

impl Error {
    fn from_factory(fact: &MessageFactory<'_>) -> Result<Self, InternalError> {
        Ok(Error { error_status: fact.get_u16(tags::PRM_ERROR_CODE)? })
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        zer.put_u16(tags::PRM_ERROR_CODE, self.error_status);
    }

    fn dump_fields(&self, indent: usize) -> String {
        dump_hexa(indent, "error_status", self.error_status)
    }
}

/// All duck-log commands, discriminated by the command tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    LogSection(LogSection),
    LogTable(LogTable),
    Error(Error),
}

impl codec::Body for Body {
    fn tag(&self) -> Tag {
        match self {
            Body::LogSection(_) => tags::MSG_LOG_SECTION,
            Body::LogTable(_) => tags::MSG_LOG_TABLE,
            Body::Error(_) => tags::MSG_ERROR,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Body::LogSection(_) => "LogSection",
            Body::LogTable(_) => "LogTable",
            Body::Error(_) => "Error",
        }
    }

    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn serialize_parameters(&self, zer: &mut codec::Serializer) {
        match self {
            Body::LogSection(msg) => msg.serialize_parameters(zer),
            Body::LogTable(msg) => msg.serialize_parameters(zer),
            Body::Error(msg) => msg.serialize_parameters(zer),
        }
    }

    fn dump_fields(&self, indent: usize) -> String {
        match self {
            Body::LogSection(msg) => msg.dump_fields(indent),
            Body::LogTable(msg) => msg.dump_fields(indent),
            Body::Error(msg) => msg.dump_fields(indent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_section(len: usize) -> Vec<u8> {
        let mut section = vec![0x42, 0xB0, (len - 3) as u8];
        section.resize(len, 0x5A);
        section
    }

    #[test]
    fn log_section_round_trip() {
        let protocol = Protocol::new();
        let reference = LogSection {
            pid: Some(0x1FFF),
            timestamp: Some(SimulCryptDate::new(2024, 5, 17, 8, 30, 0, 25)),
            section: sample_section(16),
        };
        let bytes = protocol.message(Body::LogSection(reference.clone())).to_bytes();
        assert_eq!(bytes[0], 0x80);

        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::LogSection(reference));
    }

    #[test]
    fn log_table_round_trip_without_optionals() {
        let protocol = Protocol::new();
        let reference = LogTable {
            pid: None,
            timestamp: None,
            sections: vec![sample_section(8), sample_section(12)],
        };
        let bytes = protocol.message(Body::LogTable(reference.clone())).to_bytes();
        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(protocol.build(&fact).unwrap(), Body::LogTable(reference));
    }

    #[test]
    fn undersized_section_is_rejected() {
        let protocol = Protocol::new();
        let mut zer = codec::Serializer::new();
        zer.append_u8(CURRENT_VERSION);
        zer.open_tlv(tags::MSG_LOG_SECTION);
        zer.put_bytes(tags::PRM_SECTION, &[0x42, 0xB0]); // below MIN_SECTION_SIZE
        zer.close_tlv();
        let bytes = zer.finish();
        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert!(matches!(fact.status(), Err(TlvError::InvalidParameterLength { .. })));
    }

    #[test]
    fn error_response_is_bare_error_message() {
        let protocol = Protocol::new();
        let mut bytes = protocol
            .message(Body::Error(Error { error_status: 0 }))
            .to_bytes();
        bytes[0] = 0x03; // wrong version
        let fact = MessageFactory::new(&bytes, protocol.syntax());
        assert_eq!(fact.status(), Err(TlvError::UnsupportedVersion { offset: 0 }));
        assert_eq!(
            protocol.error_response(&fact),
            Body::Error(Error { error_status: errors::INV_PROTO_VERSION })
        );
    }
}
