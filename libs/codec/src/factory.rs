//! Deserialization and validation of TLV messages.

use crate::analyzer::Analyzer;
use crate::error::{InternalError, TlvError};
use crate::protocol::Protocol;
use crate::{Tag, Version};
use byteorder::{BigEndian, ByteOrder};

/// Location of one parameter value inside the analyzed message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamView {
    /// Offset of the parameter TLV structure in the outermost buffer.
    pub tlv_offset: usize,
    /// Size of the parameter TLV structure, header included.
    pub tlv_size: usize,
    /// Offset of the parameter value.
    pub value_offset: usize,
    /// Length of the parameter value.
    pub length: usize,
}

struct ParamEntry<'a> {
    tag: Tag,
    view: ParamView,
    /// Sub-factory for compound TLV parameters.
    compound: Option<Box<MessageFactory<'a>>>,
}

/// Analyzes one binary TLV message against a [`Protocol`].
///
/// The factory borrows the input buffer for its whole lifetime; parameter
/// accessors return views into it. Analysis happens at construction and
/// never fails outright: [`MessageFactory::status`] reports either a fully
/// framed command or a precise [`TlvError`]. The typed getters are meant for
/// message constructors of protocol bindings; they fail with
/// [`InternalError`] on conditions the syntax table should have excluded
/// (absent parameter, unexpected width), which indicates a binding bug.
///
/// Optional parameters must be gated with [`MessageFactory::count`] or
/// fetched through the `_opt` getters.
pub struct MessageFactory<'a> {
    data: &'a [u8],
    protocol: &'a Protocol,
    status: Result<(), TlvError>,
    version: Option<Version>,
    command_tag: Tag,
    params: Vec<ParamEntry<'a>>,
}

impl<'a> MessageFactory<'a> {
    /// Analyze a binary TLV message against `protocol`.
    pub fn new(data: &'a [u8], protocol: &'a Protocol) -> Self {
        let mut factory = MessageFactory {
            data,
            protocol,
            status: Ok(()),
            version: None,
            command_tag: 0,
            params: Vec::new(),
        };
        factory.analyze();
        factory
    }

    /// Result of the analysis. When this is an error there is no valid
    /// message and only [`MessageFactory::error_information`] plus the raw
    /// parameter accessors are meaningful.
    pub fn status(&self) -> Result<(), TlvError> {
        self.status
    }

    /// The 16-bit error information of the analysis failure, 0 when OK.
    pub fn error_information(&self) -> u16 {
        self.status.err().map_or(0, TlvError::error_information)
    }

    /// The command tag of the analyzed message.
    pub fn command_tag(&self) -> Tag {
        self.command_tag
    }

    /// The version byte of the analyzed message, for versioned protocols.
    pub fn protocol_version(&self) -> Option<Version> {
        self.version
    }

    fn analyze(&mut self) {
        // Copies of the borrowed buffer and protocol, so that views and
        // child factories carry the buffer lifetime, not the `self` borrow.
        let data = self.data;
        let protocol = self.protocol;

        // Size of the header before the outer TLV.
        let mut header_size = 0;

        if let Some(expected) = protocol.version() {
            header_size = 1;
            if data.is_empty() {
                self.status = Err(TlvError::InvalidMessage { offset: 0 });
                return;
            }
            let version = data[0];
            if version != expected {
                self.status = Err(TlvError::UnsupportedVersion { offset: 0 });
                return;
            }
            self.version = Some(version);
        }

        // The message envelope: exactly one outer TLV.
        let outer = Analyzer::new(&data[header_size..]);
        if outer.end_of_message() || !outer.valid() {
            self.status = Err(TlvError::InvalidMessage { offset: header_size as u16 });
            return;
        }

        self.command_tag = outer.tag();
        let params_base = header_size + outer.value_offset();
        let params_data = outer.value();

        let Some(command) = protocol.command(self.command_tag) else {
            self.status = Err(TlvError::UnknownCommandTag { offset: header_size as u16 });
            return;
        };

        // Scan the parameters inside the envelope.
        let mut scan = Analyzer::new(params_data);
        while !scan.end_of_message() {
            let tag = scan.tag();
            let view = ParamView {
                tlv_offset: params_base + scan.tlv_offset(),
                tlv_size: scan.tlv_size(),
                value_offset: params_base + scan.value_offset(),
                length: usize::from(scan.length()),
            };

            let Some(syntax) = command.parameter(tag) else {
                self.status = Err(TlvError::UnknownParameterTag { offset: view.tlv_offset as u16 });
                return;
            };

            if let Some(child_protocol) = &syntax.compound {
                // The whole parameter TLV is re-analyzed as one message of
                // the child protocol.
                let child_data = &data[view.tlv_offset..view.tlv_offset + view.tlv_size];
                let child = MessageFactory::new(child_data, child_protocol.as_ref());
                if let Err(child_err) = child.status {
                    // Translate child offsets into this buffer.
                    self.status = Err(child_err.at_offset(view.tlv_offset));
                    return;
                }
                self.params.push(ParamEntry { tag, view, compound: Some(Box::new(child)) });
            } else if view.length < syntax.min_size || view.length > syntax.max_size {
                self.status = Err(TlvError::InvalidParameterLength { offset: view.tlv_offset as u16 });
                return;
            } else {
                self.params.push(ParamEntry { tag, view, compound: None });
            }

            scan.next();
        }

        if !scan.valid() {
            self.status =
                Err(TlvError::InvalidMessage { offset: (params_base + scan.tlv_offset()) as u16 });
            return;
        }

        // All actual parameters are declared; now check that every declared
        // parameter occurs within its allowed count range.
        for (tag, syntax) in command.parameters() {
            let count = self.count(tag);
            if count < syntax.min_count || count > syntax.max_count {
                self.status = Err(if count == 0 && syntax.min_count > 0 {
                    TlvError::MissingParameter { tag }
                } else {
                    TlvError::InvalidParameterCount { tag }
                });
                return;
            }
        }
    }

    /// Number of occurrences of a parameter in the message.
    pub fn count(&self, tag: Tag) -> usize {
        self.params.iter().filter(|p| p.tag == tag).count()
    }

    /// Location of the first occurrence of a parameter.
    pub fn get_param(&self, tag: Tag) -> Result<ParamView, InternalError> {
        self.entry(tag).map(|entry| entry.view)
    }

    /// Locations of all occurrences of a parameter, in on-wire order.
    pub fn get_params(&self, tag: Tag) -> Vec<ParamView> {
        self.params.iter().filter(|p| p.tag == tag).map(|p| p.view).collect()
    }

    /// The value bytes of a located parameter.
    pub fn bytes(&self, view: &ParamView) -> &'a [u8] {
        &self.data[view.value_offset..view.value_offset + view.length]
    }

    fn entry(&self, tag: Tag) -> Result<&ParamEntry<'a>, InternalError> {
        self.params
            .iter()
            .find(|p| p.tag == tag)
            .ok_or_else(|| InternalError::new(format!("no parameter 0x{tag:04X} in message")))
    }

    /// First occurrence of a parameter with the exact expected width.
    fn fixed(&self, tag: Tag, width: usize) -> Result<&'a [u8], InternalError> {
        let entry = self.entry(tag)?;
        Self::check_width(tag, &entry.view, width)?;
        Ok(self.bytes(&entry.view))
    }

    fn check_width(tag: Tag, view: &ParamView, width: usize) -> Result<(), InternalError> {
        if view.length == width {
            Ok(())
        } else {
            Err(InternalError::new(format!(
                "bad size for parameter 0x{tag:04X} in message, expected {width} bytes, found {}",
                view.length
            )))
        }
    }

    pub fn get_u8(&self, tag: Tag) -> Result<u8, InternalError> {
        Ok(self.fixed(tag, 1)?[0])
    }

    pub fn get_u16(&self, tag: Tag) -> Result<u16, InternalError> {
        Ok(BigEndian::read_u16(self.fixed(tag, 2)?))
    }

    pub fn get_u32(&self, tag: Tag) -> Result<u32, InternalError> {
        Ok(BigEndian::read_u32(self.fixed(tag, 4)?))
    }

    pub fn get_u64(&self, tag: Tag) -> Result<u64, InternalError> {
        Ok(BigEndian::read_u64(self.fixed(tag, 8)?))
    }

    pub fn get_i8(&self, tag: Tag) -> Result<i8, InternalError> {
        Ok(self.fixed(tag, 1)?[0] as i8)
    }

    pub fn get_i16(&self, tag: Tag) -> Result<i16, InternalError> {
        Ok(BigEndian::read_i16(self.fixed(tag, 2)?))
    }

    pub fn get_i32(&self, tag: Tag) -> Result<i32, InternalError> {
        Ok(BigEndian::read_i32(self.fixed(tag, 4)?))
    }

    pub fn get_i64(&self, tag: Tag) -> Result<i64, InternalError> {
        Ok(BigEndian::read_i64(self.fixed(tag, 8)?))
    }

    /// One-byte boolean: zero is false, anything else is true.
    pub fn get_bool(&self, tag: Tag) -> Result<bool, InternalError> {
        Ok(self.fixed(tag, 1)?[0] != 0)
    }

    /// Opaque value bytes of the first occurrence.
    pub fn get_bytes(&self, tag: Tag) -> Result<Vec<u8>, InternalError> {
        Ok(self.bytes(&self.entry(tag)?.view).to_vec())
    }

    pub fn get_string(&self, tag: Tag) -> Result<String, InternalError> {
        Ok(String::from_utf8_lossy(self.bytes(&self.entry(tag)?.view)).into_owned())
    }

    pub fn get_u16_opt(&self, tag: Tag) -> Result<Option<u16>, InternalError> {
        if self.count(tag) == 0 { Ok(None) } else { self.get_u16(tag).map(Some) }
    }

    pub fn get_i16_opt(&self, tag: Tag) -> Result<Option<i16>, InternalError> {
        if self.count(tag) == 0 { Ok(None) } else { self.get_i16(tag).map(Some) }
    }

    pub fn get_bytes_opt(&self, tag: Tag) -> Result<Option<Vec<u8>>, InternalError> {
        if self.count(tag) == 0 { Ok(None) } else { self.get_bytes(tag).map(Some) }
    }

    /// All occurrences of a 2-byte integer parameter, in on-wire order.
    pub fn get_u16_all(&self, tag: Tag) -> Result<Vec<u16>, InternalError> {
        self.params
            .iter()
            .filter(|p| p.tag == tag)
            .map(|p| {
                Self::check_width(tag, &p.view, 2)?;
                Ok(BigEndian::read_u16(self.bytes(&p.view)))
            })
            .collect()
    }

    /// All occurrences of an opaque parameter, in on-wire order.
    pub fn get_bytes_all(&self, tag: Tag) -> Vec<Vec<u8>> {
        self.params
            .iter()
            .filter(|p| p.tag == tag)
            .map(|p| self.bytes(&p.view).to_vec())
            .collect()
    }

    /// The sub-factory of the first occurrence of a compound parameter.
    pub fn get_compound(&self, tag: Tag) -> Result<&MessageFactory<'a>, InternalError> {
        self.entry(tag)?
            .compound
            .as_deref()
            .ok_or_else(|| InternalError::new(format!("parameter 0x{tag:04X} is not a compound TLV")))
    }

    /// The sub-factories of all occurrences of a compound parameter.
    pub fn get_compounds(&self, tag: Tag) -> Result<Vec<&MessageFactory<'a>>, InternalError> {
        self.params
            .iter()
            .filter(|p| p.tag == tag)
            .map(|p| {
                p.compound.as_deref().ok_or_else(|| {
                    InternalError::new(format!("parameter 0x{tag:04X} is not a compound TLV"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializer;
    use std::sync::Arc;

    const CMD: Tag = 0x0010;
    const PRM_ID: Tag = 0x0001;
    const PRM_NOTE: Tag = 0x0002;
    const PRM_PAIR: Tag = 0x0003;
    const PRM_INNER: Tag = 0x0031;

    fn leaf_protocol() -> Protocol {
        let mut protocol = Protocol::with_version(0x01);
        protocol.add_parameter(CMD, PRM_ID, 2, 2, 1, 1);
        protocol.add_parameter(CMD, PRM_NOTE, 0, 16, 0, 2);
        protocol
    }

    fn compound_protocol() -> Protocol {
        let mut inner = Protocol::new();
        inner.add_parameter(PRM_PAIR, PRM_INNER, 1, 1, 1, 2);
        let mut protocol = Protocol::with_version(0x01);
        protocol.add_parameter(CMD, PRM_ID, 2, 2, 1, 1);
        protocol.add_compound(CMD, PRM_PAIR, Arc::new(inner), 0, 4);
        protocol
    }

    fn frame(params: &[u8]) -> Vec<u8> {
        let mut zer = Serializer::new();
        zer.append_u8(0x01);
        zer.open_tlv(CMD);
        zer.append_bytes(params);
        zer.close_tlv();
        zer.finish()
    }

    #[test]
    fn valid_message_round_trip() {
        let protocol = leaf_protocol();
        let data = frame(&[
            0x00, 0x01, 0x00, 0x02, 0x12, 0x34, // id
            0x00, 0x02, 0x00, 0x03, b'a', b'b', b'c', // note
        ]);
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Ok(()));
        assert_eq!(fact.command_tag(), CMD);
        assert_eq!(fact.protocol_version(), Some(0x01));
        assert_eq!(fact.get_u16(PRM_ID).unwrap(), 0x1234);
        assert_eq!(fact.get_string(PRM_NOTE).unwrap(), "abc");
        assert_eq!(fact.count(PRM_NOTE), 1);
    }

    #[test]
    fn empty_input_is_invalid_at_zero() {
        let protocol = leaf_protocol();
        let fact = MessageFactory::new(&[], &protocol);
        assert_eq!(fact.status(), Err(TlvError::InvalidMessage { offset: 0 }));
        assert_eq!(fact.error_information(), 0);
    }

    #[test]
    fn wrong_version_at_offset_zero() {
        let protocol = leaf_protocol();
        let mut data = frame(&[0x00, 0x01, 0x00, 0x02, 0x12, 0x34]);
        data[0] = 0x7F;
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::UnsupportedVersion { offset: 0 }));
        assert_eq!(fact.error_information(), 0);
    }

    #[test]
    fn unknown_command_points_at_envelope() {
        let protocol = leaf_protocol();
        let mut zer = Serializer::new();
        zer.append_u8(0x01);
        zer.open_tlv(0x0999);
        zer.close_tlv();
        let data = zer.finish();
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::UnknownCommandTag { offset: 1 }));
    }

    #[test]
    fn unknown_parameter_points_at_its_header() {
        let protocol = leaf_protocol();
        let data = frame(&[
            0x00, 0x01, 0x00, 0x02, 0x12, 0x34, // id, at offset 5
            0x0F, 0x0F, 0x00, 0x00, // undeclared, at offset 11
        ]);
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::UnknownParameterTag { offset: 11 }));
        assert_eq!(fact.error_information(), 11);
    }

    #[test]
    fn bad_length_detected() {
        let protocol = leaf_protocol();
        let data = frame(&[0x00, 0x01, 0x00, 0x01, 0x12]); // id must be 2 bytes
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::InvalidParameterLength { offset: 5 }));
    }

    #[test]
    fn truncated_parameter_detected() {
        let protocol = leaf_protocol();
        // Hand-craft an envelope whose inner parameter declares more bytes
        // than the envelope holds.
        let data = [
            0x01, // version
            0x00, 0x10, 0x00, 0x06, // command, 6 bytes of parameters
            0x00, 0x02, 0x00, 0x09, 0xAA, 0xBB, // note declares 9, has 2
        ];
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::InvalidMessage { offset: 5 }));
    }

    #[test]
    fn missing_and_extra_counts() {
        let protocol = leaf_protocol();

        let fact_data = frame(&[0x00, 0x02, 0x00, 0x01, b'x']); // no id
        let fact = MessageFactory::new(&fact_data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::MissingParameter { tag: PRM_ID }));
        assert_eq!(fact.error_information(), PRM_ID);

        let fact_data = frame(&[
            0x00, 0x01, 0x00, 0x02, 0x12, 0x34,
            0x00, 0x02, 0x00, 0x01, b'x',
            0x00, 0x02, 0x00, 0x01, b'y',
            0x00, 0x02, 0x00, 0x01, b'z', // 3 notes, max is 2
        ]);
        let fact = MessageFactory::new(&fact_data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::InvalidParameterCount { tag: PRM_NOTE }));
    }

    #[test]
    fn compound_parameter_recursion() {
        let protocol = compound_protocol();
        let data = frame(&[
            0x00, 0x01, 0x00, 0x02, 0x12, 0x34, // id
            0x00, 0x03, 0x00, 0x0A, // pair with two inner values
            0x00, 0x31, 0x00, 0x01, 0x07, //
            0x00, 0x31, 0x00, 0x01, 0x09,
        ]);
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Ok(()));
        let inner = fact.get_compound(PRM_PAIR).unwrap();
        assert_eq!(inner.command_tag(), PRM_PAIR);
        assert_eq!(inner.count(PRM_INNER), 2);
        assert_eq!(inner.get_u8(PRM_INNER).unwrap(), 0x07);
    }

    #[test]
    fn compound_error_offset_is_translated() {
        let protocol = compound_protocol();
        let data = frame(&[
            0x00, 0x01, 0x00, 0x02, 0x12, 0x34, // id, 6 bytes from offset 5
            0x00, 0x03, 0x00, 0x05, // pair at offset 11
            0x0E, 0x0E, 0x00, 0x01, 0x07, // undeclared inner tag at offset 15
        ]);
        let fact = MessageFactory::new(&data, &protocol);
        assert_eq!(fact.status(), Err(TlvError::UnknownParameterTag { offset: 15 }));
    }

    #[test]
    fn typed_getter_mismatch_is_internal_error() {
        let protocol = leaf_protocol();
        let data = frame(&[0x00, 0x01, 0x00, 0x02, 0x12, 0x34]);
        let fact = MessageFactory::new(&data, &protocol);
        assert!(fact.get_u32(PRM_ID).is_err());
        assert!(fact.get_u16(PRM_NOTE).is_err()); // absent parameter
    }
}
