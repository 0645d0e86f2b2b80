//! The typed message model shared by all protocol bindings.
//!
//! A complete on-wire message is a [`Message`]: an optional protocol version
//! byte plus one command body. Bindings define their commands as plain
//! structs gathered in one sum type implementing [`Body`], with the command
//! tag as discriminant. Channel- and stream-scoped commands embed the small
//! [`ChannelHeader`] / [`StreamHeader`] records for their common fields.

use crate::error::InternalError;
use crate::factory::MessageFactory;
use crate::serializer::Serializer;
use crate::{Tag, Version};
use std::fmt::UpperHex;

/// Common field of channel-scoped commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelHeader {
    pub channel_id: u16,
}

impl ChannelHeader {
    pub fn new(channel_id: u16) -> Self {
        ChannelHeader { channel_id }
    }

    /// Read the channel id parameter (tag differs per protocol).
    pub fn from_factory(fact: &MessageFactory<'_>, channel_id_tag: Tag) -> Result<Self, InternalError> {
        Ok(ChannelHeader { channel_id: fact.get_u16(channel_id_tag)? })
    }
}

/// Common fields of stream-scoped commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamHeader {
    pub channel_id: u16,
    pub stream_id: u16,
}

impl StreamHeader {
    pub fn new(channel_id: u16, stream_id: u16) -> Self {
        StreamHeader { channel_id, stream_id }
    }

    pub fn from_factory(
        fact: &MessageFactory<'_>,
        channel_id_tag: Tag,
        stream_id_tag: Tag,
    ) -> Result<Self, InternalError> {
        Ok(StreamHeader {
            channel_id: fact.get_u16(channel_id_tag)?,
            stream_id: fact.get_u16(stream_id_tag)?,
        })
    }
}

/// One concrete command of a protocol, behind the per-protocol sum type.
pub trait Body {
    /// The command tag.
    fn tag(&self) -> Tag;

    /// The command name, e.g. `channel_setup`.
    fn name(&self) -> &'static str;

    /// The protocol name, used in dumps only.
    fn protocol_name(&self) -> &'static str;

    /// Serialize the parameters, in the protocol-defined order. The envelope
    /// (version byte, command TLV) is written by [`Message::serialize`].
    fn serialize_parameters(&self, zer: &mut Serializer);

    /// Diagnostic dump of the named fields, one `name = value` line each.
    fn dump_fields(&self, indent: usize) -> String;
}

/// A complete protocol message: optional version prefix plus one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<B> {
    pub version: Option<Version>,
    pub body: B,
}

impl<B: Body> Message<B> {
    pub fn tag(&self) -> Tag {
        self.body.tag()
    }

    /// Serialize the full message: version byte if any, then the command TLV
    /// wrapping the parameters.
    pub fn serialize(&self, zer: &mut Serializer) {
        if let Some(version) = self.version {
            zer.append_u8(version);
        }
        zer.open_tlv(self.body.tag());
        self.body.serialize_parameters(zer);
        zer.close_tlv();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut zer = Serializer::new();
        self.serialize(&mut zer);
        zer.finish()
    }

    /// Diagnostic dump: message and protocol name, version, type, fields.
    pub fn dump(&self, indent: usize) -> String {
        let mut out = format!(
            "{:indent$}{} ({})\n",
            "",
            self.body.name(),
            self.body.protocol_name(),
            indent = indent
        );
        if let Some(version) = self.version {
            out.push_str(&dump_hexa(indent, "protocol_version", version));
        }
        out.push_str(&dump_hexa(indent, "message_type", self.body.tag()));
        out.push_str(&self.body.dump_fields(indent));
        out
    }
}

// Dump helpers for bindings. Unsigned and tag-like fields are dumped in
// hexadecimal at the natural width of their type, signed and counted fields
// in decimal.

pub fn dump_hexa<T: UpperHex>(indent: usize, name: &str, value: T) -> String {
    let width = 2 * std::mem::size_of::<T>();
    format!("{:indent$}{name} = 0x{value:0width$X}\n", "", indent = indent, width = width)
}

pub fn dump_decimal<T: std::fmt::Display>(indent: usize, name: &str, value: T) -> String {
    format!("{:indent$}{name} = {value}\n", "", indent = indent)
}

pub fn dump_optional_decimal<T: std::fmt::Display>(
    indent: usize,
    name: &str,
    value: &Option<T>,
) -> String {
    value.as_ref().map_or_else(String::new, |v| dump_decimal(indent, name, v))
}

pub fn dump_optional_hexa<T: UpperHex + Copy>(
    indent: usize,
    name: &str,
    value: &Option<T>,
) -> String {
    value.map_or_else(String::new, |v| dump_hexa(indent, name, v))
}

pub fn dump_bytes(indent: usize, name: &str, value: &[u8]) -> String {
    let hex: Vec<String> = value.iter().map(|b| format!("{b:02X}")).collect();
    format!("{:indent$}{name} = {}\n", "", hex.join(" "), indent = indent)
}

pub fn dump_optional_bytes(indent: usize, name: &str, value: &Option<Vec<u8>>) -> String {
    value.as_ref().map_or_else(String::new, |v| dump_bytes(indent, name, v))
}

/// One line per element; `name_of` supplies a readable label for coded
/// values such as error statuses.
pub fn dump_vector(
    indent: usize,
    name: &str,
    values: &[u16],
    name_of: Option<fn(u16) -> &'static str>,
) -> String {
    values
        .iter()
        .map(|&v| match name_of {
            Some(lookup) => {
                format!("{:indent$}{name} = 0x{v:04X} ({})\n", "", lookup(v), indent = indent)
            }
            None => dump_hexa(indent, name, v),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hexa_dump_pads_to_type_width() {
        assert_eq!(dump_hexa(0, "v", 3u8), "v = 0x03\n");
        assert_eq!(dump_hexa(2, "t", 3u16), "  t = 0x0003\n");
        assert_eq!(dump_hexa(0, "c", 4u32), "c = 0x00000004\n");
    }

    #[test]
    fn optional_dumps_skip_missing_values() {
        assert_eq!(dump_optional_decimal::<i16>(2, "d", &None), "");
        assert_eq!(dump_optional_decimal(2, "d", &Some(-200i16)), "  d = -200\n");
    }
}
