//! Forward-only analysis of a flat TLV byte stream.

use crate::{Length, Tag};
use byteorder::{BigEndian, ByteOrder};

/// Size in bytes of a TLV header (2-byte tag + 2-byte length).
pub const HEADER_SIZE: usize = 4;

/// A forward-only cursor over a sequence of TLV fields.
///
/// The cursor pre-reads the field under it; [`Analyzer::next`] advances past
/// the current value. Truncation of a header or value is a structural error:
/// the cursor becomes invalid and sticks at end-of-message. The analyzer
/// never fails by itself; callers translate an invalid cursor into an
/// `InvalidMessage` error with the offset of the offending field.
pub struct Analyzer<'a> {
    data: &'a [u8],
    tlv_offset: usize,
    value_offset: usize,
    tag: Tag,
    length: usize,
    eom: bool,
    valid: bool,
}

impl<'a> Analyzer<'a> {
    /// Position the cursor on the first TLV field of `data`.
    ///
    /// An empty input yields `end_of_message() && valid()`.
    pub fn new(data: &'a [u8]) -> Self {
        let mut analyzer = Analyzer {
            data,
            tlv_offset: 0,
            value_offset: 0,
            tag: 0,
            length: 0,
            eom: data.is_empty(),
            valid: true,
        };
        analyzer.next();
        analyzer
    }

    /// Advance past the current value to the next TLV field.
    ///
    /// Once at end-of-message or invalid, the cursor is sticky and further
    /// calls are no-ops.
    pub fn next(&mut self) {
        if self.eom || !self.valid {
            return;
        }

        self.tlv_offset = self.value_offset + self.length;

        if self.tlv_offset == self.data.len() {
            self.eom = true;
            return;
        }

        // The tag and length fields must fit in the remaining buffer.
        if self.tlv_offset + HEADER_SIZE > self.data.len() {
            self.eom = true;
            self.valid = false;
            return;
        }

        self.tag = BigEndian::read_u16(&self.data[self.tlv_offset..]);
        self.length = usize::from(BigEndian::read_u16(&self.data[self.tlv_offset + 2..]));
        self.value_offset = self.tlv_offset + HEADER_SIZE;

        // And so must the value.
        if self.value_offset + self.length > self.data.len() {
            self.eom = true;
            self.valid = false;
        }
    }

    /// Tag of the current field.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Length of the current value.
    pub fn length(&self) -> Length {
        self.length as Length
    }

    /// Offset of the current TLV header, relative to the analyzed slice.
    /// Meaningful even when invalid: it points at the offending field.
    pub fn tlv_offset(&self) -> usize {
        self.tlv_offset
    }

    /// Total size of the current TLV field, header included.
    pub fn tlv_size(&self) -> usize {
        HEADER_SIZE + self.length
    }

    /// Offset of the current value, relative to the analyzed slice.
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    /// The current value bytes.
    pub fn value(&self) -> &'a [u8] {
        &self.data[self.value_offset..self.value_offset + self.length]
    }

    /// True when the cursor has consumed the whole input.
    pub fn end_of_message(&self) -> bool {
        self.eom
    }

    /// False when a header or value did not fit in the remaining buffer.
    pub fn valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_valid_eom() {
        let analyzer = Analyzer::new(&[]);
        assert!(analyzer.end_of_message());
        assert!(analyzer.valid());
    }

    #[test]
    fn walks_consecutive_fields() {
        let data = [
            0x00, 0x01, 0x00, 0x02, 0xAA, 0xBB, // tag 1, 2 bytes
            0x00, 0x02, 0x00, 0x00, // tag 2, empty
            0x12, 0x34, 0x00, 0x01, 0xFF, // tag 0x1234, 1 byte
        ];
        let mut analyzer = Analyzer::new(&data);

        assert_eq!(analyzer.tag(), 0x0001);
        assert_eq!(analyzer.length(), 2);
        assert_eq!(analyzer.value(), &[0xAA, 0xBB]);
        assert_eq!(analyzer.tlv_offset(), 0);
        assert_eq!(analyzer.tlv_size(), 6);

        analyzer.next();
        assert_eq!(analyzer.tag(), 0x0002);
        assert_eq!(analyzer.length(), 0);
        assert_eq!(analyzer.value(), &[] as &[u8]);

        analyzer.next();
        assert_eq!(analyzer.tag(), 0x1234);
        assert_eq!(analyzer.value(), &[0xFF]);

        analyzer.next();
        assert!(analyzer.end_of_message());
        assert!(analyzer.valid());
    }

    #[test]
    fn truncated_header_is_invalid() {
        let data = [0x00, 0x01, 0x00]; // 3 bytes cannot hold a header
        let analyzer = Analyzer::new(&data);
        assert!(analyzer.end_of_message());
        assert!(!analyzer.valid());
        assert_eq!(analyzer.tlv_offset(), 0);
    }

    #[test]
    fn truncated_value_is_invalid() {
        let data = [0x00, 0x01, 0x00, 0x05, 0xAA]; // declares 5 bytes, has 1
        let analyzer = Analyzer::new(&data);
        assert!(analyzer.end_of_message());
        assert!(!analyzer.valid());
    }

    #[test]
    fn invalid_cursor_is_sticky() {
        let data = [
            0x00, 0x01, 0x00, 0x01, 0xAA, // fine
            0x00, 0x02, 0x00, 0x09, // truncated value
        ];
        let mut analyzer = Analyzer::new(&data);
        assert!(analyzer.valid());
        analyzer.next();
        assert!(!analyzer.valid());
        assert_eq!(analyzer.tlv_offset(), 5);
        analyzer.next();
        assert!(!analyzer.valid());
        assert_eq!(analyzer.tlv_offset(), 5);
    }
}
