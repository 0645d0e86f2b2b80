//! Serialization of TLV messages.

use crate::Tag;
use byteorder::{BigEndian, ByteOrder};

/// Serializes TLV messages into a growable byte buffer.
///
/// `open_tlv` writes a tag and reserves a 2-byte length placeholder;
/// `close_tlv` back-patches it with the number of bytes written in between.
/// Open TLVs form a stack, so compound parameters nest without a second
/// serializer aliasing the buffer. [`Serializer::finish`] closes anything
/// still open and hands the buffer out.
#[derive(Default)]
pub struct Serializer {
    buf: Vec<u8>,
    /// Offsets of pending length placeholders, innermost last.
    open: Vec<usize>,
}

impl Serializer {
    pub fn new() -> Self {
        Serializer::default()
    }

    /// Open a TLV structure: tag plus a length placeholder to be patched by
    /// [`Serializer::close_tlv`].
    pub fn open_tlv(&mut self, tag: Tag) {
        self.append_u16(tag);
        self.open.push(self.buf.len());
        self.append_u16(0);
    }

    /// Close the innermost open TLV, back-patching its length field.
    pub fn close_tlv(&mut self) {
        debug_assert!(!self.open.is_empty(), "close_tlv without open_tlv");
        if let Some(offset) = self.open.pop() {
            let length = self.buf.len() - offset - 2;
            debug_assert!(length <= usize::from(u16::MAX));
            BigEndian::write_u16(&mut self.buf[offset..offset + 2], length as u16);
        }
    }

    /// Close any pending TLVs and return the serialized bytes.
    pub fn finish(mut self) -> Vec<u8> {
        while !self.open.is_empty() {
            self.close_tlv();
        }
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    // Raw appenders, big-endian.

    pub fn append_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn append_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn append_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn append_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    // Complete parameter TLVs: tag, length, value.

    fn put_header(&mut self, tag: Tag, length: usize) {
        debug_assert!(length <= usize::from(u16::MAX));
        self.append_u16(tag);
        self.append_u16(length as u16);
    }

    pub fn put_u8(&mut self, tag: Tag, value: u8) {
        self.put_header(tag, 1);
        self.append_u8(value);
    }

    pub fn put_u16(&mut self, tag: Tag, value: u16) {
        self.put_header(tag, 2);
        self.append_u16(value);
    }

    pub fn put_u32(&mut self, tag: Tag, value: u32) {
        self.put_header(tag, 4);
        self.append_u32(value);
    }

    pub fn put_u64(&mut self, tag: Tag, value: u64) {
        self.put_header(tag, 8);
        self.append_u64(value);
    }

    pub fn put_i8(&mut self, tag: Tag, value: i8) {
        self.put_header(tag, 1);
        self.append_i8(value);
    }

    pub fn put_i16(&mut self, tag: Tag, value: i16) {
        self.put_header(tag, 2);
        self.append_i16(value);
    }

    pub fn put_i32(&mut self, tag: Tag, value: i32) {
        self.put_header(tag, 4);
        self.append_i32(value);
    }

    pub fn put_i64(&mut self, tag: Tag, value: i64) {
        self.put_header(tag, 8);
        self.append_i64(value);
    }

    pub fn put_bool(&mut self, tag: Tag, value: bool) {
        self.put_u8(tag, u8::from(value));
    }

    pub fn put_bytes(&mut self, tag: Tag, value: &[u8]) {
        self.put_header(tag, value.len());
        self.append_bytes(value);
    }

    pub fn put_str(&mut self, tag: Tag, value: &str) {
        self.put_bytes(tag, value.as_bytes());
    }

    /// One TLV per element.
    pub fn put_u16_all(&mut self, tag: Tag, values: &[u16]) {
        for &value in values {
            self.put_u16(tag, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_writes_tag_length_value() {
        let mut zer = Serializer::new();
        zer.put_u16(0x0007, 0x0064);
        zer.put_bool(0x000A, true);
        assert_eq!(zer.finish(), vec![0x00, 0x07, 0x00, 0x02, 0x00, 0x64, 0x00, 0x0A, 0x00, 0x01, 0x01]);
    }

    #[test]
    fn close_tlv_back_patches_length() {
        let mut zer = Serializer::new();
        zer.open_tlv(0x0003);
        zer.put_u16(0x000E, 2);
        zer.close_tlv();
        assert_eq!(zer.finish(), vec![0x00, 0x03, 0x00, 0x06, 0x00, 0x0E, 0x00, 0x02, 0x00, 0x02]);
    }

    #[test]
    fn nested_tlvs_patch_inner_then_outer() {
        let mut zer = Serializer::new();
        zer.open_tlv(0x0201);
        zer.open_tlv(0x0014);
        zer.append_u16(5);
        zer.append_bytes(&[0xAA, 0xBB]);
        zer.close_tlv();
        zer.close_tlv();
        assert_eq!(
            zer.finish(),
            vec![0x02, 0x01, 0x00, 0x08, 0x00, 0x14, 0x00, 0x04, 0x00, 0x05, 0xAA, 0xBB]
        );
    }

    #[test]
    fn finish_closes_pending_tlvs() {
        let mut zer = Serializer::new();
        zer.open_tlv(0x0001);
        zer.append_u8(0xFF);
        assert_eq!(zer.finish(), vec![0x00, 0x01, 0x00, 0x01, 0xFF]);
    }
}
