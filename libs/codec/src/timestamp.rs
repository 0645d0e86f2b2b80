//! The fixed 8-byte date of DVB SimulCrypt protocols.

use crate::error::InternalError;
use crate::factory::MessageFactory;
use crate::serializer::Serializer;
use crate::Tag;
use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;

/// A DVB SimulCrypt date, 8 bytes on the wire:
/// `year(2) month(1) day(1) hour(1) minute(1) second(1) hundredth(1)`.
///
/// The derived ordering compares the raw bytes, which equals chronological
/// order because the fields are stored most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SimulCryptDate([u8; 8]);

impl SimulCryptDate {
    /// Binary size in bytes.
    pub const SIZE: usize = 8;

    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        hundredth: u8,
    ) -> Self {
        let mut data = [0u8; 8];
        BigEndian::write_u16(&mut data[0..2], year);
        data[2] = month;
        data[3] = day;
        data[4] = hour;
        data[5] = minute;
        data[6] = second;
        data[7] = hundredth;
        SimulCryptDate(data)
    }

    pub fn from_binary(data: [u8; 8]) -> Self {
        SimulCryptDate(data)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn year(&self) -> u16 {
        BigEndian::read_u16(&self.0[0..2])
    }

    pub fn month(&self) -> u8 {
        self.0[2]
    }

    pub fn day(&self) -> u8 {
        self.0[3]
    }

    pub fn hour(&self) -> u8 {
        self.0[4]
    }

    pub fn minute(&self) -> u8 {
        self.0[5]
    }

    pub fn second(&self) -> u8 {
        self.0[6]
    }

    pub fn hundredth(&self) -> u8 {
        self.0[7]
    }

    /// The current UTC time.
    pub fn now() -> Self {
        Utc::now().into()
    }

    /// Read the date from a TLV parameter, checking the 8-byte size.
    pub fn get(fact: &MessageFactory<'_>, tag: Tag) -> Result<Self, InternalError> {
        let view = fact.get_param(tag)?;
        if view.length != Self::SIZE {
            return Err(InternalError::new(format!(
                "invalid DVB time size in parameter 0x{tag:04X}, expected {} bytes, got {}",
                Self::SIZE,
                view.length
            )));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(fact.bytes(&view));
        Ok(SimulCryptDate(data))
    }

    /// Write the date as one TLV parameter.
    pub fn put(&self, zer: &mut Serializer, tag: Tag) {
        zer.put_bytes(tag, &self.0);
    }

    /// Convert to a calendar date. `None` for field values outside the
    /// calendar (the wire format does not constrain them).
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year()), u32::from(self.month()), u32::from(self.day()))?
            .and_hms_milli_opt(
                u32::from(self.hour()),
                u32::from(self.minute()),
                u32::from(self.second()),
                u32::from(self.hundredth()) * 10,
            )
    }
}

impl From<DateTime<Utc>> for SimulCryptDate {
    fn from(time: DateTime<Utc>) -> Self {
        SimulCryptDate::new(
            time.year() as u16,
            time.month() as u8,
            time.day() as u8,
            time.hour() as u8,
            time.minute() as u8,
            time.second() as u8,
            (time.timestamp_subsec_millis() / 10) as u8,
        )
    }
}

impl fmt::Display for SimulCryptDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}/{:02}/{:02}-{:02}:{:02}:{:02}.{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second(),
            self.hundredth()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_layout() {
        let date = SimulCryptDate::new(2024, 2, 29, 23, 59, 58, 99);
        assert_eq!(date.as_bytes(), &[0x07, 0xE8, 2, 29, 23, 59, 58, 99]);
        assert_eq!(date.year(), 2024);
        assert_eq!(date.hundredth(), 99);
    }

    #[test]
    fn byte_order_is_chronological_order() {
        let earlier = SimulCryptDate::new(2023, 12, 31, 23, 59, 59, 99);
        let later = SimulCryptDate::new(2024, 1, 1, 0, 0, 0, 0);
        assert!(earlier < later);

        let same_day_earlier = SimulCryptDate::new(2024, 6, 1, 10, 0, 0, 0);
        let same_day_later = SimulCryptDate::new(2024, 6, 1, 10, 0, 0, 1);
        assert!(same_day_earlier < same_day_later);
    }

    #[test]
    fn display_format() {
        let date = SimulCryptDate::new(2024, 2, 3, 4, 5, 6, 7);
        assert_eq!(date.to_string(), "2024/02/03-04:05:06.07");
    }

    #[test]
    fn calendar_conversion() {
        let date = SimulCryptDate::new(2024, 2, 29, 12, 30, 45, 50);
        let dt = date.to_datetime().unwrap();
        assert_eq!(dt.and_utc().timestamp_subsec_millis(), 500);
        let back = SimulCryptDate::from(dt.and_utc());
        assert_eq!(back, date);
    }
}
