/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Stop-bit wire forms, read side.
//!
//! The reader consumes a byte stream one entity at a time. Truncated input
//! surfaces as [`DecodeError::Incomplete`]; an entity that exceeds its
//! maximum byte count without a stop bit is a framing error.

use crate::pmap::PresenceMap;
use bytes::Bytes;
use fastwire_core::{DecodeError, FastError, Result};
use smallvec::SmallVec;
use std::io::Read;

/// Maximum wire bytes for a 32-bit integer.
pub const MAX_BYTES_32: usize = 5;
/// Maximum wire bytes for a 64-bit integer.
pub const MAX_BYTES_64: usize = 10;

/// Streaming reader of FAST wire forms.
#[derive(Debug)]
pub struct Reader<R> {
    src: R,
}

impl<R: Read> Reader<R> {
    /// Creates a reader over the given source.
    #[must_use]
    pub fn new(src: R) -> Self {
        Self { src }
    }

    /// Consumes the reader and returns the underlying source.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.src
    }

    fn next_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.src.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(FastError::Decode(DecodeError::Incomplete))
            }
            Err(e) => Err(FastError::Io(e)),
        }
    }

    /// Reads a mandatory unsigned integer.
    ///
    /// # Arguments
    /// * `max_bytes` - Byte-count limit for the type (5 or 10)
    ///
    /// # Errors
    /// `Incomplete` on truncation, `MissingStopBit` past the limit,
    /// `IntegerOverflow` if the value does not fit 64 bits.
    pub fn read_uint(&mut self, max_bytes: usize) -> Result<u64> {
        let raw = self.accumulate_uint(max_bytes)?;
        u64::try_from(raw).map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))
    }

    /// Reads a nullable unsigned integer. The single byte `0x80` is null;
    /// any other value is shifted down by one.
    ///
    /// # Errors
    /// As [`Reader::read_uint`].
    pub fn read_uint_nullable(&mut self, max_bytes: usize) -> Result<Option<u64>> {
        let raw = self.accumulate_uint(max_bytes)?;
        if raw == 0 {
            return Ok(None);
        }
        u64::try_from(raw - 1)
            .map(Some)
            .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))
    }

    /// Reads a mandatory signed integer.
    ///
    /// # Errors
    /// As [`Reader::read_uint`].
    pub fn read_int(&mut self, max_bytes: usize) -> Result<i64> {
        let raw = self.accumulate_int(max_bytes)?;
        i64::try_from(raw).map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))
    }

    /// Reads a nullable signed integer. Zero is null; positive values are
    /// shifted down by one, negative values pass through.
    ///
    /// # Errors
    /// As [`Reader::read_uint`].
    pub fn read_int_nullable(&mut self, max_bytes: usize) -> Result<Option<i64>> {
        let raw = self.accumulate_int(max_bytes)?;
        if raw == 0 {
            return Ok(None);
        }
        let value = if raw > 0 { raw - 1 } else { raw };
        i64::try_from(value)
            .map(Some)
            .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))
    }

    /// Reads a mandatory ASCII string.
    ///
    /// # Errors
    /// `Incomplete` on truncation, `InvalidString` on malformed payloads.
    pub fn read_ascii(&mut self) -> Result<String> {
        let payload = self.ascii_payload()?;
        if payload.iter().all(|&b| b == 0) {
            // leading-zero sentinel for the empty string
            return Ok(String::new());
        }
        String::from_utf8(payload.to_vec())
            .map_err(|_| FastError::Decode(DecodeError::InvalidString))
    }

    /// Reads a nullable ASCII string. The lone zero payload is null; the
    /// double-zero payload is the empty string.
    ///
    /// # Errors
    /// As [`Reader::read_ascii`].
    pub fn read_ascii_nullable(&mut self) -> Result<Option<String>> {
        let payload = self.ascii_payload()?;
        if payload.as_slice() == [0] {
            return Ok(None);
        }
        if payload.iter().all(|&b| b == 0) {
            return Ok(Some(String::new()));
        }
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|_| FastError::Decode(DecodeError::InvalidString))
    }

    /// Reads a mandatory byte vector.
    ///
    /// # Errors
    /// `Incomplete` on truncation.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let length = self.read_uint(MAX_BYTES_32)?;
        self.take(length as usize)
    }

    /// Reads a nullable byte vector.
    ///
    /// # Errors
    /// `Incomplete` on truncation.
    pub fn read_bytes_nullable(&mut self) -> Result<Option<Bytes>> {
        match self.read_uint_nullable(MAX_BYTES_32)? {
            Some(length) => self.take(length as usize).map(Some),
            None => Ok(None),
        }
    }

    /// Reads a mandatory unicode string.
    ///
    /// # Errors
    /// `Incomplete` on truncation, `InvalidUtf8` on malformed bytes.
    pub fn read_unicode(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| FastError::Decode(DecodeError::InvalidUtf8(e)))
    }

    /// Reads a nullable unicode string.
    ///
    /// # Errors
    /// As [`Reader::read_unicode`].
    pub fn read_unicode_nullable(&mut self) -> Result<Option<String>> {
        match self.read_bytes_nullable()? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| FastError::Decode(DecodeError::InvalidUtf8(e))),
            None => Ok(None),
        }
    }

    /// Reads a presence map: bytes up to and including the stop-bit byte.
    ///
    /// # Errors
    /// `Incomplete` on truncation.
    pub fn read_pmap(&mut self) -> Result<PresenceMap> {
        let mut framed: SmallVec<[u8; 4]> = SmallVec::new();
        loop {
            let byte = self.next_byte()?;
            framed.push(byte & 0x7F);
            if byte & 0x80 != 0 {
                break;
            }
        }
        Ok(PresenceMap::from_wire(&framed))
    }

    fn accumulate_uint(&mut self, max_bytes: usize) -> Result<u128> {
        let mut raw: u128 = 0;
        for _ in 0..max_bytes {
            let byte = self.next_byte()?;
            raw = (raw << 7) | u128::from(byte & 0x7F);
            if byte & 0x80 != 0 {
                return Ok(raw);
            }
        }
        Err(FastError::Decode(DecodeError::MissingStopBit {
            limit: max_bytes,
        }))
    }

    fn accumulate_int(&mut self, max_bytes: usize) -> Result<i128> {
        let first = self.next_byte()?;
        let mut raw: i128 = if first & 0x40 != 0 { -1 } else { 0 };
        raw = (raw << 7) | i128::from(first & 0x7F);
        if first & 0x80 != 0 {
            return Ok(raw);
        }

        for _ in 1..max_bytes {
            let byte = self.next_byte()?;
            raw = (raw << 7) | i128::from(byte & 0x7F);
            if byte & 0x80 != 0 {
                return Ok(raw);
            }
        }
        Err(FastError::Decode(DecodeError::MissingStopBit {
            limit: max_bytes,
        }))
    }

    fn ascii_payload(&mut self) -> Result<SmallVec<[u8; 16]>> {
        let mut payload: SmallVec<[u8; 16]> = SmallVec::new();
        loop {
            let byte = self.next_byte()?;
            payload.push(byte & 0x7F);
            if byte & 0x80 != 0 {
                return Ok(payload);
            }
        }
    }

    fn take(&mut self, length: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; length];
        match self.src.read_exact(&mut buf) {
            Ok(()) => Ok(Bytes::from(buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(FastError::Decode(DecodeError::Incomplete))
            }
            Err(e) => Err(FastError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> Reader<&[u8]> {
        Reader::new(bytes)
    }

    fn decode_err(result: Result<impl std::fmt::Debug>) -> DecodeError {
        match result.unwrap_err() {
            FastError::Decode(e) => e,
            other => panic!("expected decode error, got {other}"),
        }
    }

    #[test]
    fn test_read_uint() {
        assert_eq!(reader(&[0x80]).read_uint(MAX_BYTES_32).unwrap(), 0);
        assert_eq!(reader(&[0x81]).read_uint(MAX_BYTES_32).unwrap(), 1);
        assert_eq!(reader(&[0x07, 0xAE]).read_uint(MAX_BYTES_32).unwrap(), 942);
    }

    #[test]
    fn test_read_uint_nullable() {
        assert_eq!(
            reader(&[0x80]).read_uint_nullable(MAX_BYTES_32).unwrap(),
            None
        );
        assert_eq!(
            reader(&[0x81]).read_uint_nullable(MAX_BYTES_32).unwrap(),
            Some(0)
        );
        assert_eq!(
            reader(&[0x82]).read_uint_nullable(MAX_BYTES_32).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_read_int() {
        assert_eq!(reader(&[0x81]).read_int(MAX_BYTES_32).unwrap(), 1);
        assert_eq!(reader(&[0xFF]).read_int(MAX_BYTES_32).unwrap(), -1);
        assert_eq!(reader(&[0x00, 0xC0]).read_int(MAX_BYTES_32).unwrap(), 64);
        assert_eq!(reader(&[0x7F, 0xBF]).read_int(MAX_BYTES_32).unwrap(), -65);
    }

    #[test]
    fn test_read_int_nullable() {
        assert_eq!(
            reader(&[0x80]).read_int_nullable(MAX_BYTES_32).unwrap(),
            None
        );
        assert_eq!(
            reader(&[0x81]).read_int_nullable(MAX_BYTES_32).unwrap(),
            Some(0)
        );
        assert_eq!(
            reader(&[0xFF]).read_int_nullable(MAX_BYTES_32).unwrap(),
            Some(-1)
        );
    }

    #[test]
    fn test_read_incomplete() {
        assert_eq!(
            decode_err(reader(&[0x00]).read_uint(MAX_BYTES_32)),
            DecodeError::Incomplete
        );
        assert_eq!(
            decode_err(reader(&[]).read_uint(MAX_BYTES_32)),
            DecodeError::Incomplete
        );
    }

    #[test]
    fn test_read_missing_stop_bit() {
        let bytes = [0x01u8; 6];
        assert_eq!(
            decode_err(reader(&bytes).read_uint(MAX_BYTES_32)),
            DecodeError::MissingStopBit {
                limit: MAX_BYTES_32
            }
        );
    }

    #[test]
    fn test_read_ascii() {
        assert_eq!(
            reader(&[0x41, 0x42, 0xC3]).read_ascii().unwrap(),
            "ABC".to_string()
        );
        assert_eq!(reader(&[0x00, 0x80]).read_ascii().unwrap(), String::new());
    }

    #[test]
    fn test_read_ascii_nullable() {
        assert_eq!(reader(&[0x80]).read_ascii_nullable().unwrap(), None);
        assert_eq!(
            reader(&[0x00, 0x00, 0x80]).read_ascii_nullable().unwrap(),
            Some(String::new())
        );
        assert_eq!(
            reader(&[0xC1]).read_ascii_nullable().unwrap(),
            Some("A".to_string())
        );
    }

    #[test]
    fn test_read_bytes() {
        assert_eq!(
            reader(&[0x83, 1, 2, 3]).read_bytes().unwrap().as_ref(),
            &[1, 2, 3]
        );
        assert_eq!(
            decode_err(reader(&[0x83, 1]).read_bytes()),
            DecodeError::Incomplete
        );
    }

    #[test]
    fn test_read_bytes_nullable() {
        assert_eq!(reader(&[0x80]).read_bytes_nullable().unwrap(), None);
        assert_eq!(
            reader(&[0x84, 1, 2, 3])
                .read_bytes_nullable()
                .unwrap()
                .unwrap()
                .as_ref(),
            &[1, 2, 3]
        );
    }

    #[test]
    fn test_read_pmap() {
        let mut pmap = reader(&[0xC0]).read_pmap().unwrap();
        assert!(pmap.next_bit());
        assert!(!pmap.next_bit());
    }

    #[test]
    fn test_read_pmap_multi_byte() {
        let pmap = reader(&[0x40, 0x81]).read_pmap().unwrap();
        assert_eq!(pmap.len(), 14);
        assert!(pmap.bit(0));
        assert!(pmap.bit(13));
    }

    #[test]
    fn test_uint_nullable_round_trip_max() {
        let mut writer = crate::writer::Writer::new();
        writer.write_uint(true, u64::MAX);
        let bytes = writer.into_bytes();
        assert_eq!(
            reader(&bytes).read_uint_nullable(MAX_BYTES_64).unwrap(),
            Some(u64::MAX)
        );
    }
}
