//! TLS record assembler for accumulating partial ciphertext reads.
//!
//! Splits the inbound byte stream into whole TLS records before they reach
//! the pump. A short socket read that stops inside a record header leaves
//! the header bytes cached; once the 5 header bytes are in, the parsed header
//! is kept in the state so the body length is never re-derived.
//!
//! ```text
//! ┌──────────────┬──────────┬──────────┬──────────────────┐
//! │ Content type │ Version  │ Length   │ Fragment         │
//! │ 1 byte       │ 2 bytes  │ 2 bytes  │ length bytes     │
//! │              │ uint16 BE│ uint16 BE│                  │
//! └──────────────┴──────────┴──────────┴──────────────────┘
//! ```

use bytes::{Bytes, BytesMut};
use rustls::InvalidMessage;

use crate::error::{Result, WireError};

/// Record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 5;

/// Largest fragment a peer may send (2^14 plus expansion allowance).
pub const MAX_RECORD_FRAGMENT: usize = 16384 + 2048;

const CHANGE_CIPHER_SPEC: u8 = 20;
const APPLICATION_DATA: u8 = 23;

/// Parsed record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: u8,
    pub version: u16,
    pub length: u16,
}

impl RecordHeader {
    /// Decode a header from the first 5 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_HEADER_SIZE {
            return None;
        }
        Some(Self {
            content_type: buf[0],
            version: u16::from_be_bytes([buf[1], buf[2]]),
            length: u16::from_be_bytes([buf[3], buf[4]]),
        })
    }

    fn validate(&self) -> Result<()> {
        if !(CHANGE_CIPHER_SPEC..=APPLICATION_DATA).contains(&self.content_type) {
            return Err(WireError::Tls(rustls::Error::InvalidMessage(
                InvalidMessage::InvalidContentType,
            )));
        }
        if self.length as usize > MAX_RECORD_FRAGMENT {
            return Err(WireError::Tls(rustls::Error::InvalidMessage(
                InvalidMessage::MessageTooLarge,
            )));
        }
        Ok(())
    }

    fn record_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.length as usize
    }
}

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForFragment { header: RecordHeader },
}

/// Accumulates ciphertext and yields whole records, header included.
#[derive(Debug)]
pub struct RecordAssembler {
    buffer: BytesMut,
    state: State,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_RECORD_FRAGMENT + RECORD_HEADER_SIZE),
            state: State::WaitingForHeader,
        }
    }

    /// Push ciphertext and extract every record it completes.
    ///
    /// A header with an unknown content type or an oversize length is a
    /// protocol error; the assembler must not be reused after one.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut records = Vec::new();
        while let Some(record) = self.try_extract_one()? {
            records.push(record);
        }
        Ok(records)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        let header = match self.state {
            State::WaitingForFragment { header } => header,
            State::WaitingForHeader => {
                let Some(header) = RecordHeader::decode(&self.buffer) else {
                    return Ok(None);
                };
                header.validate()?;
                self.state = State::WaitingForFragment { header };
                header
            }
        };

        if self.buffer.len() < header.record_len() {
            return Ok(None);
        }

        self.state = State::WaitingForHeader;
        Ok(Some(self.buffer.split_to(header.record_len()).freeze()))
    }

    /// Buffered bytes not yet returned as a record.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Header of the record currently being assembled, if already parsed.
    pub fn pending_header(&self) -> Option<RecordHeader> {
        match self.state {
            State::WaitingForFragment { header } => Some(header),
            State::WaitingForHeader => None,
        }
    }
}

impl Default for RecordAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content_type: u8, fragment: &[u8]) -> Vec<u8> {
        let mut out = vec![content_type, 0x03, 0x03];
        out.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        out.extend_from_slice(fragment);
        out
    }

    #[test]
    fn test_single_record() {
        let mut assembler = RecordAssembler::new();
        let bytes = record(APPLICATION_DATA, b"ciphertext");
        let records = assembler.push(&bytes).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][..], &bytes[..]);
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_multiple_records_in_one_push() {
        let mut assembler = RecordAssembler::new();
        let mut data = record(22, b"hello");
        data.extend(record(20, &[1]));
        data.extend(record(23, b"data"));

        let records = assembler.push(&data).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1][0], 20);
        assert_eq!(&records[2][RECORD_HEADER_SIZE..], b"data");
    }

    #[test]
    fn test_partial_header_is_cached() {
        let mut assembler = RecordAssembler::new();
        let bytes = record(23, b"abcdef");

        assert!(assembler.push(&bytes[..3]).unwrap().is_empty());
        assert!(assembler.pending_header().is_none());
        assert_eq!(assembler.len(), 3);

        assert!(assembler.push(&bytes[3..7]).unwrap().is_empty());
        assert_eq!(assembler.pending_header().unwrap().length, 6);

        let records = assembler.push(&bytes[7..]).unwrap();
        assert_eq!(records.len(), 1);
        assert!(assembler.pending_header().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut assembler = RecordAssembler::new();
        let bytes = record(22, b"handshake");

        let mut records = Vec::new();
        for byte in &bytes {
            records.extend(assembler.push(&[*byte]).unwrap());
        }
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][..], &bytes[..]);
    }

    #[test]
    fn test_empty_fragment() {
        let mut assembler = RecordAssembler::new();
        let records = assembler.push(&record(23, b"")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), RECORD_HEADER_SIZE);
    }

    #[test]
    fn test_rejects_oversize_record() {
        let mut assembler = RecordAssembler::new();
        let header = [23, 0x03, 0x03, 0xFF, 0xFF];
        let err = assembler.push(&header).unwrap_err();
        assert!(matches!(
            err,
            WireError::Tls(rustls::Error::InvalidMessage(InvalidMessage::MessageTooLarge))
        ));
    }

    #[test]
    fn test_rejects_unknown_content_type() {
        let mut assembler = RecordAssembler::new();
        let err = assembler.push(b"GET / HTTP/1.1\r\n").unwrap_err();
        assert!(matches!(err, WireError::Tls(_)));
        assert!(err.is_fatal());
    }
}
