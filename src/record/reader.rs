use alloc::vec::Vec;

use super::{Record, CONTINUE_SID, HEADER_SIZE, MAX_RECORD_DATA};
use crate::error::RecordError;
use crate::endian::Little as LE;

/// Splits a byte sequence, typically a whole stream, into records
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Offset of the next physical record header
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn peek_header(&self) -> Result<Option<(u16, usize)>, RecordError> {
        let remain = &self.bytes[self.offset..];
        if remain.is_empty() {
            return Ok(None);
        }
        if remain.len() < HEADER_SIZE {
            return Err(RecordError::TruncatedHeader(self.offset));
        }
        let sid = LE::<u16>::read(&remain[0..2]);
        let length = LE::<u16>::read(&remain[2..4]) as usize;
        if length > MAX_RECORD_DATA {
            return Err(RecordError::Oversized { sid, length });
        }
        let available = remain.len() - HEADER_SIZE;
        if length > available {
            return Err(RecordError::TruncatedPayload { sid, length, available });
        }
        Ok(Some((sid, length)))
    }

    /// Reads a single physical record without merging continuations
    pub fn next_physical(&mut self) -> Result<Option<(u16, &'a [u8])>, RecordError> {
        let (sid, length) = match self.peek_header()? {
            Some(header) => header,
            None => return Ok(None),
        };
        let start = self.offset + HEADER_SIZE;
        self.offset = start + length;
        Ok(Some((sid, &self.bytes[start..start + length])))
    }

    /// Reads one logical record, appending the payloads of following continuation records
    pub fn next_record(&mut self) -> Result<Option<Record>, RecordError> {
        let offset = self.offset;
        let (sid, payload) = match self.next_physical()? {
            Some(physical) => physical,
            None => return Ok(None),
        };
        if sid == CONTINUE_SID {
            return Err(RecordError::OrphanContinuation(offset));
        }
        let mut record = Record { sid, payload: payload.to_vec(), boundaries: Vec::new() };
        // A malformed header ends the record and is reported by the next call
        while let Ok(Some((CONTINUE_SID, _))) = self.peek_header() {
            let (_, payload) = self.next_physical()?.ok_or(RecordError::EndOfRecord)?;
            record.boundaries.push(record.payload.len());
            record.payload.extend_from_slice(payload);
        }
        trace!("Record {:#06x} with {} bytes at {}", sid, record.payload.len(), offset);
        Ok(Some(record))
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.next_record().transpose();
        if let Some(Err(_)) = result {
            self.offset = self.bytes.len();
        }
        result
    }
}

#[cfg(test)]
mod test {
    use alloc::vec::Vec;

    use super::RecordReader;
    use crate::error::RecordError;
    use crate::record::CONTINUE_SID;

    fn physical(bytes: &mut Vec<u8>, sid: u16, payload: &[u8]) {
        bytes.extend_from_slice(&sid.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
    }

    #[test]
    fn test_merge_continuations() {
        let mut bytes = Vec::new();
        physical(&mut bytes, 0x00FC, &[1, 2, 3]);
        physical(&mut bytes, CONTINUE_SID, &[4, 5]);
        physical(&mut bytes, CONTINUE_SID, &[6]);
        physical(&mut bytes, 0x000A, &[]);
        let mut reader = RecordReader::new(&bytes);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.sid, 0x00FC);
        assert_eq!(record.payload, [1, 2, 3, 4, 5, 6]);
        assert_eq!(record.boundaries, [3, 5]);
        assert_eq!(record.physical_count(), 3);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.sid, 0x000A);
        assert!(record.payload.is_empty());
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[test]
    fn test_malformed() {
        let mut bytes = Vec::new();
        physical(&mut bytes, CONTINUE_SID, &[1]);
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.next_record(), Err(RecordError::OrphanContinuation(0)));

        let bytes = [0x09, 0x08, 0x10];
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.next_record(), Err(RecordError::TruncatedHeader(0)));

        let bytes = [0x09, 0x08, 0x10, 0x00, 0x01];
        let mut reader = RecordReader::new(&bytes);
        let expected = RecordError::TruncatedPayload { sid: 0x0809, length: 16, available: 1 };
        assert_eq!(reader.next_record(), Err(expected));

        let bytes = [0x09, 0x08, 0x21, 0x20];
        let mut reader = RecordReader::new(&bytes);
        let expected = RecordError::Oversized { sid: 0x0809, length: 8225 };
        assert_eq!(reader.next_record(), Err(expected));
    }

    #[test]
    fn test_iterator_stops_on_error() {
        let mut bytes = Vec::new();
        physical(&mut bytes, 0x0001, &[1]);
        bytes.push(0xFF);
        let mut reader = RecordReader::new(&bytes);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_complete_record_before_malformed_header() {
        let bytes = [0x01, 0x00, 0x01, 0x00, 0xAA, 0xFF];
        let mut reader = RecordReader::new(&bytes);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.sid, 0x0001);
        assert_eq!(record.payload, [0xAA]);
        assert!(record.boundaries.is_empty());
        assert_eq!(reader.offset(), 5);
        assert_eq!(reader.next_record(), Err(RecordError::TruncatedHeader(5)));

        let mut bytes = Vec::new();
        physical(&mut bytes, 0x00FC, &[1, 2]);
        physical(&mut bytes, CONTINUE_SID, &[3]);
        bytes.extend_from_slice(&[0x3C, 0x00, 0x05, 0x00, 0x04]);
        let mut reader = RecordReader::new(&bytes);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.payload, [1, 2, 3]);
        assert_eq!(record.boundaries, [2]);
        let expected = RecordError::TruncatedPayload { sid: CONTINUE_SID, length: 5, available: 1 };
        assert_eq!(reader.next_record(), Err(expected));
    }
}
