use alloc::vec::Vec;
use core::ops::Range;

use super::{CONTINUE_SID, HEADER_SIZE, MAX_RECORD_DATA};
use crate::error::RecordError;

/// Payload range that has to be stored within a single physical record,
/// e.g. a length prefix together with the bytes it counts
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Unsplittable {
    pub offset: usize,
    pub length: usize,
}

impl Unsplittable {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Splits payload into pieces of at most `MAX_RECORD_DATA` bytes, a piece
/// ends early instead of cutting through any unsplittable region
pub(crate) fn split(
    length: usize,
    regions: &[Unsplittable],
) -> Result<Vec<Range<usize>>, RecordError> {
    for region in regions {
        if region.end() > length {
            return Err(RecordError::RegionOutOfBounds {
                offset: region.offset,
                length: region.length,
            });
        }
        if region.length > MAX_RECORD_DATA {
            return Err(RecordError::RegionTooLarge { offset: region.offset, length: region.length });
        }
    }
    let mut pieces = Vec::with_capacity(length / MAX_RECORD_DATA + 1);
    let mut start = 0;
    loop {
        let mut end = core::cmp::min(start + MAX_RECORD_DATA, length);
        // Overlapping regions may pull the end back more than once
        let mut moved = true;
        while moved {
            moved = false;
            for region in regions.iter().filter(|r| r.length > 0) {
                if region.offset < end && end < region.end() {
                    end = region.offset;
                    moved = true;
                }
            }
        }
        if end <= start && start < length {
            let region = regions.iter().find(|r| r.offset <= start && start < r.end());
            let offset = region.map(|r| r.offset).unwrap_or(start);
            let overlapped = regions.iter().filter(|r| r.offset < start + MAX_RECORD_DATA);
            let last = overlapped.map(|r| r.end()).max().unwrap_or(length);
            return Err(RecordError::RegionTooLarge { offset, length: last - offset });
        }
        pieces.push(start..end);
        start = end;
        if start >= length {
            return Ok(pieces);
        }
    }
}

/// Serializes logical records into physical records, splitting payloads
/// larger than `MAX_RECORD_DATA` into continuation records
#[derive(Clone, Debug, Default)]
pub struct RecordWriter {
    bytes: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn physical(&mut self, sid: u16, payload: &[u8]) {
        self.bytes.reserve(HEADER_SIZE + payload.len());
        self.bytes.extend_from_slice(&sid.to_le_bytes());
        self.bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(payload);
    }

    /// Writes one logical record, returns the number of physical records emitted
    pub fn write_record(&mut self, sid: u16, payload: &[u8]) -> Result<usize, RecordError> {
        self.write_record_with(sid, payload, &[])
    }

    /// Same as `write_record`, but no physical boundary falls inside any of `regions`
    pub fn write_record_with(
        &mut self,
        sid: u16,
        payload: &[u8],
        regions: &[Unsplittable],
    ) -> Result<usize, RecordError> {
        let pieces = split(payload.len(), regions)?;
        for (index, range) in pieces.iter().enumerate() {
            let sid = if index == 0 { sid } else { CONTINUE_SID };
            self.physical(sid, &payload[range.clone()]);
        }
        if pieces.len() > 1 {
            debug!("Record {:#06x} of {} bytes split into {}", sid, payload.len(), pieces.len());
        }
        Ok(pieces.len())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod test {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::{RecordWriter, Unsplittable};
    use crate::error::RecordError;
    use crate::record::{RecordReader, CONTINUE_SID, HEADER_SIZE, MAX_RECORD_DATA};

    #[test]
    fn test_split_oversized() {
        let payload: Vec<u8> = (0..MAX_RECORD_DATA + 1).map(|i| i as u8).collect();
        let mut writer = RecordWriter::new();
        assert_eq!(writer.write_record(0x00FC, &payload).unwrap(), 2);
        assert_eq!(writer.len(), payload.len() + 2 * HEADER_SIZE);

        let mut reader = RecordReader::new(writer.as_bytes());
        let (sid, first) = reader.next_physical().unwrap().unwrap();
        assert_eq!((sid, first.len()), (0x00FC, MAX_RECORD_DATA));
        let (sid, second) = reader.next_physical().unwrap().unwrap();
        assert_eq!((sid, second), (CONTINUE_SID, &[payload[MAX_RECORD_DATA]][..]));

        let record = RecordReader::new(writer.as_bytes()).next_record().unwrap().unwrap();
        assert_eq!(record.payload, payload);
        assert_eq!(record.boundaries, [MAX_RECORD_DATA]);
    }

    #[test]
    fn test_exact_fit() {
        let mut writer = RecordWriter::new();
        assert_eq!(writer.write_record(0x0001, &[]).unwrap(), 1);
        assert_eq!(writer.as_bytes(), [0x01, 0x00, 0x00, 0x00]);
        let payload = vec![0xAB; MAX_RECORD_DATA];
        assert_eq!(writer.write_record(0x0002, &payload).unwrap(), 1);
    }

    #[test]
    fn test_safe_split() {
        // A length-prefixed string one byte short of a full record, behind 10 bytes of filler
        let region = MAX_RECORD_DATA - 1;
        let mut payload = vec![0xEE; 10];
        payload.extend_from_slice(&((region - 2) as u16).to_le_bytes());
        payload.extend((0..region - 2).map(|i| b'a' + (i % 26) as u8));

        let mut writer = RecordWriter::new();
        let regions = [Unsplittable::new(10, region)];
        assert_eq!(writer.write_record_with(0x00FC, &payload, &regions).unwrap(), 2);

        let mut reader = RecordReader::new(writer.as_bytes());
        let (_, first) = reader.next_physical().unwrap().unwrap();
        assert_eq!(first, &payload[..10]);
        let (sid, second) = reader.next_physical().unwrap().unwrap();
        assert_eq!(sid, CONTINUE_SID);
        assert_eq!(second, &payload[10..]);
    }

    #[test]
    fn test_region_errors() {
        let mut writer = RecordWriter::new();
        let payload = vec![0; 20000];
        let regions = [Unsplittable::new(100, MAX_RECORD_DATA + 1)];
        let expected = RecordError::RegionTooLarge { offset: 100, length: MAX_RECORD_DATA + 1 };
        assert_eq!(writer.write_record_with(1, &payload, &regions), Err(expected));

        let regions = [Unsplittable::new(19990, 20)];
        let expected = RecordError::RegionOutOfBounds { offset: 19990, length: 20 };
        assert_eq!(writer.write_record_with(1, &payload, &regions), Err(expected));

        // Chained overlaps wider than a record
        let regions = [Unsplittable::new(0, 5000), Unsplittable::new(4000, 5000)];
        let result = writer.write_record_with(1, &payload, &regions);
        assert!(matches!(result, Err(RecordError::RegionTooLarge { offset: 0, .. })));
        assert!(writer.is_empty());
    }
}
