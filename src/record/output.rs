use alloc::vec::Vec;

use super::{StringFlags, CONTINUE_SID, HEADER_SIZE, MAX_RECORD_DATA};
use crate::error::RecordError;

/// Builds one logical record incrementally, starting a continuation record
/// whenever the next value would not fit into the current physical record.
///
/// Primitive values and unsplittable blocks are never divided. Strings may
/// span several physical records, in which case each continuation repeats the
/// option flags byte before the remaining characters.
pub struct ContinuableRecordOutput {
    sid: u16,
    records: Vec<u8>,
    current: Vec<u8>,
    physical: usize,
    total: usize,
}

macro_rules! primitive {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) {
            self.write_unsplit(&value.to_le_bytes())
        }
    };
}

impl ContinuableRecordOutput {
    pub fn new(sid: u16) -> Self {
        Self {
            sid,
            records: Vec::new(),
            current: Vec::with_capacity(MAX_RECORD_DATA),
            physical: 0,
            total: 0,
        }
    }

    /// Free bytes in the current physical record
    pub fn available(&self) -> usize {
        MAX_RECORD_DATA - self.current.len()
    }

    /// Payload bytes written so far, excluding repeated string flags
    pub fn total_size(&self) -> usize {
        self.total
    }

    fn flush_current(&mut self) {
        let sid = if self.physical == 0 { self.sid } else { CONTINUE_SID };
        self.records.reserve(HEADER_SIZE + self.current.len());
        self.records.extend_from_slice(&sid.to_le_bytes());
        self.records.extend_from_slice(&(self.current.len() as u16).to_le_bytes());
        self.records.extend_from_slice(&self.current);
        self.current.clear();
        self.physical += 1;
    }

    fn ensure(&mut self, size: usize) {
        if self.available() < size {
            self.flush_current();
        }
    }

    fn write_unsplit(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.current.extend_from_slice(bytes);
        self.total += bytes.len();
    }

    primitive!(write_u8, u8);
    primitive!(write_u16, u16);
    primitive!(write_u32, u32);
    primitive!(write_u64, u64);
    primitive!(write_i16, i16);
    primitive!(write_i32, i32);
    primitive!(write_f64, f64);

    /// Raw bytes, split freely at record boundaries
    pub fn write(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.available() == 0 {
                self.flush_current();
            }
            let size = core::cmp::min(self.available(), bytes.len());
            self.current.extend_from_slice(&bytes[..size]);
            self.total += size;
            bytes = &bytes[size..];
        }
    }

    /// Bytes that must land in a single physical record
    pub fn write_unsplittable(&mut self, bytes: &[u8]) -> Result<(), RecordError> {
        if bytes.len() > MAX_RECORD_DATA {
            return Err(RecordError::RegionTooLarge { offset: self.total, length: bytes.len() });
        }
        self.write_unsplit(bytes);
        Ok(())
    }

    /// Writes a BIFF unicode string: u16 character count, option flags, characters.
    ///
    /// Characters are stored one byte each when every UTF-16 unit fits in a byte.
    /// The header always shares a physical record with the first character.
    pub fn write_string(&mut self, text: &str) -> Result<(), RecordError> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let count = u16::try_from(units.len())
            .map_err(|_| RecordError::Oversized { sid: self.sid, length: units.len() })?;
        let mut flags = StringFlags(0);
        flags.set_high_byte(units.iter().any(|&unit| unit > 0xFF));
        let char_size = if flags.high_byte() { 2 } else { 1 };

        let first = if units.is_empty() { 0 } else { char_size };
        self.ensure(3 + first);
        self.current.extend_from_slice(&count.to_le_bytes());
        self.current.push(flags.0);
        self.total += 3;

        let mut remain = &units[..];
        while !remain.is_empty() {
            if self.available() < char_size {
                self.flush_current();
                self.current.push(flags.0);
            }
            let fit = core::cmp::min(self.available() / char_size, remain.len());
            for &unit in &remain[..fit] {
                match char_size {
                    1 => self.current.push(unit as u8),
                    _ => self.current.extend_from_slice(&unit.to_le_bytes()),
                }
            }
            self.total += fit * char_size;
            remain = &remain[fit..];
        }
        Ok(())
    }

    /// Number of physical records emitted once finished
    pub fn physical_count(&self) -> usize {
        self.physical + 1
    }

    /// Terminates the logical record, returns the serialized physical records
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_current();
        trace!("Record {:#06x} finished in {} physical records", self.sid, self.physical);
        self.records
    }
}

#[cfg(test)]
mod test {
    use alloc::string::String;
    use alloc::vec;

    use super::ContinuableRecordOutput;
    use crate::record::{ContinuableRecordInput, RecordReader, CONTINUE_SID, MAX_RECORD_DATA};

    #[test]
    fn test_primitives_not_split() {
        let mut output = ContinuableRecordOutput::new(0x00FC);
        output.write(&vec![0; MAX_RECORD_DATA - 3]);
        output.write_u32(0xDEADBEEF);
        assert_eq!(output.physical_count(), 2);
        let bytes = output.finish();

        let mut reader = RecordReader::new(&bytes);
        let (_, first) = reader.next_physical().unwrap().unwrap();
        assert_eq!(first.len(), MAX_RECORD_DATA - 3);
        let (sid, second) = reader.next_physical().unwrap().unwrap();
        assert_eq!(sid, CONTINUE_SID);
        assert_eq!(second, 0xDEADBEEFu32.to_le_bytes());
    }

    #[test]
    fn test_unsplittable() {
        let mut output = ContinuableRecordOutput::new(0x00FC);
        output.write(&[0xEE; 10]);
        let block = vec![0x55; MAX_RECORD_DATA - 1];
        output.write_unsplittable(&block).unwrap();
        let bytes = output.finish();

        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.next_physical().unwrap().unwrap().1, [0xEE; 10]);
        assert_eq!(reader.next_physical().unwrap().unwrap().1, &block[..]);

        let mut output = ContinuableRecordOutput::new(0x00FC);
        assert!(output.write_unsplittable(&vec![0; MAX_RECORD_DATA + 1]).is_err());
    }

    #[test]
    fn test_string_header_with_first_char() {
        let mut output = ContinuableRecordOutput::new(0x00FC);
        output.write(&vec![0; MAX_RECORD_DATA - 3]);
        output.write_string("abc").unwrap();
        let bytes = output.finish();

        let mut reader = RecordReader::new(&bytes);
        reader.next_physical().unwrap().unwrap();
        let (_, second) = reader.next_physical().unwrap().unwrap();
        assert_eq!(second, [3, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_string_across_boundary() {
        let text: String = core::iter::repeat('\u{4e2d}').take(100).collect();
        let mut output = ContinuableRecordOutput::new(0x00FC);
        output.write(&vec![0; MAX_RECORD_DATA - 50]);
        output.write_string(&text).unwrap();
        output.write_u16(0x1234);
        let bytes = output.finish();

        let mut reader = RecordReader::new(&bytes);
        reader.next_physical().unwrap().unwrap();
        let (_, second) = reader.next_physical().unwrap().unwrap();
        // Flags repeated, then the characters that did not fit
        assert_eq!(second[0], 1);
        assert_eq!(second.len(), 1 + (100 - 23) * 2 + 2);

        let record = RecordReader::new(&bytes).next_record().unwrap().unwrap();
        let mut input = ContinuableRecordInput::new(&record);
        input.skip(MAX_RECORD_DATA - 50).unwrap();
        assert_eq!(input.read_string().unwrap(), text);
        assert_eq!(input.read_u16().unwrap(), 0x1234);
        assert_eq!(input.remaining(), 0);
    }
}
