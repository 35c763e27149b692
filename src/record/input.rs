use alloc::string::String;
use alloc::vec::Vec;

use super::{Record, StringFlags};
use crate::error::RecordError;

/// Reads values from a merged logical record while honoring the physical
/// boundaries it was read from.
///
/// Primitive values must lie within one physical record, strings resume after
/// a boundary by re-reading the option flags byte.
pub struct ContinuableRecordInput<'a> {
    payload: &'a [u8],
    boundaries: &'a [usize],
    position: usize,
}

macro_rules! primitive {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self) -> Result<$type, RecordError> {
            let bytes = self.take(core::mem::size_of::<$type>())?;
            let mut array = [0u8; core::mem::size_of::<$type>()];
            array.copy_from_slice(bytes);
            Ok(<$type>::from_le_bytes(array))
        }
    };
}

impl<'a> ContinuableRecordInput<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { payload: &record.payload, boundaries: &record.boundaries, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.position
    }

    fn next_boundary(&self) -> usize {
        let mut iter = self.boundaries.iter();
        iter.find(|&&b| b > self.position).copied().unwrap_or(self.payload.len())
    }

    fn at_boundary(&self) -> bool {
        self.boundaries.binary_search(&self.position).is_ok()
    }

    fn take(&mut self, size: usize) -> Result<&'a [u8], RecordError> {
        if size > self.remaining() {
            return Err(RecordError::EndOfRecord);
        }
        if self.position + size > self.next_boundary() {
            return Err(RecordError::SplitValue(size));
        }
        let bytes = &self.payload[self.position..self.position + size];
        self.position += size;
        Ok(bytes)
    }

    primitive!(read_u8, u8);
    primitive!(read_u16, u16);
    primitive!(read_u32, u32);
    primitive!(read_u64, u64);
    primitive!(read_i16, i16);
    primitive!(read_i32, i32);
    primitive!(read_f64, f64);

    /// Skips raw bytes regardless of boundaries
    pub fn skip(&mut self, size: usize) -> Result<(), RecordError> {
        if size > self.remaining() {
            return Err(RecordError::EndOfRecord);
        }
        self.position += size;
        Ok(())
    }

    /// Raw bytes regardless of boundaries
    pub fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>, RecordError> {
        let start = self.position;
        self.skip(size)?;
        Ok(self.payload[start..self.position].to_vec())
    }

    /// Reads a BIFF unicode string, see `ContinuableRecordOutput::write_string`
    pub fn read_string(&mut self) -> Result<String, RecordError> {
        let count = self.read_u16()? as usize;
        let mut flags = StringFlags(self.read_u8()?);
        let runs = if flags.rich_text() { self.read_u16()? as usize } else { 0 };
        let extension = if flags.ext_string() { self.read_u32()? as usize } else { 0 };

        let mut units: Vec<u16> = Vec::with_capacity(count);
        while units.len() < count {
            if self.at_boundary() {
                flags = StringFlags(self.read_u8()?);
            }
            let char_size = if flags.high_byte() { 2 } else { 1 };
            let span = self.next_boundary() - self.position;
            let fit = core::cmp::min(span / char_size, count - units.len());
            if fit == 0 {
                return Err(match self.remaining() {
                    0 => RecordError::EndOfRecord,
                    _ => RecordError::SplitValue(char_size),
                });
            }
            let bytes = self.take(fit * char_size)?;
            match char_size {
                1 => units.extend(bytes.iter().map(|&b| b as u16)),
                _ => units.extend(bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]))),
            }
        }
        self.skip(runs * 4 + extension)?;
        let decoded = char::decode_utf16(units.iter().copied());
        Ok(decoded.map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)).collect())
    }
}

#[cfg(test)]
mod test {
    use alloc::vec;

    use super::ContinuableRecordInput;
    use crate::error::RecordError;
    use crate::record::Record;

    #[test]
    fn test_split_primitive() {
        let record = Record { sid: 1, payload: vec![1, 2, 3, 4, 5, 6], boundaries: vec![3] };
        let mut input = ContinuableRecordInput::new(&record);
        assert_eq!(input.read_u16().unwrap(), 0x0201);
        assert_eq!(input.read_u16(), Err(RecordError::SplitValue(2)));
        input.skip(1).unwrap();
        assert_eq!(input.read_u16().unwrap(), 0x0504);
        assert_eq!(input.read_u16(), Err(RecordError::EndOfRecord));
        assert_eq!(input.read_u8().unwrap(), 6);
    }

    #[test]
    fn test_string_flags_change() {
        // Compressed before the boundary, two-byte characters after it
        let payload = vec![4, 0, 0, b'a', b'b', 1, 0x2D, 0x4E, 0x87, 0x65];
        let record = Record { sid: 1, payload, boundaries: vec![5] };
        let mut input = ContinuableRecordInput::new(&record);
        assert_eq!(input.read_string().unwrap(), "ab\u{4e2d}\u{6587}");
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_rich_string() {
        let mut payload = vec![2, 0, 0x0C, 1, 0, 4, 0, 0, 0, b'h', b'i'];
        payload.extend_from_slice(&[0; 4]);
        payload.extend_from_slice(&[0xAA; 4]);
        payload.push(0x7F);
        let record = Record::new(1, payload);
        let mut input = ContinuableRecordInput::new(&record);
        assert_eq!(input.read_string().unwrap(), "hi");
        assert_eq!(input.read_u8().unwrap(), 0x7F);
    }
}
