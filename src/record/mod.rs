//! Legacy record framing used inside document streams.
//!
//! Each physical record is a 4-byte header, sid and payload length as little
//! endian u16, followed by at most 8224 payload bytes. Longer logical records
//! continue in records with sid 0x003C whose payloads are concatenated on read.

pub mod input;
pub mod output;
pub mod reader;
pub mod writer;

use alloc::vec::Vec;

use bitfield::bitfield;

pub use input::ContinuableRecordInput;
pub use output::ContinuableRecordOutput;
pub use reader::RecordReader;
pub use writer::{RecordWriter, Unsplittable};

pub const HEADER_SIZE: usize = 4;
/// Largest payload of one physical record
pub const MAX_RECORD_DATA: usize = 8224;
pub const CONTINUE_SID: u16 = 0x003C;

/// One logical record, continuations already merged
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    pub sid: u16,
    pub payload: Vec<u8>,
    /// Payload offsets where a continuation record started
    pub boundaries: Vec<usize>,
}

impl Record {
    pub fn new(sid: u16, payload: Vec<u8>) -> Self {
        Self { sid, payload, boundaries: Vec::new() }
    }

    /// Number of physical records this record was read from
    pub fn physical_count(&self) -> usize {
        self.boundaries.len() + 1
    }
}

bitfield! {
    /// Option flags preceding the characters of a BIFF unicode string
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct StringFlags(u8);
    pub high_byte, set_high_byte: 0;
    pub ext_string, set_ext_string: 2;
    pub rich_text, set_rich_text: 3;
}
