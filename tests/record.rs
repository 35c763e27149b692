mod common;

use cfb::io::MemoryIO;
use cfb::record::{
    ContinuableRecordInput, ContinuableRecordOutput, RecordReader, RecordWriter, Unsplittable,
    CONTINUE_SID, MAX_RECORD_DATA,
};
use cfb::{CompoundFile, Version};

use common::init;

const BOF: u16 = 0x0809;
const SST: u16 = 0x00FC;
const EOF: u16 = 0x000A;

#[test]
fn test_records_in_stream() {
    init();
    let strings: Vec<String> = (0..2000).map(|i| format!("shared string number {}", i)).collect();
    let mut output = ContinuableRecordOutput::new(SST);
    output.write_u32(strings.len() as u32);
    output.write_u32(strings.len() as u32);
    for string in &strings {
        output.write_string(string).unwrap();
    }
    assert!(output.physical_count() > 1);
    let sst = output.finish();

    let mut writer = RecordWriter::new();
    writer.write_record(BOF, &[0x00, 0x06, 0x05, 0x00]).unwrap();
    let mut bytes = writer.into_inner();
    bytes.extend_from_slice(&sst);
    let mut writer = RecordWriter::new();
    writer.write_record(EOF, &[]).unwrap();
    bytes.extend_from_slice(writer.as_bytes());

    let mut file = CompoundFile::create(MemoryIO::default(), Version::V3);
    let mut stream = file.create_stream(&["Workbook"]).unwrap();
    stream.write_all(&bytes).unwrap();
    drop(stream);
    file.save().unwrap();
    let image = file.try_into_inner().ok().unwrap().into_inner();

    let file = CompoundFile::open(MemoryIO::new(image)).unwrap();
    let mut stream = file.open_stream(&["Workbook"]).unwrap();
    let mut content = Vec::new();
    stream.read_to_end(&mut content).unwrap();

    let records: Vec<_> = RecordReader::new(&content).collect::<Result<_, _>>().unwrap();
    let sids: Vec<u16> = records.iter().map(|r| r.sid).collect();
    assert_eq!(sids, [BOF, SST, EOF]);
    let sst = &records[1];
    assert!(!sst.boundaries.is_empty());

    let mut input = ContinuableRecordInput::new(sst);
    assert_eq!(input.read_u32().unwrap(), 2000);
    assert_eq!(input.read_u32().unwrap(), 2000);
    for string in &strings {
        assert_eq!(&input.read_string().unwrap(), string);
    }
    assert_eq!(input.remaining(), 0);
}

#[test]
fn test_physical_view() {
    init();
    let payload: Vec<u8> = (0..3 * MAX_RECORD_DATA + 10).map(|i| i as u8).collect();
    let mut writer = RecordWriter::new();
    assert_eq!(writer.write_record(0x003C + 1, &payload).unwrap(), 4);

    let mut reader = RecordReader::new(writer.as_bytes());
    let mut sids = Vec::new();
    while let Some((sid, data)) = reader.next_physical().unwrap() {
        assert!(data.len() <= MAX_RECORD_DATA);
        sids.push(sid);
    }
    assert_eq!(sids, [0x003D, CONTINUE_SID, CONTINUE_SID, CONTINUE_SID]);
    assert!(reader.is_empty());
}

#[test]
fn test_length_prefixed_strings_stay_whole() {
    init();
    // Consecutive length-prefixed strings, each declared unsplittable
    let mut payload = Vec::new();
    let mut regions = Vec::new();
    for i in 0..400 {
        let text = format!("{:-<width$}", i, width = 10 + i % 37);
        regions.push(Unsplittable::new(payload.len(), 2 + text.len()));
        payload.extend_from_slice(&(text.len() as u16).to_le_bytes());
        payload.extend_from_slice(text.as_bytes());
    }
    let mut writer = RecordWriter::new();
    let count = writer.write_record_with(0x0021, &payload, &regions).unwrap();
    assert!(count > 1);

    let record = RecordReader::new(writer.as_bytes()).next_record().unwrap().unwrap();
    assert_eq!(record.payload, payload);
    for boundary in &record.boundaries {
        assert!(regions.iter().any(|r| r.offset == *boundary));
    }
}
