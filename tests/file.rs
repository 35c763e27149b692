mod common;

use std::io::{Read, Seek, SeekFrom, Write};

use cfb::io::FileIO;
use cfb::{CompoundFile, Version};

use common::init;

#[test]
fn test_file_round_trip() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("document.doc");

    let mut file = CompoundFile::create(FileIO::create(&path).unwrap(), Version::V3);
    let mut stream = file.create_stream(&["WordDocument"]).unwrap();
    let text = "compound file ".repeat(1000);
    stream.write_all(text.as_bytes()).unwrap();
    drop(stream);
    file.save().unwrap();
    drop(file);

    let bytes = std::fs::read(&path).unwrap();
    assert!(cfb::has_signature(&bytes));

    let mut file = CompoundFile::open(FileIO::open(&path).unwrap()).unwrap();
    let mut stream = file.open_stream(&["WordDocument"]).unwrap();
    let mut content = String::new();
    Read::read_to_string(&mut stream, &mut content).unwrap();
    assert_eq!(content, text);

    // Edit through the std::io traits and save over the read-only handle
    Seek::seek(&mut stream, SeekFrom::Start(0)).unwrap();
    Write::write_all(&mut stream, b"COMPOUND").unwrap();
    drop(stream);
    file.save().unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);

    let file = CompoundFile::open(FileIO::open(&path).unwrap()).unwrap();
    let mut stream = file.open_stream(&["WordDocument"]).unwrap();
    let mut head = [0u8; 13];
    Read::read_exact(&mut stream, &mut head).unwrap();
    assert_eq!(&head, b"COMPOUND file");
    drop(stream);
    let io = file.try_into_inner().ok().unwrap();
    assert_eq!(io.path(), path);
}

#[test]
fn test_failed_open_releases_file() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    std::fs::write(&path, vec![0u8; 4096]).unwrap();
    assert!(CompoundFile::open(FileIO::open(&path).unwrap()).is_err());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_unexpected_eof() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    let mut file = CompoundFile::create(FileIO::create(&path).unwrap(), Version::V4);
    let mut stream = file.create_stream(&["short"]).unwrap();
    stream.write_all(b"abc").unwrap();
    Seek::seek(&mut stream, SeekFrom::Start(0)).unwrap();
    let mut buf = [0u8; 8];
    let error = Read::read_exact(&mut stream, &mut buf).unwrap_err();
    assert_eq!(error.kind(), std::io::ErrorKind::UnexpectedEof);
}
