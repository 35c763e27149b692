/// Header, fixed 512 bytes at offset 0, padded to a full sector for 4096-byte sectors
pub(crate) mod header;

/// FAT / mini FAT entry values, one little endian u32 per sector
pub(crate) mod fat;

/// Directory stream, an array of 128-byte entries
pub(crate) mod directory;
