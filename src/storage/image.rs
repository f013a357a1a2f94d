use crate::core::error::{LoadError, RfidError};
use crate::models::card::{CardName, CardRecord, CARD_NAME_LEN};
use crate::storage::checksum::image_checksum;
use crate::stores::card_table::CardTable;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Packed size of one record: id, active, name, last_seen
pub const RECORD_SIZE: usize = 4 + 1 + CARD_NAME_LEN + 4;

/// Packed size of the checksummed image header
pub const HEADER_SIZE: usize = 12;

/// On-flash layout of the card image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Bare record array
    Raw,
    /// Header with capacity and checksum, then the record array
    #[default]
    Checksummed,
}

/// Header preceding the records in the checksummed layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub active_count: u16,
    pub capacity: u16,
    pub checksum: u32,
    pub reserved: u32,
}

impl ImageHeader {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.active_count.to_le_bytes());
        buf.extend_from_slice(&self.capacity.to_le_bytes());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf.extend_from_slice(&self.reserved.to_le_bytes());
    }

    fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            active_count: u16::from_le_bytes([bytes[0], bytes[1]]),
            capacity: u16::from_le_bytes([bytes[2], bytes[3]]),
            checksum: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            reserved: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

fn encode_record(record: &CardRecord, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&record.id.to_le_bytes());
    buf.push(u8::from(record.active));
    buf.extend_from_slice(record.name.as_bytes());
    buf.extend_from_slice(&record.last_seen.to_le_bytes());
}

fn decode_record(bytes: &[u8]) -> CardRecord {
    debug_assert_eq!(bytes.len(), RECORD_SIZE);

    let mut name = [0u8; CARD_NAME_LEN];
    name.copy_from_slice(&bytes[5..5 + CARD_NAME_LEN]);
    let ts = 5 + CARD_NAME_LEN;

    CardRecord {
        id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        active: bytes[4] != 0,
        name: CardName::from_raw(name),
        last_seen: u32::from_le_bytes([bytes[ts], bytes[ts + 1], bytes[ts + 2], bytes[ts + 3]]),
    }
}

/// Serialize every slot of `table`, unused ones included
pub fn encode_records(table: &CardTable) -> Vec<u8> {
    let mut buf = Vec::with_capacity(table.capacity() * RECORD_SIZE);
    for record in table.slots() {
        encode_record(record, &mut buf);
    }
    buf
}

/// Full file contents for `table` in the given layout
pub fn encode_image(table: &CardTable, format: ImageFormat) -> Vec<u8> {
    let body = encode_records(table);
    match format {
        ImageFormat::Raw => body,
        ImageFormat::Checksummed => {
            let header = ImageHeader {
                active_count: table.count() as u16,
                capacity: table.capacity() as u16,
                checksum: image_checksum(&body),
                reserved: 0,
            };
            let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
            header.encode(&mut buf);
            buf.extend_from_slice(&body);
            buf
        }
    }
}

/// Parse file contents back into a table of exactly `capacity` slots
pub fn decode_image(
    bytes: &[u8],
    format: ImageFormat,
    capacity: usize,
) -> Result<CardTable, LoadError> {
    let expected = expected_size(format, capacity) as u64;
    if bytes.len() as u64 != expected {
        return Err(LoadError::SizeMismatch {
            expected,
            actual: bytes.len() as u64,
        });
    }

    if format == ImageFormat::Raw {
        return Ok(decode_records(bytes));
    }

    let (head, body) = bytes.split_at(HEADER_SIZE);
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(head);
    let header = ImageHeader::decode(&raw);

    if usize::from(header.capacity) != capacity {
        return Err(LoadError::CapacityMismatch {
            expected: capacity,
            actual: usize::from(header.capacity),
        });
    }

    let computed = image_checksum(body);
    if computed != header.checksum {
        return Err(LoadError::ChecksumInvalid {
            stored: header.checksum,
            computed,
        });
    }

    let table = decode_records(body);
    if table.count() != usize::from(header.active_count) {
        warn!(
            header_count = header.active_count,
            actual_count = table.count(),
            "Image header card count disagrees with records, using records"
        );
    }
    Ok(table)
}

fn decode_records(body: &[u8]) -> CardTable {
    CardTable::from_slots(body.chunks_exact(RECORD_SIZE).map(decode_record).collect())
}

/// Byte length of a valid image for `capacity` slots
pub fn expected_size(format: ImageFormat, capacity: usize) -> usize {
    let header = match format {
        ImageFormat::Raw => 0,
        ImageFormat::Checksummed => HEADER_SIZE,
    };
    header + capacity * RECORD_SIZE
}

/// The single flat file holding the card image
///
/// Every save rewrites the whole file in place. There is no write-then-rename,
/// so a power cut mid-save leaves a torn file that `load` rejects.
#[derive(Debug, Clone)]
pub struct ImageFile {
    path: PathBuf,
    format: ImageFormat,
    capacity: usize,
}

impl ImageFile {
    pub fn new(path: PathBuf, format: ImageFormat, capacity: usize) -> Self {
        Self {
            path,
            format,
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, table: &CardTable) -> Result<(), RfidError> {
        let image = encode_image(table, self.format);

        let mut file = File::create(&self.path)
            .map_err(|e| RfidError::io("opening the card image for writing", e))?;
        file.write_all(&image)
            .map_err(|e| RfidError::io("writing the card image", e))?;
        file.sync_all()
            .map_err(|e| RfidError::io("syncing the card image", e))?;

        debug!(
            path = %self.path.display(),
            bytes = image.len(),
            cards = table.count(),
            "Card image saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<CardTable, LoadError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LoadError::NotFound),
            Err(e) => return Err(LoadError::Io(e)),
        };

        let actual = file.metadata()?.len();
        let expected = expected_size(self.format, self.capacity) as u64;
        if actual != expected {
            return Err(LoadError::SizeMismatch { expected, actual });
        }

        let mut bytes = Vec::with_capacity(expected as usize);
        file.read_to_end(&mut bytes)?;

        decode_image(&bytes, self.format, self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_table() -> CardTable {
        let mut table = CardTable::with_defaults(8);
        table.add(0xABCD1234, "Test", 1_700_000_000).unwrap();
        table.add(0x0BADF00D, "Gone", 1_700_000_001).unwrap();
        table.remove(0x0BADF00D).unwrap();
        table
    }

    #[test]
    fn test_record_layout_is_packed_little_endian() {
        let mut table = CardTable::new(1);
        table.add(0x01020304, "AB", 0x0A0B0C0D).unwrap();
        let bytes = encode_records(&table);

        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(RECORD_SIZE, 41);
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..7], b"AB");
        assert!(bytes[7..37].iter().all(|&b| b == 0));
        assert_eq!(&bytes[37..41], &[0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn test_checksummed_header_fields() {
        let table = sample_table();
        let image = encode_image(&table, ImageFormat::Checksummed);
        assert_eq!(image.len(), expected_size(ImageFormat::Checksummed, 8));

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&image[..HEADER_SIZE]);
        let header = ImageHeader::decode(&raw);
        assert_eq!(header.active_count, 4);
        assert_eq!(header.capacity, 8);
        assert_eq!(header.checksum, image_checksum(&image[HEADER_SIZE..]));
        assert_eq!(header.reserved, 0);
    }

    #[test]
    fn test_save_load_preserves_every_slot() {
        let temp_dir = TempDir::new().unwrap();
        let table = sample_table();

        for format in [ImageFormat::Raw, ImageFormat::Checksummed] {
            let file = ImageFile::new(temp_dir.path().join("cards.dat"), format, 8);
            file.save(&table).unwrap();
            let loaded = file.load().unwrap();
            assert_eq!(loaded, table);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = ImageFile::new(
            temp_dir.path().join("absent.dat"),
            ImageFormat::Checksummed,
            8,
        );
        assert!(matches!(file.load(), Err(LoadError::NotFound)));
    }

    #[test]
    fn test_load_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cards.dat");
        let file = ImageFile::new(path.clone(), ImageFormat::Raw, 8);
        file.save(&sample_table()).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        assert!(matches!(
            file.load(),
            Err(LoadError::SizeMismatch { expected: 328, actual: 318 })
        ));
    }

    #[test]
    fn test_load_detects_flipped_byte() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cards.dat");
        let file = ImageFile::new(path.clone(), ImageFormat::Checksummed, 8);
        file.save(&sample_table()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 10] ^= 0x40;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(file.load(), Err(LoadError::ChecksumInvalid { .. })));
    }

    #[test]
    fn test_load_rejects_foreign_capacity() {
        let table = sample_table();
        let mut image = encode_image(&table, ImageFormat::Checksummed);
        image[2..4].copy_from_slice(&9u16.to_le_bytes());

        assert!(matches!(
            decode_image(&image, ImageFormat::Checksummed, 8),
            Err(LoadError::CapacityMismatch { expected: 8, actual: 9 })
        ));
    }

    #[test]
    fn test_raw_image_is_not_a_checksummed_image() {
        let table = sample_table();
        let raw = encode_image(&table, ImageFormat::Raw);
        assert!(matches!(
            decode_image(&raw, ImageFormat::Checksummed, 8),
            Err(LoadError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = ImageFile::new(
            temp_dir.path().join("nope").join("cards.dat"),
            ImageFormat::Raw,
            8,
        );
        assert!(matches!(file.save(&sample_table()), Err(RfidError::Io { .. })));
    }
}
