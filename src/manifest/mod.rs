//! Manifest module — ADD/DELETE file events and their containers.
//!
//! The table's metadata is an append-only event log over data files.  Each
//! **manifest** is a write-once file listing [`ManifestEntry`] records: one
//! ADD or DELETE event per SST.  A **manifest list** is a write-once file
//! listing [`ManifestFileMeta`] records — one per manifest, carrying the
//! partition statistics that let the scan planner skip whole manifests
//! before opening them.  A snapshot points at exactly one manifest list.
//!
//! Replaying a snapshot's manifests in list order reconstructs the live
//! file set.  For any entry identifier `(partition, bucket, file_name)`
//! the event sequence across that replay must be exactly one ADD followed
//! by at most one DELETE; anything else means the metadata is corrupt.
//! The replay itself lives in [`crate::scan`].
//!
//! # On-disk layout
//!
//! Both containers share one record-file framing:
//!
//! ```text
//! [HEADER_BYTES]                       magic + version + CRC32
//! [REC_LEN_LE][REC_BYTES][REC_CRC32_LE]
//! [REC_LEN_LE][REC_BYTES][REC_CRC32_LE]
//! ...
//! ```
//!
//! The magic distinguishes manifests (`b"TMF0"`) from manifest lists
//! (`b"TML0"`), so a list file name accidentally resolved as a manifest
//! (or vice versa) is rejected instead of misparsed.  Unlike a WAL, these
//! files are written once and read fully: a failed record checksum is a
//! hard error, never a tolerated tail.
//!
//! # Writing
//!
//! [`ManifestWriter`] accumulates entries and rolls to a fresh file once
//! the encoded size passes its target, so one commit may produce several
//! manifests.  Each finished file's [`ManifestFileMeta`] carries
//! per-partition-field min/max statistics over the entries it contains.

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::path::PathFactory;
use crate::row::Row;
use crate::sstable::SstFileMeta;
use crate::stats::{FieldStats, StatsCollector};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Magic of manifest files.
pub(crate) const MANIFEST_MAGIC: [u8; 4] = *b"TMF0";
/// Magic of manifest-list files.
pub(crate) const MANIFEST_LIST_MAGIC: [u8; 4] = *b"TML0";

const RECORD_FILE_VERSION: u32 = 1;
const RECORD_FILE_HEADER_SIZE: usize = 12;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by manifest codec operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A header or record checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Structural damage: wrong magic, bad version, truncated frame.
    #[error("malformed manifest file: {0}")]
    Malformed(String),
}

// ------------------------------------------------------------------------------------------------
// Manifest record types
// ------------------------------------------------------------------------------------------------

/// Whether an entry adds a data file to the table or deletes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The file becomes live.
    Add,
    /// The file stops being live.
    Delete,
}

impl Encode for FileKind {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let tag: u8 = match self {
            FileKind::Add => 0,
            FileKind::Delete => 1,
        };
        tag.encode_to(buf)
    }
}

impl Decode for FileKind {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, consumed) = u8::decode_from(buf)?;
        match tag {
            0 => Ok((FileKind::Add, consumed)),
            1 => Ok((FileKind::Delete, consumed)),
            other => Err(EncodingError::BadTag {
                tag: other as u32,
                what: "FileKind",
            }),
        }
    }
}

/// Globally unique identity of a data file within a table.
///
/// The same identifier across manifests always refers to the same file;
/// the ADD and the eventual DELETE of a file carry equal identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryIdentifier {
    /// Partition the file belongs to.
    pub partition: Row,
    /// Bucket within the partition.
    pub bucket: u32,
    /// File name within the bucket directory.
    pub file_name: String,
}

/// One ADD or DELETE event for one SST file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Event kind.
    pub kind: FileKind,
    /// Partition the file belongs to.
    pub partition: Row,
    /// Bucket within the partition.
    pub bucket: u32,
    /// Descriptor of the file itself.
    pub file: SstFileMeta,
}

impl ManifestEntry {
    /// Returns this entry's globally unique identifier.
    pub fn identifier(&self) -> EntryIdentifier {
        EntryIdentifier {
            partition: self.partition.clone(),
            bucket: self.bucket,
            file_name: self.file.file_name.clone(),
        }
    }
}

impl Encode for ManifestEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.kind.encode_to(buf)?;
        self.partition.encode_to(buf)?;
        self.bucket.encode_to(buf)?;
        self.file.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for ManifestEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (kind, n) = FileKind::decode_from(&buf[offset..])?;
        offset += n;
        let (partition, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (bucket, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (file, n) = SstFileMeta::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                kind,
                partition,
                bucket,
                file,
            },
            offset,
        ))
    }
}

/// Descriptor of one manifest file inside a manifest list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFileMeta {
    /// Manifest file name.
    pub file_name: String,
    /// Manifest file size in bytes.
    pub file_size: u64,
    /// Number of ADD entries in the manifest.
    pub num_added_files: u64,
    /// Number of DELETE entries in the manifest.
    pub num_deleted_files: u64,
    /// Per-partition-field min/max over the manifest's entries; empty for
    /// unpartitioned tables.
    pub partition_stats: Vec<FieldStats>,
}

impl ManifestFileMeta {
    /// Total number of entries in the manifest.
    pub fn num_entries(&self) -> u64 {
        self.num_added_files + self.num_deleted_files
    }
}

impl Encode for ManifestFileMeta {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.file_name.encode_to(buf)?;
        self.file_size.encode_to(buf)?;
        self.num_added_files.encode_to(buf)?;
        self.num_deleted_files.encode_to(buf)?;
        encoding::encode_seq(&self.partition_stats, buf)?;
        Ok(())
    }
}

impl Decode for ManifestFileMeta {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (file_name, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        let (file_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (num_added_files, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (num_deleted_files, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (partition_stats, n) = encoding::decode_seq::<FieldStats>(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                file_name,
                file_size,
                num_added_files,
                num_deleted_files,
                partition_stats,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Record-file framing
// ------------------------------------------------------------------------------------------------

struct RecordFileHeader {
    magic: [u8; 4],
    version: u32,
    crc: u32,
}

impl Encode for RecordFileHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for RecordFileHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[offset..])?;
        offset += n;
        let (version, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (crc, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                magic,
                version,
                crc,
            },
            offset,
        ))
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Writes a complete record file: header, then one CRC-framed record per
/// encoded item.  Atomic via `<path>.tmp` + rename; returns the final
/// file size.
fn write_frames<'a>(
    path: &Path,
    magic: [u8; 4],
    frames: impl Iterator<Item = &'a Vec<u8>>,
) -> Result<u64, ManifestError> {
    let tmp_path = path.with_extension("tmp");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut writer = BufWriter::new(file);

    let mut header = RecordFileHeader {
        magic,
        version: RECORD_FILE_VERSION,
        crc: 0,
    };
    header.crc = crc32(&encoding::encode_to_vec(&header)?);
    writer.write_all(&encoding::encode_to_vec(&header)?)?;

    let mut size = RECORD_FILE_HEADER_SIZE as u64;
    for frame in frames {
        let len = frame.len() as u32;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(frame)?;
        writer.write_all(&crc32(frame).to_le_bytes())?;
        size += 4 + frame.len() as u64 + 4;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        File::open(dir)?.sync_all()?;
    }
    Ok(size)
}

/// Writes `items` as a record file under the given magic.
pub(crate) fn write_record_file<T: Encode>(
    path: &Path,
    magic: [u8; 4],
    items: &[T],
) -> Result<u64, ManifestError> {
    let mut frames = Vec::with_capacity(items.len());
    for item in items {
        frames.push(encoding::encode_to_vec(item)?);
    }
    write_frames(path, magic, frames.iter())
}

/// Reads a complete record file, verifying the header identity and every
/// record checksum.  Each frame must decode to exactly one `T`.
pub(crate) fn read_record_file<T: Decode>(
    path: &Path,
    magic: [u8; 4],
) -> Result<Vec<T>, ManifestError> {
    let bytes = fs::read(path)?;
    if bytes.len() < RECORD_FILE_HEADER_SIZE {
        return Err(ManifestError::Malformed("file shorter than header".into()));
    }

    let (header, _) =
        encoding::decode_from_slice::<RecordFileHeader>(&bytes[..RECORD_FILE_HEADER_SIZE])?;
    let expected = header.crc;
    let zeroed = RecordFileHeader { crc: 0, ..header };
    if crc32(&encoding::encode_to_vec(&zeroed)?) != expected {
        return Err(ManifestError::ChecksumMismatch);
    }
    if zeroed.magic != magic {
        return Err(ManifestError::Malformed("header magic mismatch".into()));
    }
    if zeroed.version != RECORD_FILE_VERSION {
        return Err(ManifestError::Malformed(format!(
            "unsupported record file version {}",
            zeroed.version
        )));
    }

    let mut items = Vec::new();
    let mut cursor = RECORD_FILE_HEADER_SIZE;
    while cursor < bytes.len() {
        if bytes.len() - cursor < 4 {
            return Err(ManifestError::Malformed("truncated record length".into()));
        }
        let (len_bytes, _) = bytes[cursor..]
            .split_first_chunk::<4>()
            .ok_or_else(|| ManifestError::Malformed("truncated record length".into()))?;
        let len = u32::from_le_bytes(*len_bytes) as usize;
        cursor += 4;

        if bytes.len() - cursor < len + 4 {
            return Err(ManifestError::Malformed("truncated record".into()));
        }
        let payload = &bytes[cursor..cursor + len];
        cursor += len;

        let (crc_bytes, _) = bytes[cursor..]
            .split_first_chunk::<4>()
            .ok_or_else(|| ManifestError::Malformed("truncated record checksum".into()))?;
        cursor += 4;
        if crc32(payload) != u32::from_le_bytes(*crc_bytes) {
            return Err(ManifestError::ChecksumMismatch);
        }

        let (item, consumed) = encoding::decode_from_slice::<T>(payload)?;
        if consumed != payload.len() {
            return Err(ManifestError::Malformed(
                "record frame holds trailing bytes".into(),
            ));
        }
        items.push(item);
    }
    Ok(items)
}

// ------------------------------------------------------------------------------------------------
// Public codec surface
// ------------------------------------------------------------------------------------------------

/// Reads all entries of one manifest.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    read_record_file(path, MANIFEST_MAGIC)
}

/// Reads all manifest descriptors of one manifest list.
pub fn read_manifest_list(path: &Path) -> Result<Vec<ManifestFileMeta>, ManifestError> {
    read_record_file(path, MANIFEST_LIST_MAGIC)
}

/// Writes a manifest list naming the given manifests, in order.
pub fn write_manifest_list(path: &Path, metas: &[ManifestFileMeta]) -> Result<(), ManifestError> {
    write_record_file(path, MANIFEST_LIST_MAGIC, metas)?;
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// ManifestWriter — rolling writer with partition statistics
// ------------------------------------------------------------------------------------------------

/// Writes manifest entries, rolling to a fresh file past a size target.
///
/// `finish()` returns one [`ManifestFileMeta`] per file written, in write
/// order, each carrying the partition statistics of its own entries.
pub struct ManifestWriter<'a> {
    factory: &'a PathFactory,
    target_size: usize,
    frames: Vec<Vec<u8>>,
    buffered_bytes: usize,
    num_added: u64,
    num_deleted: u64,
    partition_stats: StatsCollector,
    written: Vec<ManifestFileMeta>,
}

impl<'a> ManifestWriter<'a> {
    /// Creates a writer minting file names from `factory`, rolling files
    /// once their encoded entries pass `target_size` bytes.
    pub fn new(factory: &'a PathFactory, target_size: usize) -> Self {
        Self {
            factory,
            target_size,
            frames: Vec::new(),
            buffered_bytes: 0,
            num_added: 0,
            num_deleted: 0,
            partition_stats: StatsCollector::new(),
            written: Vec::new(),
        }
    }

    /// Appends one entry, rolling first when the current file is full.
    pub fn add(&mut self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        if self.buffered_bytes >= self.target_size {
            self.roll()?;
        }
        let frame = encoding::encode_to_vec(entry)?;
        self.buffered_bytes += frame.len();
        self.frames.push(frame);
        match entry.kind {
            FileKind::Add => self.num_added += 1,
            FileKind::Delete => self.num_deleted += 1,
        }
        self.partition_stats.collect(&entry.partition);
        Ok(())
    }

    /// Writes any buffered entries and returns the descriptors of all
    /// files produced, in write order.
    pub fn finish(mut self) -> Result<Vec<ManifestFileMeta>, ManifestError> {
        if !self.frames.is_empty() {
            self.roll()?;
        }
        Ok(self.written)
    }

    fn roll(&mut self) -> Result<(), ManifestError> {
        let (file_name, path) = self.factory.new_manifest();
        let frames = std::mem::take(&mut self.frames);
        let file_size = write_frames(&path, MANIFEST_MAGIC, frames.iter())?;

        let stats = std::mem::take(&mut self.partition_stats);
        let meta = ManifestFileMeta {
            file_name,
            file_size,
            num_added_files: self.num_added,
            num_deleted_files: self.num_deleted,
            partition_stats: stats.finish(),
        };
        debug!(
            file = %meta.file_name,
            added = meta.num_added_files,
            deleted = meta.num_deleted_files,
            "manifest rolled"
        );
        self.written.push(meta);

        self.buffered_bytes = 0;
        self.num_added = 0;
        self.num_deleted = 0;
        Ok(())
    }
}
