//! Fixed-width binary records exchanged between the dedup stages.
//!
//! | File | Record | Layout (little-endian) |
//! |---|---|---|
//! | `<shard:05>.sig` | [`HashSignature`] | `u64 hash, u32 doc_id, u16 sentence_id` (14 bytes) |
//! | `<shard:05>.dup` | [`DuplicateRecord`] | `u32 doc_id, u16 sentence_id` (6 bytes) |
//!
//! Files have no header or footer; the record count is the file length
//! divided by the record size.

use crate::error::{DedupError, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of stage 1 signature files.
pub const SIGNATURE_EXTENSION: &str = "sig";

/// Extension of stage 2 duplicate files.
pub const DUPLICATE_EXTENSION: &str = "dup";

/// A record with a fixed-size little-endian encoding.
pub trait FixedRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Byte buffer holding one encoded record.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    fn encode(&self) -> Self::Bytes;

    fn decode(bytes: &Self::Bytes) -> Self;
}

/// Hash of one sentence window and where it starts.
///
/// Field order gives the derived ordering `(hash_value, doc_id, sentence_id)`,
/// which is the on-disk sort order within a single shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashSignature {
    pub hash_value: u64,
    /// Position of the document within its shard.
    pub doc_id: u32,
    /// Index of the first sentence of the window.
    pub sentence_id: u16,
}

impl HashSignature {
    #[must_use]
    pub fn new(hash_value: u64, doc_id: u32, sentence_id: u16) -> Self {
        Self {
            hash_value,
            doc_id,
            sentence_id,
        }
    }
}

impl FixedRecord for HashSignature {
    const SIZE: usize = 14;
    type Bytes = [u8; 14];

    fn encode(&self) -> [u8; 14] {
        let mut buf = [0u8; 14];
        buf[0..8].copy_from_slice(&self.hash_value.to_le_bytes());
        buf[8..12].copy_from_slice(&self.doc_id.to_le_bytes());
        buf[12..14].copy_from_slice(&self.sentence_id.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8; 14]) -> Self {
        let mut hash = [0u8; 8];
        hash.copy_from_slice(&bytes[0..8]);
        let mut doc = [0u8; 4];
        doc.copy_from_slice(&bytes[8..12]);
        Self {
            hash_value: u64::from_le_bytes(hash),
            doc_id: u32::from_le_bytes(doc),
            sentence_id: u16::from_le_bytes([bytes[12], bytes[13]]),
        }
    }
}

/// A signature tagged with the shard it was read from.
///
/// Ordered by [`ShardedSignature::merge_key`]: the global merge order in
/// which the first record of each hash value is the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardedSignature {
    pub shard_id: usize,
    pub signature: HashSignature,
}

impl ShardedSignature {
    #[must_use]
    pub fn new(shard_id: usize, signature: HashSignature) -> Self {
        Self {
            shard_id,
            signature,
        }
    }

    /// `(hash_value, shard_id, doc_id, sentence_id)`
    #[must_use]
    pub fn merge_key(&self) -> (u64, usize, u32, u16) {
        (
            self.signature.hash_value,
            self.shard_id,
            self.signature.doc_id,
            self.signature.sentence_id,
        )
    }
}

impl Ord for ShardedSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.merge_key().cmp(&other.merge_key())
    }
}

impl PartialOrd for ShardedSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A sentence window flagged for removal from its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DuplicateRecord {
    pub doc_id: u32,
    pub sentence_id: u16,
}

impl DuplicateRecord {
    #[must_use]
    pub fn new(doc_id: u32, sentence_id: u16) -> Self {
        Self {
            doc_id,
            sentence_id,
        }
    }
}

impl From<HashSignature> for DuplicateRecord {
    fn from(sig: HashSignature) -> Self {
        Self::new(sig.doc_id, sig.sentence_id)
    }
}

impl FixedRecord for DuplicateRecord {
    const SIZE: usize = 6;
    type Bytes = [u8; 6];

    fn encode(&self) -> [u8; 6] {
        let mut buf = [0u8; 6];
        buf[0..4].copy_from_slice(&self.doc_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.sentence_id.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8; 6]) -> Self {
        Self {
            doc_id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            sentence_id: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }
}

/// Sequential reader over a file of fixed-width records.
///
/// A trailing partial record ends the stream as if it were end of file; the
/// number of dangling bytes is logged and kept in [`truncated_bytes`].
///
/// [`truncated_bytes`]: RecordReader::truncated_bytes
pub struct RecordReader<R: FixedRecord> {
    reader: BufReader<File>,
    path: PathBuf,
    truncated: usize,
    done: bool,
    _record: PhantomData<R>,
}

impl<R: FixedRecord> RecordReader<R> {
    /// Open `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Opening record file");
        Ok(Self {
            reader: BufReader::new(File::open(&path)?),
            path,
            truncated: 0,
            done: false,
            _record: PhantomData,
        })
    }

    /// Path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of an incomplete trailing record, 0 if the file was well formed.
    #[must_use]
    pub fn truncated_bytes(&self) -> usize {
        self.truncated
    }

    /// Read one record; `Ok(None)` at end of file.
    pub fn read_record(&mut self) -> io::Result<Option<R>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = R::Bytes::default();
        let bytes = buf.as_mut();
        let mut filled = 0;
        while filled < bytes.len() {
            match self.reader.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == R::SIZE {
            return Ok(Some(R::decode(&buf)));
        }

        self.done = true;
        if filled > 0 {
            self.truncated = filled;
            warn!(
                path = %self.path.display(),
                dangling_bytes = filled,
                "Truncated record at end of file, treating as end of file"
            );
        }
        Ok(None)
    }
}

impl<R: FixedRecord> Iterator for RecordReader<R> {
    type Item = io::Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Buffered writer of fixed-width records.
pub struct RecordWriter<R: FixedRecord> {
    writer: BufWriter<File>,
    written: u64,
    _record: PhantomData<R>,
}

impl<R: FixedRecord> RecordWriter<R> {
    /// Create (or truncate) `path`, creating parent folders.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "Creating record file");
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            written: 0,
            _record: PhantomData,
        })
    }

    /// Append one record.
    pub fn write(&mut self, record: &R) -> io::Result<()> {
        self.writer.write_all(record.encode().as_ref())?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush to disk, returning the number of records written.
    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// `<dir>/<shard:05>.sig`
#[must_use]
pub fn signature_path(dir: &Path, shard_index: usize) -> PathBuf {
    dir.join(format!("{shard_index:05}.{SIGNATURE_EXTENSION}"))
}

/// `<dir>/<shard:05>.dup`
#[must_use]
pub fn duplicate_path(dir: &Path, shard_index: usize) -> PathBuf {
    dir.join(format!("{shard_index:05}.{DUPLICATE_EXTENSION}"))
}

/// Shard index encoded in a `<digits>.<extension>` file name.
#[must_use]
pub fn parse_shard_index(path: &Path, extension: &str) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Every `*.sig` file in `dir` with its shard index, ordered by index.
pub fn list_signature_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_sig = path
            .extension()
            .is_some_and(|ext| ext == SIGNATURE_EXTENSION);
        if !path.is_file() || !is_sig {
            continue;
        }
        match parse_shard_index(&path, SIGNATURE_EXTENSION) {
            Some(index) => files.push((index, path)),
            None => return Err(DedupError::InvalidShardFile { path }),
        }
    }
    files.sort();
    Ok(files)
}

/// Load a whole duplicate file.
pub fn read_duplicates<P: AsRef<Path>>(path: P) -> Result<Vec<DuplicateRecord>> {
    let reader = RecordReader::<DuplicateRecord>::open(path)?;
    Ok(reader.collect::<io::Result<Vec<_>>>()?)
}
