//! Generic compressed container files.
//!
//! Every on-disk artifact of a trace shares one envelope: an 8-byte magic
//! constant identifying the header type, a format version, a compression
//! tag, a fixed-size typed header, and a chunked (optionally compressed)
//! payload. Readers validate the magic and version before trusting the
//! header. The writer buffers payload into fixed-size chunks and can patch
//! the header in place after the payload has been streamed out, which is
//! what lets per-thread capture streams finalize their record counts late.

mod error;
mod io;

pub use crate::error::{ContainerError, Result};
pub use crate::io::{ReadLeExt, WriteLeExt};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

pub const CONTAINER_VERSION: u16 = 1;

/// Magic (8) + version (2) + compression (1) + reserved (1).
const ENVELOPE_LEN: u64 = 12;
const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

/// Fixed-size typed header stored at the front of a container file.
pub trait ContainerHeader: Sized {
    const MAGIC: [u8; 8];
    /// Exact encoded byte length; `encode` must produce this many bytes so
    /// the header can be patched in place.
    const ENCODED_LEN: usize;

    fn encode<W: Write>(&self, w: &mut W) -> Result<()>;
    fn decode<R: Read>(r: &mut R) -> Result<Self>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    #[default]
    Lz4 = 1,
}

impl Compression {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            _ => Err(ContainerError::Corrupt("invalid compression kind")),
        }
    }
}

// LZ4 worst-case size: uncompressed + (uncompressed / 255) + 16
fn max_lz4_compressed_len(uncompressed_len: u32) -> u32 {
    uncompressed_len
        .saturating_add(uncompressed_len / 255)
        .saturating_add(16)
}

fn compress(kind: Compression, input: &[u8]) -> Vec<u8> {
    match kind {
        Compression::None => input.to_vec(),
        Compression::Lz4 => lz4_flex::block::compress(input),
    }
}

fn decompress(kind: Compression, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    match kind {
        Compression::None => {
            if compressed.len() != expected_len {
                return Err(ContainerError::Corrupt("uncompressed chunk length mismatch"));
            }
            Ok(compressed.to_vec())
        }
        Compression::Lz4 => Ok(lz4_flex::block::decompress(compressed, expected_len)?),
    }
}

fn encode_header<H: ContainerHeader>(header: &H) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(H::ENCODED_LEN);
    header.encode(&mut bytes)?;
    if bytes.len() != H::ENCODED_LEN {
        return Err(ContainerError::Corrupt("header encoded length mismatch"));
    }
    Ok(bytes)
}

/// Streaming container writer.
///
/// Payload bytes accumulate into chunks of `chunk_size` and are compressed
/// chunk by chunk. [`ContainerWriter::finalize`] flushes the tail chunk and
/// rewrites the header bytes in place, so a header field such as a record
/// count can be filled in after the payload is complete.
pub struct ContainerWriter<H: ContainerHeader, W: Write + Seek> {
    inner: W,
    compression: Compression,
    chunk_size: usize,
    pending: Vec<u8>,
    decompressed_len: u64,
    finalized: bool,
    _header: PhantomData<H>,
}

impl<H: ContainerHeader> ContainerWriter<H, BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, header: &H, compression: Compression) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), header, compression)
    }
}

impl<H: ContainerHeader, W: Write + Seek> ContainerWriter<H, W> {
    pub fn new(inner: W, header: &H, compression: Compression) -> Result<Self> {
        Self::with_chunk_size(inner, header, compression, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(
        mut inner: W,
        header: &H,
        compression: Compression,
        chunk_size: usize,
    ) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE as usize {
            return Err(ContainerError::Corrupt("invalid chunk size"));
        }
        inner.write_bytes(&H::MAGIC)?;
        inner.write_u16_le(CONTAINER_VERSION)?;
        inner.write_u8(compression as u8)?;
        inner.write_u8(0)?; // reserved
        inner.write_bytes(&encode_header(header)?)?;
        Ok(Self {
            inner,
            compression,
            chunk_size,
            pending: Vec::new(),
            decompressed_len: 0,
            finalized: false,
            _header: PhantomData,
        })
    }

    /// Total payload bytes appended so far, before compression.
    pub fn decompressed_len(&self) -> u64 {
        self.decompressed_len
    }

    pub fn write_all(&mut self, mut bytes: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(ContainerError::Corrupt("write after finalize"));
        }
        self.decompressed_len += bytes.len() as u64;
        while self.pending.len() + bytes.len() >= self.chunk_size {
            let take = self.chunk_size - self.pending.len();
            self.pending.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            self.flush_chunk()?;
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let compressed = compress(self.compression, &self.pending);
        self.inner.write_u32_le(self.pending.len() as u32)?;
        self.inner.write_u32_le(
            compressed
                .len()
                .try_into()
                .map_err(|_| ContainerError::Corrupt("compressed chunk too large"))?,
        )?;
        self.inner.write_bytes(&compressed)?;
        self.pending.clear();
        Ok(())
    }

    /// Flushes the tail chunk and rewrites the header bytes in place.
    ///
    /// May be called again with an updated header; the payload is not
    /// writable after the first call.
    pub fn finalize(&mut self, header: &H) -> Result<()> {
        self.flush_chunk()?;
        self.finalized = true;
        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(ENVELOPE_LEN))?;
        self.inner.write_bytes(&encode_header(header)?)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Container reader. The header is decoded (and the envelope validated)
/// eagerly; the payload is only read on demand, so probing a file for its
/// header alone stays cheap.
#[derive(Debug)]
pub struct ContainerReader<H: ContainerHeader, R: Read> {
    inner: R,
    header: H,
    compression: Compression,
}

impl<H: ContainerHeader> ContainerReader<H, BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<H: ContainerHeader, R: Read> ContainerReader<H, R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        inner.read_exact(&mut magic)?;
        if magic != H::MAGIC {
            return Err(ContainerError::InvalidMagic);
        }
        let version = inner.read_u16_le()?;
        if version != CONTAINER_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let compression = Compression::from_u8(inner.read_u8()?)?;
        let _reserved = inner.read_u8()?;
        let header = H::decode(&mut inner)?;
        Ok(Self {
            inner,
            header,
            compression,
        })
    }

    pub fn header(&self) -> &H {
        &self.header
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Reads and decompresses the whole payload.
    pub fn read_payload(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some((raw_len, compressed)) = self.read_chunk()? {
            let decompressed = decompress(self.compression, &compressed, raw_len)?;
            out.extend_from_slice(&decompressed);
        }
        Ok(out)
    }

    fn read_chunk(&mut self) -> Result<Option<(usize, Vec<u8>)>> {
        // One-byte probe so a clean end of file is distinguishable from a
        // length field torn mid-way.
        let mut first = [0u8; 1];
        if self.inner.read(&mut first)? == 0 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes[0] = first[0];
        self.inner.read_exact(&mut len_bytes[1..])?;
        let raw_len = u32::from_le_bytes(len_bytes);
        if raw_len == 0 || raw_len > MAX_CHUNK_SIZE {
            return Err(ContainerError::Corrupt("invalid chunk length"));
        }
        let compressed_len = self.inner.read_u32_le()?;
        match self.compression {
            Compression::None => {
                if compressed_len != raw_len {
                    return Err(ContainerError::Corrupt(
                        "compressed_len must equal uncompressed_len for no compression",
                    ));
                }
            }
            Compression::Lz4 => {
                if compressed_len > max_lz4_compressed_len(raw_len) {
                    return Err(ContainerError::Corrupt("lz4 chunk too large"));
                }
            }
        }
        let compressed = self.inner.read_exact_vec(compressed_len as usize)?;
        Ok(Some((raw_len as usize, compressed)))
    }
}
