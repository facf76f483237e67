//! On-disk record layout of a trace directory.
//!
//! `meta.bin` holds the trace-level header followed by back-to-back
//! variable-length region records, then symbol records. Thread files hold
//! fixed-size instruction records. All integers are little-endian; parsing
//! goes through a bounds-checked cursor, so a truncated or overlong buffer
//! surfaces as an error rather than a wild read.

use std::io::{Read, Write};

use steptrace_container::{ContainerHeader, ReadLeExt, WriteLeExt};
use steptrace_regions::RegionRecord;

use crate::error::{Result, TraceError};
use crate::symbols::SymbolRecord;

/// Fixed instruction width of the traced architecture, in bytes.
pub const INSTRUCTION_WIDTH: u64 = 4;

/// Serialized size of one [`InstructionRecord`].
pub const INSTRUCTION_RECORD_LEN: usize = 8;

/// One logged instruction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionRecord {
    pub pc: u64,
}

/// Trace-level header of `meta.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaHeader {
    pub num_regions: u64,
    pub num_syms: u64,
}

impl ContainerHeader for MetaHeader {
    const MAGIC: [u8; 8] = *b"STEPMETA";
    const ENCODED_LEN: usize = 16;

    fn encode<W: Write>(&self, w: &mut W) -> steptrace_container::Result<()> {
        w.write_u64_le(self.num_regions)?;
        w.write_u64_le(self.num_syms)
    }

    fn decode<R: Read>(r: &mut R) -> steptrace_container::Result<Self> {
        Ok(Self {
            num_regions: r.read_u64_le()?,
            num_syms: r.read_u64_le()?,
        })
    }
}

/// Header of a `region-*.bin` content blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBlobHeader {
    pub digest: [u8; 32],
}

impl ContainerHeader for RegionBlobHeader {
    const MAGIC: [u8; 8] = *b"STEPREGN";
    const ENCODED_LEN: usize = 32;

    fn encode<W: Write>(&self, w: &mut W) -> steptrace_container::Result<()> {
        w.write_bytes(&self.digest)
    }

    fn decode<R: Read>(r: &mut R) -> steptrace_container::Result<Self> {
        let mut digest = [0u8; 32];
        r.read_exact(&mut digest)?;
        Ok(Self { digest })
    }
}

/// Header of a `thread-<tid>.bin` instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHeader {
    pub thread_id: u32,
    pub num_inst: u64,
}

impl ContainerHeader for ThreadHeader {
    const MAGIC: [u8; 8] = *b"STEPTHRD";
    const ENCODED_LEN: usize = 12;

    fn encode<W: Write>(&self, w: &mut W) -> steptrace_container::Result<()> {
        w.write_u32_le(self.thread_id)?;
        w.write_u64_le(self.num_inst)
    }

    fn decode<R: Read>(r: &mut R) -> steptrace_container::Result<Self> {
        Ok(Self {
            thread_id: r.read_u32_le()?,
            num_inst: r.read_u64_le()?,
        })
    }
}

fn write_str_u16<W: Write>(w: &mut W, s: &str, what: &'static str) -> Result<()> {
    let len: u16 = s.len().try_into().map_err(|_| TraceError::Corrupt(what))?;
    w.write_u16_le(len)?;
    w.write_bytes(s.as_bytes())?;
    Ok(())
}

fn read_str_u16<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u16_le()? as usize;
    Ok(String::from_utf8(r.read_exact_vec(len)?)?)
}

pub(crate) fn encode_region_record<W: Write>(w: &mut W, record: &RegionRecord) -> Result<()> {
    w.write_u64_le(record.base)?;
    w.write_u64_le(record.size)?;
    w.write_u64_le(record.slide)?;
    w.write_bytes(&record.uuid)?;
    w.write_bytes(&record.digest)?;
    w.write_u8(record.is_jit as u8)?;
    write_str_u16(w, &record.path, "region path too long")
}

pub(crate) fn decode_region_record<R: Read>(r: &mut R) -> Result<RegionRecord> {
    let base = r.read_u64_le()?;
    let size = r.read_u64_le()?;
    let slide = r.read_u64_le()?;
    let mut uuid = [0u8; 16];
    r.read_exact(&mut uuid)?;
    let mut digest = [0u8; 32];
    r.read_exact(&mut digest)?;
    let is_jit = match r.read_u8()? {
        0 => false,
        1 => true,
        _ => return Err(TraceError::Corrupt("invalid region jit flag")),
    };
    let path = read_str_u16(r)?;
    Ok(RegionRecord {
        base,
        size,
        slide,
        path,
        uuid,
        digest,
        is_jit,
    })
}

pub(crate) fn encode_symbol_record<W: Write>(w: &mut W, symbol: &SymbolRecord) -> Result<()> {
    w.write_u64_le(symbol.base)?;
    w.write_u64_le(symbol.size)?;
    write_str_u16(w, &symbol.name, "symbol name too long")?;
    write_str_u16(w, &symbol.path, "symbol path too long")
}

pub(crate) fn decode_symbol_record<R: Read>(r: &mut R) -> Result<SymbolRecord> {
    let base = r.read_u64_le()?;
    let size = r.read_u64_le()?;
    let name = read_str_u16(r)?;
    let path = read_str_u16(r)?;
    Ok(SymbolRecord {
        base,
        size,
        name,
        path,
    })
}
