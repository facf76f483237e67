//! Trace capture and on-disk storage.
//!
//! A [`TraceStore`] turns the raw `(thread, pc)` event stream of an
//! instrumentation engine into a durable, content-deduplicated trace
//! directory, and reconstructs an equivalent in-memory representation from
//! such a directory later. Per-thread instruction streams are captured
//! buffered or streaming; memory-region blobs are deduplicated across
//! trace generations by content digest; symbols are narrowed at write time
//! to the address ranges the trace actually touched.

mod blocks;
mod capture;
mod error;
mod format;
mod store;
mod symbols;

pub use steptrace_container::Compression;

pub use crate::blocks::{extract_basic_blocks, extract_pcs, BasicBlock};
pub use crate::error::{Result, TraceError};
pub use crate::format::{
    InstructionRecord, MetaHeader, RegionBlobHeader, ThreadHeader, INSTRUCTION_RECORD_LEN,
    INSTRUCTION_WIDTH,
};
pub use crate::store::{CaptureOptions, TraceStore};
pub use crate::symbols::{RangeSet, SymbolRecord, SymbolTable};
