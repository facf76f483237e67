use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use steptrace_container::{Compression, ContainerReader, ContainerWriter, ReadLeExt};
use steptrace_regions::{Digest, RegionCatalog};

use crate::capture::{ThreadCapture, ThreadEntry, ThreadMap, ThreadSink};
use crate::error::{Result, TraceError};
use crate::format::{
    decode_region_record, decode_symbol_record, encode_region_record, encode_symbol_record,
    InstructionRecord, MetaHeader, RegionBlobHeader, ThreadHeader, INSTRUCTION_RECORD_LEN,
    INSTRUCTION_WIDTH,
};
use crate::symbols::{RangeSet, SymbolRecord, SymbolTable};

const META_FILE: &str = "meta.bin";
const REGION_PREFIX: &str = "region-";
const THREAD_PREFIX: &str = "thread-";

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Stream records into per-thread container files as they arrive
    /// instead of buffering them in memory until `write`.
    pub streaming: bool,
    pub compression: Compression,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            streaming: false,
            compression: Compression::Lz4,
        }
    }
}

/// Capture-and-storage engine for one trace session.
///
/// During capture, the instrumentation engine calls [`TraceStore::log`]
/// once per executed instruction; [`TraceStore::write`] finalizes the
/// session into the trace directory. [`TraceStore::open`] reconstructs an
/// equivalent store (region catalog, symbol table, per-thread record
/// lists) from a directory written earlier.
pub struct TraceStore {
    dir: PathBuf,
    options: CaptureOptions,
    threads: ThreadMap,
    total_inst: AtomicU64,
    catalog: Option<RegionCatalog>,
    symbols: Option<SymbolTable>,
    thread_records: BTreeMap<u32, Vec<InstructionRecord>>,
}

impl TraceStore {
    /// Starts a capture session in `dir`, creating it if needed.
    ///
    /// Region blobs from a prior generation are kept so unchanged contents
    /// can be reused by digest; every other stale file is removed.
    pub fn create(dir: impl Into<PathBuf>, options: CaptureOptions) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let keep = name
                .to_str()
                .is_some_and(|name| name.starts_with(REGION_PREFIX));
            if !keep {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(Self {
            dir,
            options,
            threads: ThreadMap::new(),
            total_inst: AtomicU64::new(0),
            catalog: None,
            symbols: None,
            thread_records: BTreeMap::new(),
        })
    }

    /// Reconstructs a store from an existing trace directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        let meta = ContainerReader::<MetaHeader, _>::open(dir.join(META_FILE))?;
        let MetaHeader {
            num_regions,
            num_syms,
        } = *meta.header();
        let payload = meta.read_payload()?;
        let mut cursor = std::io::Cursor::new(payload.as_slice());
        let mut region_records = Vec::new();
        for _ in 0..num_regions {
            region_records.push(decode_region_record(&mut cursor)?);
        }
        let mut symbol_records = Vec::new();
        for _ in 0..num_syms {
            symbol_records.push(decode_symbol_record(&mut cursor)?);
        }
        if cursor.position() != payload.len() as u64 {
            return Err(TraceError::Corrupt("trailing bytes in meta payload"));
        }

        let mut bytes_by_digest: HashMap<Digest, Vec<u8>> = HashMap::new();
        let mut thread_files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name
                .to_str()
                .ok_or(TraceError::Corrupt("non-utf8 file name in trace directory"))?;
            if name == META_FILE {
                continue;
            }
            if name.starts_with(REGION_PREFIX) {
                let reader = ContainerReader::<RegionBlobHeader, _>::open(entry.path())?;
                let digest = reader.header().digest;
                bytes_by_digest.insert(digest, reader.read_payload()?);
            } else if name.starts_with(THREAD_PREFIX) {
                thread_files.push(entry.path());
            } else {
                return Err(TraceError::Corrupt("unexpected file in trace directory"));
            }
        }

        let catalog = RegionCatalog::from_records(region_records, &bytes_by_digest)?;

        let mut thread_records = BTreeMap::new();
        let mut total_inst = 0u64;
        for path in thread_files {
            let reader = ContainerReader::<ThreadHeader, _>::open(&path)?;
            let ThreadHeader {
                thread_id,
                num_inst,
            } = *reader.header();
            let payload = reader.read_payload()?;
            if payload.len() % INSTRUCTION_RECORD_LEN != 0 {
                return Err(TraceError::Corrupt("truncated instruction record"));
            }
            let mut records = Vec::with_capacity(payload.len() / INSTRUCTION_RECORD_LEN);
            let mut cursor = std::io::Cursor::new(payload.as_slice());
            for _ in 0..payload.len() / INSTRUCTION_RECORD_LEN {
                records.push(InstructionRecord {
                    pc: cursor.read_u64_le()?,
                });
            }
            if records.len() as u64 != num_inst {
                return Err(TraceError::Corrupt("thread record count mismatch"));
            }
            total_inst += num_inst;
            thread_records.insert(thread_id, records);
        }

        Ok(Self {
            dir,
            options: CaptureOptions::default(),
            threads: ThreadMap::new(),
            total_inst: AtomicU64::new(total_inst),
            catalog: Some(catalog),
            symbols: Some(SymbolTable::new(symbol_records)),
            thread_records,
        })
    }

    fn thread_file(&self, thread_id: u32) -> PathBuf {
        self.dir.join(format!("{THREAD_PREFIX}{thread_id}.bin"))
    }

    fn new_thread_capture(&self, thread_id: u32) -> Result<ThreadCapture> {
        let sink = if self.options.streaming {
            let header = ThreadHeader {
                thread_id,
                num_inst: 0,
            };
            ThreadSink::Streaming {
                writer: ContainerWriter::create(
                    self.thread_file(thread_id),
                    &header,
                    self.options.compression,
                )?,
                pcs: HashSet::new(),
            }
        } else {
            ThreadSink::Buffered(Vec::new())
        };
        Ok(ThreadCapture {
            sink,
            num_inst: 0,
            last_pc: 0,
        })
    }

    /// Records one instruction execution for `thread_id`.
    ///
    /// Safe to call concurrently from multiple threads, each logging under
    /// its own thread id; only the first call from a new thread contends
    /// on its shard.
    pub fn log(&self, thread_id: u32, pc: u64) -> Result<()> {
        let entry = self
            .threads
            .get_or_try_insert(thread_id, || self.new_thread_capture(thread_id))?;
        let mut capture = entry.lock().unwrap();
        match &mut capture.sink {
            ThreadSink::Buffered(buf) => buf.extend_from_slice(&pc.to_le_bytes()),
            ThreadSink::Streaming { writer, pcs } => {
                writer.write_all(&pc.to_le_bytes())?;
                pcs.insert(pc);
            }
        }
        capture.num_inst += 1;
        capture.last_pc = pc;
        self.total_inst.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Total instructions recorded (or reconstructed) across all threads.
    pub fn num_inst(&self) -> u64 {
        self.total_inst.load(Ordering::Relaxed)
    }

    /// Capture payload bytes so far: buffered record bytes, or the
    /// decompressed sizes of the open streams.
    pub fn num_bytes(&self) -> u64 {
        let mut total = 0;
        for (_, entry) in self.threads.entries() {
            let capture = entry.lock().unwrap();
            total += match &capture.sink {
                ThreadSink::Buffered(buf) => buf.len() as u64,
                ThreadSink::Streaming { writer, .. } => writer.decompressed_len(),
            };
        }
        total
    }

    /// Last program counter logged by `thread_id`, if it has logged yet.
    pub fn last_pc(&self, thread_id: u32) -> Option<u64> {
        let entry = self.threads.get(thread_id)?;
        let capture = entry.lock().unwrap();
        Some(capture.last_pc)
    }

    /// Finalizes the session: meta records, narrowed symbols, region
    /// blobs (reusing unchanged ones by digest), per-thread files.
    ///
    /// Runs only after capture has stopped; taking `&mut self` makes a
    /// concurrent `log` call impossible.
    pub fn write(
        &mut self,
        catalog: &RegionCatalog,
        symbols: Option<&SymbolTable>,
    ) -> Result<()> {
        let entries = self.threads.entries();

        let mut pcs: BTreeSet<u64> = BTreeSet::new();
        for (_, entry) in &entries {
            let capture = entry.lock().unwrap();
            match &capture.sink {
                ThreadSink::Buffered(buf) => {
                    for chunk in buf.chunks_exact(INSTRUCTION_RECORD_LEN) {
                        let mut record = [0u8; INSTRUCTION_RECORD_LEN];
                        record.copy_from_slice(chunk);
                        pcs.insert(u64::from_le_bytes(record));
                    }
                }
                ThreadSink::Streaming { pcs: seen, .. } => pcs.extend(seen.iter().copied()),
            }
        }
        let coverage = RangeSet::from_coverage_points(pcs.iter().copied(), INSTRUCTION_WIDTH);
        let narrowed = symbols
            .map(|table| table.overlapping(&coverage))
            .unwrap_or_default();
        tracing::debug!(
            regions = catalog.regions().len(),
            symbols = narrowed.len(),
            distinct_pcs = pcs.len(),
            "writing trace"
        );

        self.write_meta(catalog, &narrowed)?;
        self.write_region_blobs(catalog)?;
        self.finalize_threads(&entries)?;
        Ok(())
    }

    fn write_meta(&self, catalog: &RegionCatalog, symbols: &[SymbolRecord]) -> Result<()> {
        let header = MetaHeader {
            num_regions: catalog.regions().len() as u64,
            num_syms: symbols.len() as u64,
        };
        let mut payload = Vec::new();
        for region in catalog.regions() {
            encode_region_record(&mut payload, &region.to_record())?;
        }
        for symbol in symbols {
            encode_symbol_record(&mut payload, symbol)?;
        }
        let mut writer =
            ContainerWriter::create(self.dir.join(META_FILE), &header, self.options.compression)?;
        writer.write_all(&payload)?;
        writer.finalize(&header)?;
        Ok(())
    }

    fn write_region_blobs(&self, catalog: &RegionCatalog) -> Result<()> {
        // A blob from a prior generation whose header digest still matches
        // the region's digest is kept untouched.
        let mut reused: HashSet<PathBuf> = HashSet::new();
        for region in catalog.regions() {
            let path = self.dir.join(region.blob_file_name());
            if !path.exists() {
                continue;
            }
            if let Ok(reader) = ContainerReader::<RegionBlobHeader, _>::open(&path) {
                if reader.header().digest == region.digest {
                    tracing::debug!(blob = %path.display(), "reusing region blob");
                    reused.insert(path);
                }
            }
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_blob = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(REGION_PREFIX));
            if is_blob && !reused.contains(&path) {
                fs::remove_file(path)?;
            }
        }
        for region in catalog.regions() {
            let path = self.dir.join(region.blob_file_name());
            if reused.contains(&path) {
                continue;
            }
            let header = RegionBlobHeader {
                digest: region.digest,
            };
            let mut writer = ContainerWriter::create(path, &header, self.options.compression)?;
            writer.write_all(&region.bytes)?;
            writer.finalize(&header)?;
        }
        Ok(())
    }

    fn finalize_threads(&self, entries: &[(u32, ThreadEntry)]) -> Result<()> {
        for (thread_id, entry) in entries {
            let mut capture = entry.lock().unwrap();
            let header = ThreadHeader {
                thread_id: *thread_id,
                num_inst: capture.num_inst,
            };
            match &mut capture.sink {
                ThreadSink::Buffered(buf) => {
                    let mut writer = ContainerWriter::create(
                        self.thread_file(*thread_id),
                        &header,
                        self.options.compression,
                    )?;
                    writer.write_all(buf)?;
                    writer.finalize(&header)?;
                }
                ThreadSink::Streaming { writer, .. } => writer.finalize(&header)?,
            }
        }
        Ok(())
    }

    /// Region catalog of a reconstructed trace.
    pub fn regions(&self) -> Option<&RegionCatalog> {
        self.catalog.as_ref()
    }

    /// Symbol table of a reconstructed trace.
    pub fn symbols(&self) -> Option<&SymbolTable> {
        self.symbols.as_ref()
    }

    /// Parsed per-thread record lists of a reconstructed trace, keyed by
    /// thread id.
    pub fn thread_records(&self) -> &BTreeMap<u32, Vec<InstructionRecord>> {
        &self.thread_records
    }
}
