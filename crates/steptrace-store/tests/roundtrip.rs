use std::collections::HashMap;

use sha2::{Digest as _, Sha256};
use steptrace_regions::{RegionCatalog, RegionRecord, PAGE_SIZE};
use steptrace_store::{
    extract_basic_blocks, extract_pcs, BasicBlock, CaptureOptions, Compression, SymbolRecord,
    SymbolTable, TraceError, TraceStore,
};

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn region_bytes(seed: u8) -> Vec<u8> {
    (0..PAGE_SIZE as usize)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect()
}

const TEXT_BASE: u64 = 0x10_0000;
const JIT_BASE: u64 = 0x20_0000;

fn sample_catalog() -> RegionCatalog {
    let text = region_bytes(1);
    let jit = region_bytes(9);
    let records = vec![
        RegionRecord {
            base: TEXT_BASE,
            size: PAGE_SIZE,
            slide: 0x4000,
            path: "/bin/app".into(),
            uuid: [3; 16],
            digest: digest(&text),
            is_jit: false,
        },
        RegionRecord {
            base: JIT_BASE,
            size: PAGE_SIZE,
            slide: 0,
            path: "jit-region-0".into(),
            uuid: [0; 16],
            digest: digest(&jit),
            is_jit: true,
        },
    ];
    let mut bytes_by_digest = HashMap::new();
    bytes_by_digest.insert(digest(&text), text);
    bytes_by_digest.insert(digest(&jit), jit);
    RegionCatalog::from_records(records, &bytes_by_digest).unwrap()
}

fn symbol(base: u64, size: u64, name: &str) -> SymbolRecord {
    SymbolRecord {
        base,
        size,
        name: name.into(),
        path: "/bin/app".into(),
    }
}

fn run_session(options: CaptureOptions) {
    let catalog = sample_catalog();
    let dir = tempfile::tempdir().unwrap();
    let mut store = TraceStore::create(dir.path(), options).unwrap();

    let thread_1 = [TEXT_BASE, TEXT_BASE + 4, TEXT_BASE + 8, TEXT_BASE + 0x100];
    let thread_2 = [JIT_BASE, JIT_BASE + 4];
    for &pc in &thread_1 {
        store.log(1, pc).unwrap();
    }
    for &pc in &thread_2 {
        store.log(2, pc).unwrap();
    }

    assert_eq!(store.num_inst(), 6);
    assert_eq!(store.last_pc(1), Some(TEXT_BASE + 0x100));
    assert_eq!(store.last_pc(3), None);
    assert_eq!(store.num_bytes(), 6 * 8);

    let symbols = SymbolTable::new(vec![
        symbol(TEXT_BASE, 16, "_start"),
        symbol(0x9000_0000, 64, "_unreached"),
    ]);
    store.write(&catalog, Some(&symbols)).unwrap();

    let reopened = TraceStore::open(dir.path()).unwrap();
    assert_eq!(reopened.num_inst(), 6);

    let records = reopened.thread_records();
    assert_eq!(records.len(), 2);
    assert_eq!(extract_pcs(&records[&1]), thread_1);
    assert_eq!(extract_pcs(&records[&2]), thread_2);

    let blocks = extract_basic_blocks(&extract_pcs(&records[&1]));
    assert_eq!(
        blocks,
        vec![
            BasicBlock {
                pc: TEXT_BASE,
                size: 12
            },
            BasicBlock {
                pc: TEXT_BASE + 0x100,
                size: 4
            },
        ]
    );

    let catalog_2 = reopened.regions().unwrap();
    assert_eq!(catalog_2.regions().len(), 2);
    for region in catalog.regions() {
        let restored = catalog_2.lookup(region.base);
        assert_eq!(restored.bytes, region.bytes);
        assert_eq!(restored.digest, region.digest);
        assert_eq!(restored.path, region.path);
        assert_eq!(restored.slide, region.slide);
        assert_eq!(restored.is_jit, region.is_jit);
    }
    assert_eq!(
        catalog_2.resolve_page(JIT_BASE),
        catalog.resolve_page(JIT_BASE)
    );

    let names: Vec<&str> = reopened
        .symbols()
        .unwrap()
        .records()
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(names, vec!["_start"]);
}

#[test]
fn buffered_session_round_trips() {
    run_session(CaptureOptions::default());
}

#[test]
fn streaming_session_round_trips() {
    run_session(CaptureOptions {
        streaming: true,
        compression: Compression::Lz4,
    });
}

#[test]
fn uncompressed_session_round_trips() {
    run_session(CaptureOptions {
        streaming: false,
        compression: Compression::None,
    });
}

#[test]
fn create_removes_stale_files_but_keeps_region_blobs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("meta.bin"), b"stale").unwrap();
    std::fs::write(dir.path().join("thread-9.bin"), b"stale").unwrap();
    std::fs::write(dir.path().join("region-app-00010203.bin"), b"blob").unwrap();

    let _store = TraceStore::create(dir.path(), CaptureOptions::default()).unwrap();

    assert!(!dir.path().join("meta.bin").exists());
    assert!(!dir.path().join("thread-9.bin").exists());
    assert!(dir.path().join("region-app-00010203.bin").exists());
}

#[test]
fn unexpected_files_fail_reconstruction() {
    let catalog = sample_catalog();
    let dir = tempfile::tempdir().unwrap();
    let mut store = TraceStore::create(dir.path(), CaptureOptions::default()).unwrap();
    store.log(1, TEXT_BASE).unwrap();
    store.write(&catalog, None).unwrap();

    std::fs::write(dir.path().join("notes.txt"), b"junk").unwrap();
    assert!(matches!(
        TraceStore::open(dir.path()),
        Err(TraceError::Corrupt("unexpected file in trace directory"))
    ));
}

#[test]
fn truncated_thread_files_fail_reconstruction() {
    let catalog = sample_catalog();
    let dir = tempfile::tempdir().unwrap();
    let mut store = TraceStore::create(
        dir.path(),
        CaptureOptions {
            streaming: false,
            // Uncompressed payloads keep the chunk framing byte-addressable
            // so the truncation below lands inside a record.
            compression: Compression::None,
        },
    )
    .unwrap();
    for pc in [TEXT_BASE, TEXT_BASE + 4, TEXT_BASE + 8] {
        store.log(1, pc).unwrap();
    }
    store.write(&catalog, None).unwrap();

    let path = dir.path().join("thread-1.bin");
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&path, bytes).unwrap();

    assert!(TraceStore::open(dir.path()).is_err());
}
