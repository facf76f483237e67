//! End-to-end capture sessions: scan a fake process, log from parallel
//! threads, write the trace, and reconstruct it.

mod harness;

use std::sync::Arc;
use std::thread;

use harness::{FakeProcess, APP_BASE, JIT_BASE};
use steptrace_regions::RegionCatalog;
use steptrace_store::{
    extract_basic_blocks, extract_pcs, BasicBlock, CaptureOptions, Compression, TraceStore,
};

const THREADS: u32 = 4;
const RECORDS_PER_THREAD: u64 = 500;
// Each thread laps a 64-instruction window, so every wrap is a
// basic-block discontinuity.
const LAP: u64 = 64;

fn run_parallel_session(options: CaptureOptions) {
    let process = FakeProcess::sample();
    let catalog = RegionCatalog::scan(&process).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let store = Arc::new(TraceStore::create(dir.path(), options).unwrap());
    let mut handles = Vec::new();
    for thread_id in 1..=THREADS {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..RECORDS_PER_THREAD {
                store.log(thread_id, APP_BASE + (i % LAP) * 4).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut store = Arc::into_inner(store).expect("capture threads joined");
    assert_eq!(store.num_inst(), THREADS as u64 * RECORDS_PER_THREAD);
    store.write(&catalog, None).unwrap();

    let reopened = TraceStore::open(dir.path()).unwrap();
    assert_eq!(reopened.num_inst(), THREADS as u64 * RECORDS_PER_THREAD);
    assert_eq!(reopened.thread_records().len(), THREADS as usize);

    let expected: Vec<u64> = (0..RECORDS_PER_THREAD)
        .map(|i| APP_BASE + (i % LAP) * 4)
        .collect();
    for thread_id in 1..=THREADS {
        let pcs = extract_pcs(&reopened.thread_records()[&thread_id]);
        assert_eq!(pcs, expected, "thread {thread_id}");
    }

    // 500 records over a 64-instruction lap: 7 full laps and a 52-record
    // tail, each lap boundary a discontinuity.
    let blocks = extract_basic_blocks(&expected);
    assert_eq!(blocks.len(), 8);
    assert_eq!(
        blocks[0],
        BasicBlock {
            pc: APP_BASE,
            size: (LAP * 4) as u32
        }
    );
    assert_eq!(
        blocks[7],
        BasicBlock {
            pc: APP_BASE,
            size: ((RECORDS_PER_THREAD - 7 * LAP) * 4) as u32
        }
    );

    // The reconstructed catalog serves the same bytes as the scanned one,
    // including the JIT page.
    let restored = reopened.regions().unwrap();
    assert_eq!(restored.regions().len(), catalog.regions().len());
    for region in catalog.regions() {
        let restored_region = restored.lookup(region.base);
        assert_eq!(restored_region.digest, region.digest);
        assert_eq!(restored_region.bytes, region.bytes);
    }
    assert_eq!(restored.resolve_page(JIT_BASE), catalog.resolve_page(JIT_BASE));
    assert!(restored.lookup_by_name("jit-region-0").is_jit);
}

#[test]
fn buffered_parallel_session_round_trips() {
    run_parallel_session(CaptureOptions::default());
}

#[test]
fn streaming_parallel_session_round_trips() {
    run_parallel_session(CaptureOptions {
        streaming: true,
        compression: Compression::Lz4,
    });
}
