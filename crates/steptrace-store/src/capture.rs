//! Per-thread capture state and the striped thread map.
//!
//! Each application thread only ever logs under its own thread id, so the
//! map is striped: inserting a previously unseen thread takes its shard's
//! write lock once, while steady-state appends take only the entry's own
//! mutex, which no other thread contends for.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufWriter;
use std::sync::{Arc, Mutex, RwLock};

use steptrace_container::ContainerWriter;

use crate::format::ThreadHeader;

const SHARD_COUNT: usize = 16;

pub(crate) enum ThreadSink {
    /// Records accumulate in memory until `write` persists them.
    Buffered(Vec<u8>),
    /// Records stream straight into the thread's container file; the
    /// header's instruction count is patched at finalize. The distinct-pc
    /// set is tracked incrementally since the records are gone from
    /// memory.
    Streaming {
        writer: ContainerWriter<ThreadHeader, BufWriter<File>>,
        pcs: HashSet<u64>,
    },
}

pub(crate) struct ThreadCapture {
    pub sink: ThreadSink,
    pub num_inst: u64,
    pub last_pc: u64,
}

pub(crate) type ThreadEntry = Arc<Mutex<ThreadCapture>>;

pub(crate) struct ThreadMap {
    shards: [RwLock<HashMap<u32, ThreadEntry>>; SHARD_COUNT],
}

impl ThreadMap {
    pub fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
        }
    }

    fn shard(&self, thread_id: u32) -> &RwLock<HashMap<u32, ThreadEntry>> {
        &self.shards[thread_id as usize % SHARD_COUNT]
    }

    pub fn get(&self, thread_id: u32) -> Option<ThreadEntry> {
        self.shard(thread_id).read().unwrap().get(&thread_id).cloned()
    }

    pub fn get_or_try_insert<E>(
        &self,
        thread_id: u32,
        init: impl FnOnce() -> Result<ThreadCapture, E>,
    ) -> Result<ThreadEntry, E> {
        if let Some(entry) = self.get(thread_id) {
            return Ok(entry);
        }
        let mut shard = self.shard(thread_id).write().unwrap();
        if let Some(entry) = shard.get(&thread_id) {
            return Ok(entry.clone());
        }
        let entry = Arc::new(Mutex::new(init()?));
        shard.insert(thread_id, entry.clone());
        Ok(entry)
    }

    /// Snapshot of all entries, ordered by thread id.
    pub fn entries(&self) -> Vec<(u32, ThreadEntry)> {
        let mut all = Vec::new();
        for shard in &self.shards {
            for (thread_id, entry) in shard.read().unwrap().iter() {
                all.push((*thread_id, entry.clone()));
            }
        }
        all.sort_by_key(|(thread_id, _)| *thread_id);
        all
    }
}
