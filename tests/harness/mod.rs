//! Shared fake process target for end-to-end trace session tests.

use steptrace_regions::{ImageInfo, Mapping, ProcessTarget, Protection, Result, PAGE_SIZE};

pub const APP_BASE: u64 = 0x1_0000_0000;
pub const JIT_BASE: u64 = 0x2_0000_0000;

pub struct FakeProcess {
    images: Vec<ImageInfo>,
    mappings: Vec<Mapping>,
    memory: Vec<(u64, Vec<u8>)>,
}

fn page_bytes(seed: u8, pages: usize) -> Vec<u8> {
    (0..pages * PAGE_SIZE as usize)
        .map(|i| seed.wrapping_add((i % 239) as u8))
        .collect()
}

impl FakeProcess {
    /// One two-page application image plus one single-page JIT mapping.
    pub fn sample() -> Self {
        let app = page_bytes(17, 2);
        let jit = page_bytes(91, 1);
        Self {
            images: vec![ImageInfo {
                base: APP_BASE,
                size: app.len() as u64,
                slide: 0x8000,
                path: "/bin/app".into(),
                uuid: [5; 16],
            }],
            mappings: vec![Mapping {
                base: JIT_BASE,
                size: jit.len() as u64,
                prot: Protection::READ | Protection::WRITE | Protection::EXECUTE,
                jit_like: true,
            }],
            memory: vec![(APP_BASE, app), (JIT_BASE, jit)],
        }
    }
}

impl ProcessTarget for FakeProcess {
    fn suspend(&self) -> Result<()> {
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        Ok(())
    }

    fn images(&self) -> Result<Vec<ImageInfo>> {
        Ok(self.images.clone())
    }

    fn mappings(&self) -> Result<Vec<Mapping>> {
        Ok(self.mappings.clone())
    }

    fn read_memory(&self, base: u64, len: usize) -> Result<Vec<u8>> {
        for (span_base, bytes) in &self.memory {
            let end = span_base + bytes.len() as u64;
            if *span_base <= base && base + len as u64 <= end {
                let off = (base - span_base) as usize;
                return Ok(bytes[off..off + len].to_vec());
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no memory span at {base:#x}"),
        )
        .into())
    }
}
