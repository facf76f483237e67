use boomphf::Mphf;

use crate::region::{Region, PAGE_SHIFT, PAGE_SIZE};

/// BBHash space/speed tradeoff; the usual default.
const MPH_GAMMA: f64 = 1.7;

#[derive(Clone, Copy, Debug)]
struct PageSlot {
    region: u32,
    offset: u64,
}

/// O(1) page-address-to-bytes index.
///
/// A minimal perfect hash is built over the set of page numbers covered by
/// any region, then a slot table maps each hashed page to its owning
/// region and offset. The hash is only defined for in-catalog pages;
/// queries for unknown addresses are a capture bug and may panic or alias
/// onto an arbitrary in-catalog page.
#[derive(Debug)]
pub(crate) struct PageIndex {
    mph: Option<Mphf<u64>>,
    slots: Vec<PageSlot>,
}

impl PageIndex {
    pub fn build(regions: &[Region]) -> Self {
        let mut pages: Vec<u64> = Vec::new();
        for region in regions {
            debug_assert_eq!(region.base % PAGE_SIZE, 0);
            debug_assert_eq!(region.size % PAGE_SIZE, 0);
            for off in (0..region.size).step_by(PAGE_SIZE as usize) {
                pages.push((region.base + off) >> PAGE_SHIFT);
            }
        }
        pages.sort_unstable();
        pages.dedup();
        if pages.is_empty() {
            return Self {
                mph: None,
                slots: Vec::new(),
            };
        }

        tracing::debug!(pages = pages.len(), "building page index");
        let mph = Mphf::new(MPH_GAMMA, &pages);
        let mut slots = vec![PageSlot { region: 0, offset: 0 }; pages.len()];
        // All regions first, then JIT regions again: a page claimed by
        // both a base and a JIT region resolves to the JIT bytes.
        for jit_pass in [false, true] {
            for (index, region) in regions.iter().enumerate() {
                if jit_pass && !region.is_jit {
                    continue;
                }
                for off in (0..region.size).step_by(PAGE_SIZE as usize) {
                    let slot = mph.hash(&((region.base + off) >> PAGE_SHIFT)) as usize;
                    slots[slot] = PageSlot {
                        region: index as u32,
                        offset: off,
                    };
                }
            }
        }
        Self {
            mph: Some(mph),
            slots,
        }
    }

    /// Returns the captured page containing `addr` as a `PAGE_SIZE` slice.
    pub fn resolve<'a>(&self, regions: &'a [Region], addr: u64) -> &'a [u8] {
        let page = addr >> PAGE_SHIFT;
        let slot = self
            .mph
            .as_ref()
            .and_then(|mph| mph.try_hash(&page))
            .unwrap_or_else(|| panic!("page {:#x} not covered by any region", addr & !(PAGE_SIZE - 1)));
        let PageSlot { region, offset } = self.slots[slot as usize];
        let region = &regions[region as usize];
        let start = offset as usize;
        &region.bytes[start..start + PAGE_SIZE as usize]
    }
}
