use std::collections::HashMap;

use sha2::{Digest as _, Sha256};

use crate::error::{RegionError, Result};
use crate::page_index::PageIndex;
use crate::region::{round_up_to_page, Digest, Region, RegionRecord, PAGE_SIZE};
use crate::target::{ProcessTarget, Protection};

fn content_digest(bytes: &[u8]) -> Digest {
    Sha256::digest(bytes).into()
}

fn digest_prefix(digest: &Digest) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

/// The set of captured memory regions of one scan (or one reconstructed
/// trace), sorted by base address, with an O(1) page index over them.
///
/// A catalog is immutable once built; a rescan builds a new catalog
/// wholesale.
#[derive(Debug)]
pub struct RegionCatalog {
    regions: Vec<Region>,
    page_index: PageIndex,
}

impl RegionCatalog {
    /// Captures the target's current region set.
    ///
    /// One region is produced per loaded image (size rounded up to a page
    /// multiple, bytes copied, contents digested), plus one synthesized
    /// `jit-region-<n>` region per executable JIT-like mapping not covered
    /// by any image. A remote target is suspended for the duration so the
    /// address space is consistent.
    pub fn scan(target: &dyn ProcessTarget) -> Result<Self> {
        let remote = !target.is_local();
        if remote {
            target.suspend()?;
        }
        let scanned = Self::scan_suspended(target);
        let resumed = if remote { target.resume() } else { Ok(()) };
        let catalog = scanned?;
        resumed?;
        Ok(catalog)
    }

    fn scan_suspended(target: &dyn ProcessTarget) -> Result<Self> {
        let mut regions = Vec::new();
        for image in target.images()? {
            let size = round_up_to_page(image.size);
            let bytes = target.read_memory(image.base, size as usize)?;
            regions.push(Region {
                base: image.base,
                size,
                slide: image.slide,
                path: image.path,
                uuid: image.uuid,
                digest: content_digest(&bytes),
                bytes,
                is_jit: false,
            });
        }

        let mut jit_count = 0usize;
        for mapping in target.mappings()? {
            if !mapping.prot.contains(Protection::EXECUTE) {
                continue;
            }
            if !mapping.prot.contains(Protection::READ) {
                tracing::warn!(
                    base = format_args!("{:#018x}", mapping.base),
                    "execute-only mapping"
                );
            }
            let size = round_up_to_page(mapping.size);
            let covered = regions
                .iter()
                .any(|r| mapping.base < r.base + r.size && r.base < mapping.base + size);
            if covered || !mapping.jit_like {
                continue;
            }
            let bytes = target.read_memory(mapping.base, size as usize)?;
            regions.push(Region {
                base: mapping.base,
                size,
                slide: 0,
                path: format!("jit-region-{jit_count}"),
                uuid: [0; 16],
                digest: content_digest(&bytes),
                bytes,
                is_jit: true,
            });
            jit_count += 1;
        }

        Ok(Self::from_regions(regions))
    }

    /// Rebuilds a catalog from serialized metadata plus digest-keyed
    /// payloads (blob contents reused from a prior trace generation load
    /// under the same digest).
    pub fn from_records(
        records: Vec<RegionRecord>,
        bytes_by_digest: &HashMap<Digest, Vec<u8>>,
    ) -> Result<Self> {
        let mut regions = Vec::with_capacity(records.len());
        for record in records {
            let bytes = bytes_by_digest
                .get(&record.digest)
                .cloned()
                .ok_or_else(|| RegionError::MissingBlob(digest_prefix(&record.digest)))?;
            if bytes.len() as u64 != record.size {
                return Err(RegionError::SizeMismatch {
                    path: record.path,
                    expected: record.size,
                    found: bytes.len() as u64,
                });
            }
            regions.push(Region {
                base: record.base,
                size: record.size,
                slide: record.slide,
                path: record.path,
                uuid: record.uuid,
                digest: record.digest,
                bytes,
                is_jit: record.is_jit,
            });
        }
        Ok(Self::from_regions(regions))
    }

    fn from_regions(mut regions: Vec<Region>) -> Self {
        regions.sort_by_key(|r| r.base);
        let page_index = PageIndex::build(&regions);
        Self {
            regions,
            page_index,
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Returns the region owning `addr`.
    ///
    /// Panics if no region contains the address: a trace only ever
    /// references addresses inside known regions, so a miss means the
    /// capture itself is untrustworthy.
    pub fn lookup(&self, addr: u64) -> &Region {
        self.lookup_index(addr).1
    }

    /// [`RegionCatalog::lookup`] plus the region's position in
    /// [`RegionCatalog::regions`].
    pub fn lookup_index(&self, addr: u64) -> (usize, &Region) {
        let idx = self.regions.partition_point(|r| r.base <= addr);
        if idx > 0 {
            let region = &self.regions[idx - 1];
            if region.contains(addr) {
                return (idx - 1, region);
            }
        }
        panic!("no region owns address {addr:#x}");
    }

    /// Returns the unique region whose path basename equals `name`.
    ///
    /// Panics when zero or more than one region matches.
    pub fn lookup_by_name(&self, name: &str) -> &Region {
        let mut matches = self.regions.iter().filter(|r| r.basename() == name);
        match (matches.next(), matches.next()) {
            (Some(region), None) => region,
            (None, _) => panic!("no region named {name:?}"),
            (Some(_), Some(_)) => panic!("multiple regions named {name:?}"),
        }
    }

    /// O(1) lookup of the captured page containing `addr`, as a
    /// `PAGE_SIZE` slice. Pages claimed by both a base and a JIT region
    /// resolve to the JIT bytes. Only defined for in-catalog addresses.
    pub fn resolve_page(&self, addr: u64) -> &[u8] {
        self.page_index.resolve(&self.regions, addr)
    }

    /// Fetches the fixed-width instruction word at `addr` through the page
    /// index.
    pub fn instruction_at(&self, addr: u64) -> u32 {
        let page = self.resolve_page(addr);
        let off = (addr & (PAGE_SIZE - 1)) as usize;
        u32::from_le_bytes([page[off], page[off + 1], page[off + 2], page[off + 3]])
    }

    /// Logs one line per region at debug level.
    pub fn log_summary(&self) {
        for region in &self.regions {
            tracing::debug!(
                base = format_args!("{:#018x}", region.base),
                end = format_args!("{:#018x}", region.base + region.size),
                size = format_args!("{:#010x}", region.size),
                slide = format_args!("{:#x}", region.slide),
                jit = region.is_jit,
                path = %region.path,
                "region"
            );
        }
    }
}
