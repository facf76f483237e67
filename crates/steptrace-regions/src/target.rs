use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Protection mask of a mapped memory range.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

/// A loaded image reported by the target's image list.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub base: u64,
    pub size: u64,
    pub slide: u64,
    pub path: String,
    pub uuid: [u8; 16],
}

/// A raw mapped memory range reported by the target's VM map.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    pub base: u64,
    pub size: u64,
    pub prot: Protection,
    /// The allocation is tagged as a JIT-style anonymous executable
    /// mapping rather than a file-backed image.
    pub jit_like: bool,
}

/// Boundary to the process being traced.
///
/// [`crate::RegionCatalog::scan`] drives this: a remote target is
/// suspended for the duration of a scan so the address space stays
/// consistent, then resumed.
pub trait ProcessTarget {
    /// Whether the target is the tracing process itself. Local targets are
    /// not suspended around a scan.
    fn is_local(&self) -> bool {
        false
    }

    fn suspend(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn images(&self) -> Result<Vec<ImageInfo>>;
    fn mappings(&self) -> Result<Vec<Mapping>>;
    fn read_memory(&self, base: u64, len: usize) -> Result<Vec<u8>>;
}
