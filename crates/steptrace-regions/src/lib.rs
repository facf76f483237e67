//! Process memory-region catalog.
//!
//! A [`RegionCatalog`] captures the set of named, content-addressed memory
//! regions of a traced process (loaded images plus synthesized JIT
//! regions), answers "which region owns this address", and resolves any
//! covered page to its captured bytes in O(1) through a minimal perfect
//! hash built over the page addresses.

mod catalog;
mod error;
mod page_index;
mod region;
mod target;

pub use crate::catalog::RegionCatalog;
pub use crate::error::{RegionError, Result};
pub use crate::region::{Digest, Region, RegionRecord, PAGE_SHIFT, PAGE_SIZE};
pub use crate::target::{ImageInfo, Mapping, ProcessTarget, Protection};
