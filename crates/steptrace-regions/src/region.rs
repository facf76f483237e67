use std::path::Path;

pub const PAGE_SIZE: u64 = 4096;
pub const PAGE_SHIFT: u32 = 12;

/// SHA-256 content digest of a region's captured bytes.
pub type Digest = [u8; 32];

/// A captured memory region: an image mapped from disk, or a synthesized
/// JIT region with no backing file. `base` and `size` are page multiples;
/// `bytes` is the owned copy of the region contents at capture time.
#[derive(Debug, Clone)]
pub struct Region {
    pub base: u64,
    pub size: u64,
    pub slide: u64,
    pub path: String,
    pub uuid: [u8; 16],
    pub digest: Digest,
    pub bytes: Vec<u8>,
    pub is_jit: bool,
}

/// Serialized region metadata, without the content bytes. The bytes travel
/// separately, keyed by digest, so unchanged region blobs can be reused
/// across trace generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRecord {
    pub base: u64,
    pub size: u64,
    pub slide: u64,
    pub path: String,
    pub uuid: [u8; 16],
    pub digest: Digest,
    pub is_jit: bool,
}

impl Region {
    pub fn contains(&self, addr: u64) -> bool {
        self.base <= addr && addr < self.base + self.size
    }

    /// Final component of the originating path ("libfoo.dylib" for an
    /// image, the synthetic label itself for a JIT region).
    pub fn basename(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }

    /// On-disk blob file name for this region's content:
    /// `region-<basename>-<8 hex digest prefix>.bin`.
    pub fn blob_file_name(&self) -> String {
        let d = &self.digest;
        format!(
            "region-{}-{:02x}{:02x}{:02x}{:02x}.bin",
            self.basename(),
            d[0],
            d[1],
            d[2],
            d[3]
        )
    }

    pub fn to_record(&self) -> RegionRecord {
        RegionRecord {
            base: self.base,
            size: self.size,
            slide: self.slide,
            path: self.path.clone(),
            uuid: self.uuid,
            digest: self.digest,
            is_jit: self.is_jit,
        }
    }
}

pub(crate) fn round_up_to_page(v: u64) -> u64 {
    v.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_file_name_uses_basename_and_digest_prefix() {
        let region = Region {
            base: 0x1000,
            size: 0x1000,
            slide: 0,
            path: "/usr/lib/libfoo.dylib".into(),
            uuid: [0; 16],
            digest: {
                let mut d = [0u8; 32];
                d[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
                d
            },
            bytes: Vec::new(),
            is_jit: false,
        };
        assert_eq!(region.blob_file_name(), "region-libfoo.dylib-deadbeef.bin");
    }

    #[test]
    fn rounding() {
        assert_eq!(round_up_to_page(0), 0);
        assert_eq!(round_up_to_page(1), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }
}
