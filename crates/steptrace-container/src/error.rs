use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContainerError>;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error("invalid container magic")]
    InvalidMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("corrupt container: {0}")]
    Corrupt(&'static str),

    #[error("lz4 decompression failed: {0}")]
    Lz4Decompress(#[from] lz4_flex::block::DecompressError),
}
