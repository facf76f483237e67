use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegionError>;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no region bytes for digest {0}..")]
    MissingBlob(String),

    #[error("region `{path}`: payload length {found} does not match declared size {expected}")]
    SizeMismatch {
        path: String,
        expected: u64,
        found: u64,
    },
}
