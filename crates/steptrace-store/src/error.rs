use std::io;

use steptrace_container::ContainerError;
use steptrace_regions::RegionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("corrupt trace: {0}")]
    Corrupt(&'static str),

    #[error("utf-8 decoding failed: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
