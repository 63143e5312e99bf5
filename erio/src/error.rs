use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErioError {
    #[error("failed to open device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported memory type {0}")]
    UnsupportedMemory(u32),

    #[error("{op} failed: {source}")]
    Ioctl {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("failed to map buffer {index}: {source}")]
    Mmap {
        index: usize,
        #[source]
        source: Errno,
    },

    #[error("failed to allocate {size} bytes for buffer {index}")]
    Allocation { index: usize, size: usize },

    #[error("{0} backend is not implemented")]
    NotImplemented(&'static str),

    #[error("waiting for device readiness failed: {0}")]
    Wait(#[source] Errno),

    #[error("driver returned a buffer that matches no known buffer (index {index}, userptr {userptr:#x}, length {length})")]
    UnknownBuffer {
        index: u32,
        userptr: usize,
        length: u32,
    },

    #[error("no buffer at index {0}")]
    InvalidIndex(usize),

    #[error("operation requires a {0} channel")]
    InvalidDirection(&'static str),

    #[error("descriptor is not a supported character device")]
    NotSupportedDevice,

    #[error("attribute {0} not found")]
    AttributeNotFound(String),

    #[error("attribute {name} has non-numeric value {value:?}")]
    InvalidAttribute { name: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system error: {0}")]
    Nix(#[from] Errno),

    #[error("no file descriptor in received message")]
    NoDescriptor,

    #[error("peer closed the socket")]
    Disconnected,

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}

impl ErioError {
    pub(crate) fn ioctl(op: &'static str) -> impl FnOnce(Errno) -> ErioError {
        move |source| ErioError::Ioctl { op, source }
    }

    /// Raw errno for protocol and system failures.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            ErioError::Ioctl { source, .. }
            | ErioError::Mmap { source, .. }
            | ErioError::Wait(source) => Some(*source),
            ErioError::Nix(errno) => Some(*errno),
            ErioError::Open { source, .. } | ErioError::Io(source) => {
                source.raw_os_error().map(Errno::from_raw)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ErioError>;
