//! Driver seam: the wire calls a channel issues against its descriptor.

use crate::error::{ErioError, Result};
use erio_protocol::{BlockFormat, BufType, BufferRecord, ExportBuffer, RequestBuffers};
use nix::fcntl::OFlag;
use nix::poll::{ppoll, PollFd, PollFlags};
use nix::sys::stat::{fstat, major, minor, SFlag};
use nix::sys::time::TimeSpec;
use std::fs::OpenOptions;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

/// Character device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevNum {
    pub major: u64,
    pub minor: u64,
}

/// Which readiness a blocking dequeue waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    Writable,
}

/// A buffer-queue driver behind an open descriptor.
///
/// Errors are the raw errno of the call. Implementations must already retry
/// interrupted calls.
pub trait Device: AsFd + Send {
    fn request_buffers(&self, req: &mut RequestBuffers) -> nix::Result<()>;

    fn query_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()>;

    fn queue_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()>;

    fn dequeue_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()>;

    fn export_buffer(&self, req: &mut ExportBuffer) -> nix::Result<()>;

    fn set_format(&self, fmt: &mut BlockFormat) -> nix::Result<()>;

    fn stream_on(&self, buf_type: BufType) -> nix::Result<()>;

    fn stream_off(&self, buf_type: BufType) -> nix::Result<()>;

    /// Waits until the descriptor is ready. `None` waits forever.
    /// Returns `Ok(false)` when the timeout expired first.
    fn wait(&self, readiness: Readiness, timeout: Option<Duration>) -> nix::Result<bool> {
        let events = match readiness {
            Readiness::Readable => PollFlags::POLLIN,
            Readiness::Writable => PollFlags::POLLOUT,
        };
        let mut fds = [PollFd::new(self.as_fd(), events)];
        let ready = ppoll(&mut fds, timeout.map(TimeSpec::from), None)?;
        Ok(ready > 0)
    }

    fn device_number(&self) -> Result<DevNum> {
        let stat = fstat(self.as_fd())?;
        let kind = SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT;
        if kind != SFlag::S_IFCHR {
            return Err(ErioError::NotSupportedDevice);
        }
        Ok(DevNum {
            major: major(stat.st_rdev),
            minor: minor(stat.st_rdev),
        })
    }
}

/// An open device node issuing real ioctls.
#[derive(Debug)]
pub struct DeviceNode {
    fd: OwnedFd,
}

impl DeviceNode {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_CLOEXEC.bits())
            .open(path)
            .map_err(|source| ErioError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(DeviceNode { fd: file.into() })
    }
}

impl AsFd for DeviceNode {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<OwnedFd> for DeviceNode {
    fn from(fd: OwnedFd) -> Self {
        DeviceNode { fd }
    }
}

impl Device for DeviceNode {
    fn request_buffers(&self, req: &mut RequestBuffers) -> nix::Result<()> {
        erio_protocol::request_buffers(self.as_fd(), req)
    }

    fn query_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()> {
        erio_protocol::query_buffer(self.as_fd(), buf)
    }

    fn queue_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()> {
        erio_protocol::queue_buffer(self.as_fd(), buf)
    }

    fn dequeue_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()> {
        erio_protocol::dequeue_buffer(self.as_fd(), buf)
    }

    fn export_buffer(&self, req: &mut ExportBuffer) -> nix::Result<()> {
        erio_protocol::export_buffer(self.as_fd(), req)
    }

    fn set_format(&self, fmt: &mut BlockFormat) -> nix::Result<()> {
        erio_protocol::set_format(self.as_fd(), fmt)
    }

    fn stream_on(&self, buf_type: BufType) -> nix::Result<()> {
        erio_protocol::stream_on(self.as_fd(), buf_type)
    }

    fn stream_off(&self, buf_type: BufType) -> nix::Result<()> {
        erio_protocol::stream_off(self.as_fd(), buf_type)
    }
}
