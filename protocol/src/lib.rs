//! # erio-protocol - buffer-queue wire format
//!
//! Fixed-layout request/response records and ioctl request codes spoken by the
//! USRP DMA character-device driver. The driver implements a V4L2-style buffer
//! queue, so the records below are bit-for-bit the V4L2 ones with the same
//! `'V'` ioctl magic.
//!
//! Every call goes through [`retry_eintr`], so an interrupted system call is
//! never visible to the caller. Any other failure is returned as the raw
//! [`Errno`] the driver produced.
//!
//! ```rust,no_run
//! use erio_protocol::{request_buffers, BufType, Memory, RequestBuffers};
//! use std::os::fd::AsFd;
//!
//! let file = std::fs::OpenOptions::new()
//!     .read(true)
//!     .write(true)
//!     .open("/dev/tx-dma0")?;
//!
//! let mut req = RequestBuffers::new(BufType::Output, Memory::Mmap, 32);
//! request_buffers(file.as_fd(), &mut req)?;
//! println!("driver granted {} buffers", req.count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use nix::errno::Errno;
use nix::sys::ioctl::ioctl_num_type;
use std::fmt;
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

/// Direction-derived buffer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BufType {
    /// Device to process (receive).
    Input = 1,
    /// Process to device (send).
    Output = 2,
}

/// Buffer memory model requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Memory {
    Mmap = 1,
    UserPtr = 2,
    DmaBuf = 4,
}

impl Memory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Memory::Mmap => "MMAP",
            Memory::UserPtr => "USERPTR",
            Memory::DmaBuf => "DMABUF",
        }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for Memory {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Memory::Mmap),
            2 => Ok(Memory::UserPtr),
            4 => Ok(Memory::DmaBuf),
            other => Err(other),
        }
    }
}

/// Format type for fixed-size CHDR blocks.
pub const FMT_CHDR_FIXED_BLOCK: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestBuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub reserved: [u32; 2],
}

impl RequestBuffers {
    pub fn new(buf_type: BufType, memory: Memory, count: u32) -> Self {
        RequestBuffers {
            count,
            type_: buf_type as u32,
            memory: memory as u32,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: PlaneLocation,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union PlaneLocation {
    pub mem_offset: u32,
    pub userptr: libc::c_ulong,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union BufferLocation {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub planes: *mut Plane,
    pub fd: i32,
}

/// Per-buffer record used by QUERYBUF, QBUF and DQBUF.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct BufferRecord {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: Timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: BufferLocation,
    pub length: u32,
    pub reserved2: u32,
    pub reserved: u32,
}

impl Default for BufferRecord {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

impl BufferRecord {
    pub fn new(buf_type: BufType, memory: Memory) -> Self {
        BufferRecord {
            type_: buf_type as u32,
            memory: memory as u32,
            ..Default::default()
        }
    }

    /// Mapping offset reported by QUERYBUF for memory-mapped buffers.
    pub fn offset(&self) -> u32 {
        unsafe { self.m.offset }
    }

    /// User pointer identifying a user-allocated buffer.
    pub fn userptr(&self) -> usize {
        unsafe { self.m.userptr as usize }
    }

    pub fn set_userptr(&mut self, addr: usize, length: u32) {
        self.m.userptr = addr as libc::c_ulong;
        self.length = length;
    }
}

impl fmt::Debug for BufferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRecord")
            .field("index", &self.index)
            .field("type", &self.type_)
            .field("bytesused", &self.bytesused)
            .field("flags", &self.flags)
            .field("memory", &self.memory)
            .field("userptr", &self.userptr())
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportBuffer {
    pub type_: u32,
    pub index: u32,
    pub plane: u32,
    pub flags: u32,
    pub fd: i32,
    pub reserved: [u32; 11],
}

impl ExportBuffer {
    pub fn new(buf_type: BufType, index: u32) -> Self {
        ExportBuffer {
            type_: buf_type as u32,
            index,
            ..Default::default()
        }
    }
}

/// Fixed block-size format used by header-oriented transports.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFormat {
    pub type_: u32,
    pub length: u32,
    pub reserved: [u32; 6],
}

impl BlockFormat {
    pub fn fixed_block(length: u32) -> Self {
        BlockFormat {
            type_: FMT_CHDR_FIXED_BLOCK,
            length,
            ..Default::default()
        }
    }
}

pub const SET_FMT: ioctl_num_type =
    nix::request_code_readwrite!(b'V', 5, size_of::<BlockFormat>());
pub const REQBUFS: ioctl_num_type =
    nix::request_code_readwrite!(b'V', 8, size_of::<RequestBuffers>());
pub const QUERYBUF: ioctl_num_type =
    nix::request_code_readwrite!(b'V', 9, size_of::<BufferRecord>());
pub const QBUF: ioctl_num_type =
    nix::request_code_readwrite!(b'V', 15, size_of::<BufferRecord>());
pub const EXPBUF: ioctl_num_type =
    nix::request_code_readwrite!(b'V', 16, size_of::<ExportBuffer>());
pub const DQBUF: ioctl_num_type =
    nix::request_code_readwrite!(b'V', 17, size_of::<BufferRecord>());
pub const STREAMON: ioctl_num_type =
    nix::request_code_write!(b'V', 18, size_of::<libc::c_int>());
pub const STREAMOFF: ioctl_num_type =
    nix::request_code_write!(b'V', 19, size_of::<libc::c_int>());

mod raw {
    use super::*;

    nix::ioctl_readwrite_bad!(set_fmt, SET_FMT, BlockFormat);
    nix::ioctl_readwrite_bad!(reqbufs, REQBUFS, RequestBuffers);
    nix::ioctl_readwrite_bad!(querybuf, QUERYBUF, BufferRecord);
    nix::ioctl_readwrite_bad!(qbuf, QBUF, BufferRecord);
    nix::ioctl_readwrite_bad!(expbuf, EXPBUF, ExportBuffer);
    nix::ioctl_readwrite_bad!(dqbuf, DQBUF, BufferRecord);
    nix::ioctl_write_int_bad!(streamon, STREAMON);
    nix::ioctl_write_int_bad!(streamoff, STREAMOFF);
}

/// Runs `f` until it returns anything but `EINTR`.
pub fn retry_eintr<T>(mut f: impl FnMut() -> nix::Result<T>) -> nix::Result<T> {
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

fn call<T>(
    fd: BorrowedFd<'_>,
    data: &mut T,
    op: unsafe fn(RawFd, *mut T) -> nix::Result<libc::c_int>,
) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    retry_eintr(|| unsafe { op(raw, data as *mut T) }).map(drop)
}

pub fn request_buffers(fd: BorrowedFd<'_>, req: &mut RequestBuffers) -> nix::Result<()> {
    call(fd, req, raw::reqbufs)
}

pub fn query_buffer(fd: BorrowedFd<'_>, buf: &mut BufferRecord) -> nix::Result<()> {
    call(fd, buf, raw::querybuf)
}

pub fn queue_buffer(fd: BorrowedFd<'_>, buf: &mut BufferRecord) -> nix::Result<()> {
    call(fd, buf, raw::qbuf)
}

pub fn dequeue_buffer(fd: BorrowedFd<'_>, buf: &mut BufferRecord) -> nix::Result<()> {
    call(fd, buf, raw::dqbuf)
}

pub fn export_buffer(fd: BorrowedFd<'_>, req: &mut ExportBuffer) -> nix::Result<()> {
    call(fd, req, raw::expbuf)
}

pub fn set_format(fd: BorrowedFd<'_>, fmt: &mut BlockFormat) -> nix::Result<()> {
    call(fd, fmt, raw::set_fmt)
}

/// STREAMON takes the buffer type as the ioctl argument itself.
pub fn stream_on(fd: BorrowedFd<'_>, buf_type: BufType) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    retry_eintr(|| unsafe { raw::streamon(raw, buf_type as libc::c_int) }).map(drop)
}

pub fn stream_off(fd: BorrowedFd<'_>, buf_type: BufType) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    retry_eintr(|| unsafe { raw::streamoff(raw, buf_type as libc::c_int) }).map(drop)
}
