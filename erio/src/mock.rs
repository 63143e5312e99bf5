//! In-memory buffer-queue driver for unit tests.
//!
//! Memory-mapped buffers live in a memfd at `index * buffer_len`, so the
//! mmap backend maps real shared memory. Queued buffers stay pending until
//! the test completes them, which moves them to the dequeue side.

use crate::device::{DevNum, Device, Readiness};
use crate::error::Result;
use crate::memory::page_size;
use erio_protocol::{BlockFormat, BufType, BufferRecord, ExportBuffer, Memory, RequestBuffers};
use nix::errno::Errno;
use nix::sys::memfd::{memfd_create, MFdFlags};
use nix::sys::uio::{pread, pwrite};
use nix::unistd::{dup, ftruncate};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::os::fd::{AsFd, BorrowedFd, IntoRawFd, OwnedFd};
use std::time::Duration;

/// What the driver keeps of a queued buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Queued {
    pub index: u32,
    pub bytesused: u32,
    pub userptr: usize,
    pub length: u32,
}

#[derive(Default)]
struct MockState {
    count: usize,
    max_count: usize,
    streaming: Option<BufType>,
    stream_offs: usize,
    requested: Vec<u32>,
    pending: VecDeque<Queued>,
    done: VecDeque<Queued>,
    queued_log: Vec<Queued>,
    waits: usize,
    fixed_size: Option<u32>,
    fail_query_at: Option<usize>,
    fail_request: Option<Errno>,
    fail_wait: Option<Errno>,
    fail_dequeue: Option<Errno>,
    export_bad_fd: bool,
}

pub(crate) struct MockDevice {
    memfd: OwnedFd,
    buffer_len: usize,
    devnum: DevNum,
    state: Mutex<MockState>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        MockDevice {
            memfd: memfd_create(c"erio-mock", MFdFlags::MFD_CLOEXEC).unwrap(),
            buffer_len: page_size(),
            devnum: DevNum {
                major: 243,
                minor: 0,
            },
            state: Mutex::new(MockState {
                max_count: 256,
                ..Default::default()
            }),
        }
    }

    pub(crate) fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.state.lock().count = count;
        ftruncate(&self.memfd, (count * self.buffer_len) as i64).unwrap();
    }

    pub(crate) fn set_max_count(&self, max_count: usize) {
        self.state.lock().max_count = max_count;
    }

    pub(crate) fn fail_query_at(&self, index: usize) {
        self.state.lock().fail_query_at = Some(index);
    }

    pub(crate) fn fail_request(&self, errno: Errno) {
        self.state.lock().fail_request = Some(errno);
    }

    pub(crate) fn fail_wait(&self, errno: Errno) {
        self.state.lock().fail_wait = Some(errno);
    }

    pub(crate) fn fail_dequeue(&self, errno: Errno) {
        self.state.lock().fail_dequeue = Some(errno);
    }

    /// Makes EXPBUF succeed without installing a descriptor.
    pub(crate) fn export_bad_fd(&self) {
        self.state.lock().export_bad_fd = true;
    }

    /// Moves the user pointer of every completed buffer by `delta` bytes.
    pub(crate) fn shift_done_userptr(&self, delta: usize) {
        for record in self.state.lock().done.iter_mut() {
            record.userptr += delta;
        }
    }

    /// Completes every pending buffer, optionally overriding `bytesused`.
    pub(crate) fn complete_all(&self, bytesused: Option<u32>) {
        let mut state = self.state.lock();
        while let Some(mut record) = state.pending.pop_front() {
            if let Some(bytesused) = bytesused {
                record.bytesused = bytesused;
            }
            state.done.push_back(record);
        }
    }

    /// Plays the DMA engine: writes into a memory-mapped buffer's backing.
    pub(crate) fn write_backing(&self, index: usize, bytes: &[u8]) {
        pwrite(&self.memfd, bytes, (index * self.buffer_len) as i64).unwrap();
    }

    pub(crate) fn backing_bytes(&self, index: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; self.buffer_len];
        pread(&self.memfd, &mut bytes, (index * self.buffer_len) as i64).unwrap();
        bytes
    }

    pub(crate) fn queued_log(&self) -> Vec<Queued> {
        self.state.lock().queued_log.clone()
    }

    pub(crate) fn requested(&self) -> Vec<u32> {
        self.state.lock().requested.clone()
    }

    pub(crate) fn waits(&self) -> usize {
        self.state.lock().waits
    }

    pub(crate) fn streaming(&self) -> Option<BufType> {
        self.state.lock().streaming
    }

    pub(crate) fn stream_offs(&self) -> usize {
        self.state.lock().stream_offs
    }

    pub(crate) fn fixed_size(&self) -> Option<u32> {
        self.state.lock().fixed_size
    }
}

impl AsFd for MockDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.memfd.as_fd()
    }
}

impl Device for MockDevice {
    fn request_buffers(&self, req: &mut RequestBuffers) -> nix::Result<()> {
        let mut state = self.state.lock();
        state.requested.push(req.count);
        if let Some(errno) = state.fail_request {
            return Err(errno);
        }

        let granted = (req.count as usize).min(state.max_count);
        state.count = granted;
        state.pending.clear();
        state.done.clear();
        ftruncate(&self.memfd, (granted * self.buffer_len) as i64)?;

        req.count = granted as u32;
        Ok(())
    }

    fn query_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()> {
        let state = self.state.lock();
        let index = buf.index as usize;
        if index >= state.count || state.fail_query_at == Some(index) {
            return Err(Errno::EINVAL);
        }
        buf.length = self.buffer_len as u32;
        buf.m.offset = (index * self.buffer_len) as u32;
        Ok(())
    }

    fn queue_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()> {
        let mut state = self.state.lock();
        if buf.index as usize >= state.count {
            return Err(Errno::EINVAL);
        }
        let queued = Queued {
            index: buf.index,
            bytesused: buf.bytesused,
            userptr: buf.userptr(),
            length: buf.length,
        };
        state.queued_log.push(queued);
        state.pending.push_back(queued);
        Ok(())
    }

    fn dequeue_buffer(&self, buf: &mut BufferRecord) -> nix::Result<()> {
        let mut state = self.state.lock();
        if let Some(errno) = state.fail_dequeue {
            return Err(errno);
        }
        let record = state.done.pop_front().ok_or(Errno::EAGAIN)?;
        buf.index = record.index;
        buf.bytesused = record.bytesused;
        if buf.memory == Memory::UserPtr as u32 {
            buf.set_userptr(record.userptr, record.length);
        }
        Ok(())
    }

    fn export_buffer(&self, req: &mut ExportBuffer) -> nix::Result<()> {
        let state = self.state.lock();
        if req.index as usize >= state.count {
            return Err(Errno::EINVAL);
        }
        if state.export_bad_fd {
            req.fd = -1;
            return Ok(());
        }
        req.fd = dup(&self.memfd)?.into_raw_fd();
        Ok(())
    }

    fn set_format(&self, fmt: &mut BlockFormat) -> nix::Result<()> {
        self.state.lock().fixed_size = Some(fmt.length);
        Ok(())
    }

    fn stream_on(&self, buf_type: BufType) -> nix::Result<()> {
        self.state.lock().streaming = Some(buf_type);
        Ok(())
    }

    fn stream_off(&self, _buf_type: BufType) -> nix::Result<()> {
        let mut state = self.state.lock();
        state.streaming = None;
        state.stream_offs += 1;
        Ok(())
    }

    fn wait(&self, _readiness: Readiness, _timeout: Option<Duration>) -> nix::Result<bool> {
        let mut state = self.state.lock();
        state.waits += 1;
        if let Some(errno) = state.fail_wait {
            return Err(errno);
        }
        Ok(!state.done.is_empty())
    }

    fn device_number(&self) -> Result<DevNum> {
        Ok(self.devnum)
    }
}
