use crate::backend::Backend;
use crate::buffer::Buffer;
use crate::common::{chdr_length, likely, unlikely, Direction, MAX_BUFFERS};
use crate::context::Context;
use crate::device::{Device, DeviceNode, Readiness};
use crate::error::{ErioError, Result};
use erio_protocol::{BlockFormat, BufType, BufferRecord, ExportBuffer, Memory, RequestBuffers};
use nix::errno::Errno;
use std::os::fd::{FromRawFd, OwnedFd};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Converts a microsecond timeout where any negative value means "wait
/// forever" into the form [`Channel::dequeue`] takes.
pub fn timeout_from_micros(timeout_us: i64) -> Option<Duration> {
    u64::try_from(timeout_us).ok().map(Duration::from_micros)
}

/// One open, direction-bound buffer queue on a driver.
///
/// A channel owns its descriptor, its buffers and a reference on the
/// [`Context`] it was allocated from. Dropping it releases every buffer,
/// closes the descriptor and then drops the context reference.
///
/// A channel has a single owner and no separate get/put pair: dropping it is
/// the put. Code that needs to share one across threads wraps it in
/// `Arc<Mutex<Channel>>`.
///
/// Not internally synchronized; callers serialize access to one channel.
pub struct Channel<D: Device = DeviceNode> {
    buffers: Vec<Buffer>,
    /// Indices of buffers never handed to the driver. Popped from the back.
    free: Vec<usize>,
    device: D,
    direction: Direction,
    backend: Backend,
    chdr_length_quirk: bool,
    streaming: bool,
    context: Context,
}

impl<D: Device> Channel<D> {
    pub(crate) fn new(context: Context, device: D, direction: Direction, memory: Memory) -> Self {
        let mut channel = Channel {
            buffers: Vec::new(),
            free: Vec::new(),
            device,
            direction,
            backend: Backend::from(memory),
            chdr_length_quirk: false,
            streaming: false,
            context,
        };

        // clear whatever a previous user left on the node
        if let Err(e) = channel.stop_streaming() {
            debug!(error = %e, "reset: stop streaming failed");
        }
        if let Err(e) = channel.request_buffers(0) {
            debug!(error = %e, "reset: releasing driver buffers failed");
        }

        debug!(direction = %direction, memory = %memory, "allocated channel");
        channel
    }

    fn buf_type(&self) -> BufType {
        self.direction.buf_type()
    }

    /// Asks the driver for `count` buffers and builds the local side of each.
    ///
    /// Counts above [`MAX_BUFFERS`] are clamped. A count of zero only resets
    /// the driver. If any buffer fails to initialize, none are kept.
    /// Returns the number of buffers now owned by the channel.
    pub fn request_buffers(&mut self, count: usize) -> Result<usize> {
        let count = if unlikely(count > MAX_BUFFERS) {
            warn!(
                requested = count,
                max = MAX_BUFFERS,
                "too many buffers requested, clamping"
            );
            MAX_BUFFERS
        } else {
            count
        };

        if !self.buffers.is_empty() {
            debug!(count = self.buffers.len(), "releasing previous buffers");
            self.free.clear();
            self.buffers.clear();
        }

        let buf_type = self.buf_type();
        let mut req = RequestBuffers::new(buf_type, self.backend.memory(), count as u32);
        self.device.request_buffers(&mut req).map_err(|source| {
            error!(count = count, error = %source, "failed to request buffers");
            ErioError::ioctl("REQBUFS")(source)
        })?;

        if count == 0 {
            return Ok(0);
        }

        let granted = (req.count as usize).min(count);
        let buffers = (0..granted)
            .map(|index| self.backend.init_buffer(&self.device, buf_type, index))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| error!(count = granted, error = %e, "failed to init buffers"))?;

        self.buffers = buffers;
        if self.direction == Direction::Send {
            self.free = (0..granted).collect();
        }

        debug!(
            requested = count,
            granted = granted,
            memory = %self.backend.memory(),
            "requested buffers"
        );
        Ok(granted)
    }

    /// Hands buffer `index` to the driver.
    ///
    /// The buffer must not be touched again until it comes back from
    /// [`dequeue`](Self::dequeue).
    pub fn enqueue(&mut self, index: usize) -> Result<()> {
        let buffer = self.buffers.get(index).ok_or(ErioError::InvalidIndex(index))?;

        let mut record = BufferRecord::new(self.buf_type(), self.backend.memory());
        record.index = index as u32;
        if self.backend == Backend::UserPtr {
            record.set_userptr(buffer.addr(), buffer.len(0) as u32);
        }
        if self.direction == Direction::Send || self.chdr_length_quirk {
            record.bytesused = buffer.payload(0) as u32;
        }

        self.device
            .queue_buffer(&mut record)
            .map_err(ErioError::ioctl("QBUF"))?;

        if unlikely(!self.free.is_empty()) {
            self.free.retain(|&free| free != index);
        }

        trace!(index = index, bytesused = record.bytesused, "enqueued buffer");
        Ok(())
    }

    /// Enqueues every buffer in index order, stopping at the first failure.
    /// Receive channels only.
    pub fn enqueue_all(&mut self) -> Result<()> {
        if self.direction != Direction::Receive {
            return Err(ErioError::InvalidDirection(Direction::Receive.as_str()));
        }
        for index in 0..self.buffers.len() {
            self.enqueue(index)?;
        }
        Ok(())
    }

    /// Takes back a buffer.
    ///
    /// Buffers that were never submitted are returned first without
    /// touching the driver. Otherwise waits up to `timeout` (`None` waits
    /// forever, zero polls) for the driver and returns `Ok(None)` if it
    /// expires. On receive channels the buffer's payload is set from the
    /// driver's byte count, or from the embedded header length when the
    /// quirk is enabled.
    pub fn dequeue(&mut self, timeout: Option<Duration>) -> Result<Option<&mut Buffer>> {
        if let Some(index) = self.free.pop() {
            trace!(index = index, "dequeued never-submitted buffer");
            return Ok(self.buffers.get_mut(index));
        }

        let readiness = match self.direction {
            Direction::Send => Readiness::Writable,
            Direction::Receive => Readiness::Readable,
        };
        match self.device.wait(readiness, timeout) {
            Ok(ready) if likely(ready) => {}
            Ok(_) => {
                trace!(timeout = ?timeout, "dequeue timed out");
                return Ok(None);
            }
            Err(errno) => {
                warn!(error = %errno, "failed waiting for buffer");
                return Err(ErioError::Wait(errno));
            }
        }

        let mut record = BufferRecord::new(self.buf_type(), self.backend.memory());
        self.device
            .dequeue_buffer(&mut record)
            .map_err(ErioError::ioctl("DQBUF"))?;

        let index = self.resolve(&record)?;
        let direction = self.direction;
        let quirk = self.chdr_length_quirk;
        let buffer = &mut self.buffers[index];

        if direction == Direction::Receive {
            let reported = if quirk {
                chdr_length(buffer.as_slice())
            } else {
                record.bytesused as usize
            };
            if unlikely(reported > buffer.len(0)) {
                warn!(
                    index = index,
                    reported = reported,
                    capacity = buffer.len(0),
                    "payload larger than buffer, clamping"
                );
            }
            buffer.set_payload(0, reported);
        }

        trace!(index = index, payload = buffer.payload(0), "dequeued buffer");
        Ok(Some(buffer))
    }

    /// Maps a dequeued record back to the buffer it names.
    fn resolve(&self, record: &BufferRecord) -> Result<usize> {
        let found = match self.backend {
            Backend::UserPtr => {
                let (addr, length) = (record.userptr(), record.length as usize);
                self.buffers
                    .iter()
                    .position(|b| b.addr() == addr && b.len(0) == length)
            }
            Backend::Mmap | Backend::DmaBuf => {
                Some(record.index as usize).filter(|&index| index < self.buffers.len())
            }
        };

        found.ok_or_else(|| {
            error!(record = ?record, "driver returned an unknown buffer");
            ErioError::UnknownBuffer {
                index: record.index,
                userptr: record.userptr(),
                length: record.length,
            }
        })
    }

    /// Exports buffer `index` as a descriptor another process can map.
    pub fn export(&self, index: usize) -> Result<OwnedFd> {
        if index >= self.buffers.len() {
            return Err(ErioError::InvalidIndex(index));
        }

        let mut req = ExportBuffer::new(self.buf_type(), index as u32);
        self.device.export_buffer(&mut req).map_err(|source| {
            error!(index = index, error = %source, "failed to export buffer");
            ErioError::ioctl("EXPBUF")(source)
        })?;

        if req.fd < 0 {
            error!(index = index, fd = req.fd, "driver returned an invalid descriptor");
            return Err(ErioError::Ioctl {
                op: "EXPBUF",
                source: Errno::EBADF,
            });
        }

        debug!(index = index, fd = req.fd, "exported buffer");
        Ok(unsafe { OwnedFd::from_raw_fd(req.fd) })
    }

    /// Fixes the driver's frame size for header-oriented transports.
    pub fn set_fixed_size(&mut self, _plane: usize, size: usize) -> Result<()> {
        let size = u32::try_from(size).map_err(|_| {
            error!(size = size, "fixed frame size out of range");
            ErioError::Ioctl {
                op: "SET_FMT",
                source: Errno::EINVAL,
            }
        })?;
        let mut fmt = BlockFormat::fixed_block(size);
        self.device
            .set_format(&mut fmt)
            .map_err(ErioError::ioctl("SET_FMT"))?;
        debug!(size = size, "set fixed frame size");
        Ok(())
    }

    pub fn start_streaming(&mut self) -> Result<()> {
        self.device
            .stream_on(self.buf_type())
            .map_err(ErioError::ioctl("STREAMON"))?;
        self.streaming = true;
        debug!(direction = %self.direction, "streaming started");
        Ok(())
    }

    pub fn stop_streaming(&mut self) -> Result<()> {
        self.device
            .stream_off(self.buf_type())
            .map_err(ErioError::ioctl("STREAMOFF"))?;
        self.streaming = false;
        debug!(direction = %self.direction, "streaming stopped");
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn buffer(&self, index: usize) -> Option<&Buffer> {
        self.buffers.get(index)
    }

    pub fn buffer_mut(&mut self, index: usize) -> Option<&mut Buffer> {
        self.buffers.get_mut(index)
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn memory(&self) -> Memory {
        self.backend.memory()
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// "MMAP", "USERPTR" or "DMABUF".
    pub fn memory_type_name(&self) -> &'static str {
        self.backend.memory().as_str()
    }

    /// Recover received lengths from the CHDR header instead of the
    /// driver's byte count. Some receive paths misreport it.
    pub fn set_chdr_length_quirk(&mut self, enabled: bool) {
        self.chdr_length_quirk = enabled;
    }

    pub fn chdr_length_quirk(&self) -> bool {
        self.chdr_length_quirk
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn attribute(&self, name: &str) -> Result<String> {
        let devnum = self.device.device_number()?;
        self.context.sysfs().read_attribute(devnum, name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        let devnum = self.device.device_number()?;
        self.context.sysfs().write_attribute(devnum, name, value)
    }

    /// Reads an integer attribute in the given radix. A `0x` prefix is
    /// accepted for radix 16.
    pub fn attribute_int(&self, name: &str, radix: u32) -> Result<i64> {
        let value = self.attribute(name)?;
        let digits = match radix {
            16 => value
                .strip_prefix("0x")
                .or_else(|| value.strip_prefix("0X"))
                .unwrap_or(value.as_str()),
            _ => value.as_str(),
        };
        i64::from_str_radix(digits, radix).map_err(|_| ErioError::InvalidAttribute {
            name: name.to_string(),
            value: value.clone(),
        })
    }

    /// Driver API version from the `api_maj` and `api_min` attributes.
    pub fn api_version(&self) -> Result<(u32, u32)> {
        let major = self.attribute_int("api_maj", 10)?;
        let minor = self.attribute_int("api_min", 10)?;
        let narrow = |name: &str, value: i64| {
            u32::try_from(value).map_err(|_| ErioError::InvalidAttribute {
                name: name.to_string(),
                value: value.to_string(),
            })
        };
        Ok((narrow("api_maj", major)?, narrow("api_min", minor)?))
    }
}

impl<D: Device> std::fmt::Debug for Channel<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("direction", &self.direction)
            .field("backend", &self.backend)
            .field("buffers", &self.buffers.len())
            .field("free", &self.free.len())
            .field("chdr_length_quirk", &self.chdr_length_quirk)
            .field("streaming", &self.streaming)
            .finish()
    }
}

impl<D: Device> Drop for Channel<D> {
    fn drop(&mut self) {
        debug!(
            direction = %self.direction,
            buffers = self.buffers.len(),
            "releasing channel"
        );
        self.free.clear();
        self.buffers.clear();
    }
}
