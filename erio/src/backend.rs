use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{ErioError, Result};
use crate::memory::{page_size, MappedRegion, Storage, UserRegion};
use erio_protocol::{BufType, BufferRecord, Memory};
use tracing::{error, trace, warn};

/// Per-memory-type strategy for building one buffer's storage.
///
/// Release is the storage's `Drop`: unmapping for [`Backend::Mmap`],
/// freeing for [`Backend::UserPtr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Driver-allocated memory mapped into the process.
    Mmap,
    /// One page-aligned page per buffer allocated by the process.
    UserPtr,
    /// Driver-exported DMA handles. Not implemented.
    DmaBuf,
}

impl Backend {
    pub fn memory(self) -> Memory {
        match self {
            Backend::Mmap => Memory::Mmap,
            Backend::UserPtr => Memory::UserPtr,
            Backend::DmaBuf => Memory::DmaBuf,
        }
    }

    pub fn init_buffer<D: Device>(self, device: &D, buf_type: BufType, index: usize) -> Result<Buffer> {
        match self {
            Backend::Mmap => init_mmap(device, buf_type, index),
            Backend::UserPtr => init_userptr(index),
            Backend::DmaBuf => {
                error!(index = index, "DMABUF buffers are not implemented");
                Err(ErioError::NotImplemented(Memory::DmaBuf.as_str()))
            }
        }
    }
}

impl From<Memory> for Backend {
    fn from(memory: Memory) -> Self {
        match memory {
            Memory::Mmap => Backend::Mmap,
            Memory::UserPtr => Backend::UserPtr,
            Memory::DmaBuf => Backend::DmaBuf,
        }
    }
}

/// Raw memory codes as found in driver records.
impl TryFrom<u32> for Backend {
    type Error = ErioError;

    fn try_from(value: u32) -> Result<Self> {
        Memory::try_from(value)
            .map(Backend::from)
            .map_err(ErioError::UnsupportedMemory)
    }
}

fn init_mmap<D: Device>(device: &D, buf_type: BufType, index: usize) -> Result<Buffer> {
    let mut record = BufferRecord::new(buf_type, Memory::Mmap);
    record.index = index as u32;

    device.query_buffer(&mut record).map_err(|source| {
        warn!(index = index, error = %source, "failed to query buffer");
        ErioError::ioctl("QUERYBUF")(source)
    })?;

    let region = MappedRegion::map(device.as_fd(), record.length as usize, record.offset(), index)
        .inspect_err(|e| warn!(index = index, error = %e, "failed to mmap buffer"))?;

    trace!(
        index = index,
        length = record.length,
        offset = record.offset(),
        "mapped buffer"
    );

    Ok(Buffer::new(index, Storage::Mapped(region)))
}

fn init_userptr(index: usize) -> Result<Buffer> {
    // single page per buffer until scatter-gather exists
    let page_size = page_size();
    let region = UserRegion::alloc(page_size, page_size, index)
        .inspect_err(|e| error!(index = index, error = %e, "failed to allocate buffer"))?;

    Ok(Buffer::new(index, Storage::User(region)))
}
