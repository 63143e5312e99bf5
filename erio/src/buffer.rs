use crate::memory::Storage;

/// One transfer unit exchanged with the driver.
///
/// Every accessor takes a plane argument for forward compatibility; all
/// current backends use a single plane and ignore it.
pub struct Buffer {
    index: usize,
    storage: Storage,
    valid_bytes: usize,
}

impl Buffer {
    pub(crate) fn new(index: usize, storage: Storage) -> Self {
        let valid_bytes = storage.len();
        Buffer {
            index,
            storage,
            valid_bytes,
        }
    }

    /// Stable driver index for memory-mapped buffers, an opaque identity otherwise.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Capacity of the plane in bytes.
    pub fn len(&self, _plane: usize) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.len() == 0
    }

    /// Number of valid bytes in the plane.
    pub fn payload(&self, _plane: usize) -> usize {
        self.valid_bytes
    }

    /// Sets the number of valid bytes, clamped to capacity.
    pub fn set_payload(&mut self, _plane: usize, len: usize) {
        self.valid_bytes = len.min(self.storage.len());
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.storage.as_ptr().as_ptr()
    }

    pub(crate) fn addr(&self) -> usize {
        self.as_ptr() as usize
    }

    /// The whole plane, regardless of payload.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr().as_ptr(), self.storage.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.storage.as_ptr().as_ptr(), self.storage.len())
        }
    }

    /// The valid bytes only.
    pub fn data(&self) -> &[u8] {
        &self.as_slice()[..self.valid_bytes]
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("index", &self.index)
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.storage.len())
            .field("valid_bytes", &self.valid_bytes)
            .finish()
    }
}
