use crate::error::{ErioError, Result};
use core::ptr::NonNull;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::num::NonZero;
use std::os::fd::AsFd;

/// Driver-owned memory mapped shared and read/write into the process.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    pub fn map<F: AsFd>(fd: F, len: usize, offset: u32, index: usize) -> Result<Self> {
        let length = NonZero::new(len).ok_or(ErioError::Mmap {
            index,
            source: nix::errno::Errno::EINVAL,
        })?;

        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
            .map_err(|source| ErioError::Mmap { index, source })?
        };

        Ok(MappedRegion {
            ptr: ptr.cast(),
            len,
        })
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.cast(), self.len);
        }
    }
}

/// Page-aligned, zeroed memory owned by the process.
pub struct UserRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl UserRegion {
    pub fn alloc(size: usize, align: usize, index: usize) -> Result<Self> {
        let layout = Layout::from_size_align(size, align)
            .ok()
            .filter(|layout| layout.size() > 0)
            .ok_or(ErioError::Allocation { index, size })?;

        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(ErioError::Allocation { index, size })?;

        Ok(UserRegion { ptr, layout })
    }
}

impl Drop for UserRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Backing storage of one buffer. Dropping it releases the memory.
pub enum Storage {
    Mapped(MappedRegion),
    User(UserRegion),
}

impl Storage {
    pub fn as_ptr(&self) -> NonNull<u8> {
        match self {
            Storage::Mapped(region) => region.ptr,
            Storage::User(region) => region.ptr,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::Mapped(region) => region.len,
            Storage::User(region) => region.layout.size(),
        }
    }
}

unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
