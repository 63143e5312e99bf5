//! # erio - Zero-Copy DMA Buffer Exchange
//!
//! Userspace side of a buffer-queue driver: buffers are requested from the
//! driver, handed to it with [`Channel::enqueue`] and taken back with
//! [`Channel::dequeue`], without copying sample data.
//!
//! ## Creating a Channel
//!
//! Channels are allocated from a [`Context`], which owns device discovery
//! and stays alive as long as any of its channels do:
//!
//! ```no_run
//! use erio::{Context, Direction, Memory};
//!
//! let context = Context::new();
//! let mut tx = context.alloc_channel("/dev/tx-dma0", Direction::Send, Memory::Mmap)?;
//! tx.request_buffers(32)?;
//! # Ok::<(), erio::ErioError>(())
//! ```
//!
//! At most [`MAX_BUFFERS`] buffers are kept per channel; larger requests are
//! clamped.
//!
//! ## Sending
//!
//! A send channel starts with every buffer owned by the application, so the
//! first dequeues return immediately. After that, dequeue waits for the
//! driver to hand a buffer back.
//!
//! ```no_run
//! # use erio::{Context, Direction, Memory};
//! # use std::time::Duration;
//! # let context = Context::new();
//! # let mut tx = context.alloc_channel("/dev/tx-dma0", Direction::Send, Memory::Mmap)?;
//! # tx.request_buffers(32)?;
//! tx.start_streaming()?;
//! if let Some(buffer) = tx.dequeue(Some(Duration::from_millis(250)))? {
//!     buffer.as_mut_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);
//!     buffer.set_payload(0, 4);
//!     let index = buffer.index();
//!     tx.enqueue(index)?;
//! }
//! tx.stop_streaming()?;
//! # Ok::<(), erio::ErioError>(())
//! ```
//!
//! ## Receiving
//!
//! Receive buffers must be enqueued once before the driver can fill them.
//! A dequeued buffer's payload is the byte count reported by the driver, or
//! the length carried in the CHDR header when
//! [`Channel::set_chdr_length_quirk`] is enabled.
//!
//! ```no_run
//! # use erio::{Context, Direction, Memory};
//! # use std::time::Duration;
//! # let context = Context::new();
//! let mut rx = context.alloc_channel("/dev/rx-dma0", Direction::Receive, Memory::UserPtr)?;
//! rx.request_buffers(16)?;
//! rx.enqueue_all()?;
//! rx.start_streaming()?;
//!
//! while let Some(buffer) = rx.dequeue(Some(Duration::ZERO))? {
//!     println!("{} bytes", buffer.data().len());
//!     let index = buffer.index();
//!     rx.enqueue(index)?;
//! }
//! # Ok::<(), erio::ErioError>(())
//! ```
//!
//! ## Sharing Buffers
//!
//! [`Channel::export`] asks the driver for a descriptor of a buffer's
//! memory, and [`fdpass`] sends it to another process over a unix socket.

pub use backend::Backend;
pub use buffer::Buffer;
pub use channel::{timeout_from_micros, Channel};
pub use common::{Direction, MAX_BUFFERS};
pub use config::{ChannelConfig, Config};
pub use context::{Context, ContextBuilder};
pub use device::{DevNum, Device, DeviceNode, Readiness};
pub use erio_protocol::{BufType, Memory};
pub use error::{ErioError, Result};
pub use sysfs::Sysfs;

pub mod backend;
pub mod buffer;
pub mod channel;
pub(crate) mod common;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod fdpass;
pub mod log;
#[cfg(all(test, feature = "loom"))]
pub(crate) mod loom;
pub(crate) mod memory;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod sync;
pub mod sysfs;
