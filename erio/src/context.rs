use crate::channel::Channel;
use crate::common::Direction;
use crate::config::ChannelConfig;
use crate::device::{Device, DeviceNode};
use crate::error::Result;
use crate::sync::Arc;
use crate::sysfs::Sysfs;
use erio_protocol::Memory;
use std::path::{Path, PathBuf};
use tracing::debug;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

struct ContextInner {
    sysfs: Sysfs,
    on_release: Option<ReleaseHook>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        debug!(sysfs = %self.sysfs.root().display(), "releasing context");
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// Shared handle to device discovery and the factory for channels.
///
/// Cloning takes a reference, dropping one releases it. The discovery
/// handle is released exactly once, by whichever thread drops the last
/// reference. Every channel holds its own reference.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A context discovering devices under `/sys`.
    pub fn new() -> Self {
        Context::builder().build()
    }

    pub fn with_sysfs_root<P: Into<PathBuf>>(root: P) -> Self {
        Context::builder().sysfs_root(root).build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn sysfs(&self) -> &Sysfs {
        &self.inner.sysfs
    }

    /// Number of live references, channels included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Opens the device node at `path` and allocates a channel on it.
    pub fn alloc_channel<P: AsRef<Path>>(
        &self,
        path: P,
        direction: Direction,
        memory: Memory,
    ) -> Result<Channel> {
        let device = DeviceNode::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened device");
        Ok(self.alloc_channel_with(device, direction, memory))
    }

    /// Allocates a channel on an already open device.
    pub fn alloc_channel_with<D: Device>(
        &self,
        device: D,
        direction: Direction,
        memory: Memory,
    ) -> Channel<D> {
        Channel::new(self.clone(), device, direction, memory)
    }

    /// Allocates a channel and applies `config` to it: quirk, fixed frame
    /// size and buffer count.
    pub fn open_channel(&self, config: &ChannelConfig) -> Result<Channel> {
        let device = DeviceNode::open(&config.path)?;
        self.configure(device, config)
    }

    pub fn open_channel_with<D: Device>(
        &self,
        device: D,
        config: &ChannelConfig,
    ) -> Result<Channel<D>> {
        self.configure(device, config)
    }

    fn configure<D: Device>(&self, device: D, config: &ChannelConfig) -> Result<Channel<D>> {
        let mut channel = self.alloc_channel_with(device, config.direction, config.memory);
        channel.set_chdr_length_quirk(config.chdr_length_quirk);
        if let Some(size) = config.fixed_size {
            channel.set_fixed_size(0, size)?;
        }
        channel.request_buffers(config.buffers)?;
        Ok(channel)
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sysfs", &self.inner.sysfs.root())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    sysfs_root: Option<PathBuf>,
    on_release: Option<ReleaseHook>,
}

impl ContextBuilder {
    pub fn sysfs_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.sysfs_root = Some(root.into());
        self
    }

    /// Runs `hook` once, when the last reference is dropped.
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Context {
        let sysfs = match self.sysfs_root {
            Some(root) => Sysfs::new(root),
            None => Sysfs::default(),
        };
        debug!(sysfs = %sysfs.root().display(), "created context");
        Context {
            inner: Arc::new(ContextInner {
                sysfs,
                on_release: self.on_release,
            }),
        }
    }
}
