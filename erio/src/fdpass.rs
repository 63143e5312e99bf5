//! Hands exported buffer descriptors to another process over a connected
//! unix socket, one descriptor and one byte of payload per message.

use crate::error::{ErioError, Result};
use erio_protocol::retry_eintr;
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use tracing::{debug, warn};

pub fn send_fd<S: AsFd, F: AsFd>(socket: S, fd: F, payload: u8) -> Result<()> {
    let buf = [payload];
    let iov = [IoSlice::new(&buf)];
    let fds = [fd.as_fd().as_raw_fd()];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    let socket = socket.as_fd().as_raw_fd();

    retry_eintr(|| sendmsg::<()>(socket, &iov, &cmsg, MsgFlags::empty(), None))?;
    debug!(fd = fds[0], payload = payload, "sent descriptor");
    Ok(())
}

/// Receives one descriptor and its payload byte. Any extra descriptors in
/// the message are closed.
pub fn recv_fd<S: AsFd>(socket: S) -> Result<(OwnedFd, u8)> {
    let mut buf = [0u8; 1];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; 2]);
    let socket = socket.as_fd().as_raw_fd();

    let (bytes, mut fds) = retry_eintr(|| recv_once(socket, &mut buf, &mut cmsg_buffer))?;

    if fds.is_empty() {
        return Err(if bytes == 0 {
            ErioError::Disconnected
        } else {
            ErioError::NoDescriptor
        });
    }
    if fds.len() > 1 {
        warn!(count = fds.len(), "dropping extra descriptors");
        fds.truncate(1);
    }

    let fd = fds.remove(0);
    debug!(fd = fd.as_raw_fd(), payload = buf[0], "received descriptor");
    Ok((fd, buf[0]))
}

fn recv_once(
    socket: RawFd,
    buf: &mut [u8],
    cmsg_buffer: &mut Vec<u8>,
) -> nix::Result<(usize, Vec<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let msg = recvmsg::<()>(
        socket,
        &mut iov,
        Some(cmsg_buffer),
        MsgFlags::MSG_CMSG_CLOEXEC,
    )?;

    let mut fds = Vec::new();
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(raw) = cmsg {
            fds.extend(raw.into_iter().map(|fd| unsafe { OwnedFd::from_raw_fd(fd) }));
        }
    }
    Ok((msg.bytes, fds))
}
