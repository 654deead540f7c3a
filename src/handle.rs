//! Owned handle to an open virtual interface device
//!
//! A [`DeviceHandle`] exclusively owns one open TUN/TAP file descriptor.
//! Closing is idempotent and irreversible; the descriptor is released on
//! drop if the owner never closed it explicitly.

use crate::error::{IfaceError, Result};
use crate::name::InterfaceName;
use bytes::Bytes;
use libc::c_void;
use std::fmt;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::io::{AsRawFd, RawFd};

/// Length of the info header the kernel prepends to every packet when
/// packet-info framing is enabled (flags + EtherType)
const PACKET_INFO_LEN: usize = 4;

/// Kind of virtual interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// Layer-3 device exchanging raw IP packets
    Tun,
    /// Layer-2 device exchanging raw Ethernet frames
    Tap,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceKind::Tun => f.write_str("TUN"),
            InterfaceKind::Tap => f.write_str("TAP"),
        }
    }
}

/// An open virtual interface device handle
pub struct DeviceHandle {
    fd: RawFd,
    kind: InterfaceKind,
    name: InterfaceName,
    packet_info: bool,
    closed: bool,
}

impl DeviceHandle {
    pub(crate) fn new(
        fd: RawFd,
        kind: InterfaceKind,
        name: InterfaceName,
        packet_info: bool,
    ) -> Self {
        Self {
            fd,
            kind,
            name,
            packet_info,
            closed: false,
        }
    }

    /// Get the negotiated interface name
    pub fn name(&self) -> &InterfaceName {
        &self.name
    }

    /// Get the interface kind
    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    /// Check whether the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the OS resource. Safe to call more than once; the second
    /// and later calls are no-ops.
    pub fn close(&mut self) {
        if !self.closed {
            unsafe {
                libc::close(self.fd);
            }
            self.closed = true;
            log::debug!("Closed {} device {}", self.kind, self.name);
        }
    }

    /// Read one packet from the device. Blocks until a packet is
    /// available unless the handle was switched to non-blocking mode.
    ///
    /// With packet-info framing enabled the returned bytes include the
    /// kernel's 4-byte info header; the read buffer is sized so a
    /// full-MTU packet is never truncated by the header.
    pub fn read_packet(&self, mtu: u16) -> Result<Bytes> {
        self.ensure_open()?;
        let header = if self.packet_info { PACKET_INFO_LEN } else { 0 };
        let mut buffer = vec![0u8; mtu as usize + header];

        let bytes_read =
            unsafe { libc::read(self.fd, buffer.as_mut_ptr() as *mut c_void, buffer.len()) };
        if bytes_read < 0 {
            return Err(IfaceError::Io(io::Error::last_os_error()));
        }

        buffer.truncate(bytes_read as usize);
        Ok(Bytes::from(buffer))
    }

    /// Write one packet to the device
    pub fn write_packet(&self, packet: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let bytes_written =
            unsafe { libc::write(self.fd, packet.as_ptr() as *const c_void, packet.len()) };
        if bytes_written < 0 {
            return Err(IfaceError::Io(io::Error::last_os_error()));
        }
        if bytes_written != packet.len() as isize {
            return Err(IfaceError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!(
                    "incomplete write to {}: {bytes_written} of {} bytes",
                    self.name,
                    packet.len()
                ),
            )));
        }

        Ok(())
    }

    /// Duplicate the descriptor, e.g. for a packet-processing loop that
    /// must not hold the owning record's guard
    pub fn try_clone_fd(&self) -> Result<OwnedFd> {
        self.ensure_open()?;

        let fd = unsafe { libc::dup(self.fd) };
        if fd < 0 {
            return Err(IfaceError::Io(io::Error::last_os_error()));
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Switch the descriptor to non-blocking mode
    pub fn set_nonblocking(&self) -> Result<()> {
        self.ensure_open()?;

        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(IfaceError::Io(io::Error::last_os_error()));
        }
        let result = unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(IfaceError::Io(io::Error::last_os_error()));
        }

        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(IfaceError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("device handle for {} is closed", self.name),
            )));
        }
        Ok(())
    }
}

impl AsRawFd for DeviceHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("fd", &self.fd)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("closed", &self.closed)
            .finish()
    }
}
