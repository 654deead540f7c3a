//! Virtual interface allocation
//!
//! Opens the TUN/TAP clone device node and issues the `TUNSETIFF` control
//! request that creates (or attaches to) a virtual interface. The kernel
//! may rewrite the requested name in the same request structure; the name
//! read back is reconciled against the request before the handle is
//! returned.

use crate::config::DeviceConfig;
use crate::error::{IfaceError, Result};
use crate::handle::{DeviceHandle, InterfaceKind};
use crate::name::{self, InterfaceName};
use libc::{c_char, c_short, c_void};
use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::process::Command;

const IFNAMSIZ: usize = 16;

const IFF_TUN: c_short = 0x0001;
const IFF_TAP: c_short = 0x0002;
const IFF_NO_PI: c_short = 0x1000;
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

/// Interface request structure passed to `TUNSETIFF`. Padded to the full
/// kernel `struct ifreq` size; the kernel copies the whole structure.
#[repr(C)]
struct IfReq {
    ifr_name: [c_char; IFNAMSIZ],
    ifr_flags: c_short,
    _pad: [u8; 22],
}

impl IfReq {
    fn zeroed() -> Self {
        Self {
            ifr_name: [0; IFNAMSIZ],
            ifr_flags: 0,
            _pad: [0; 22],
        }
    }
}

/// A request for one new virtual interface
#[derive(Debug, Clone)]
pub struct InterfaceRequest {
    /// Requested interface kind
    pub kind: InterfaceKind,
    /// Preferred name; `None` lets the kernel assign one
    pub preferred_name: Option<InterfaceName>,
}

impl InterfaceRequest {
    /// Build a request with a preferred name. An empty name means "let
    /// the kernel assign"; a non-empty name is validated against the
    /// platform bound.
    pub fn new(kind: InterfaceKind, preferred_name: &str) -> Result<Self> {
        Ok(Self {
            kind,
            preferred_name: name::validate_preferred(preferred_name)?,
        })
    }

    /// Build a request that leaves naming to the kernel
    pub fn unnamed(kind: InterfaceKind) -> Self {
        Self {
            kind,
            preferred_name: None,
        }
    }
}

/// Allocation and administrative-state backend for virtual interfaces.
///
/// The lifecycle manager talks to the system only through this trait, so
/// tests can substitute a fake that never touches the kernel.
pub trait DeviceAllocator: Send + Sync {
    /// Allocate one new interface, returning the open handle and the
    /// kernel-assigned name
    fn allocate(&self, request: &InterfaceRequest) -> Result<(DeviceHandle, InterfaceName)>;

    /// Apply the administrative link state for a live interface
    fn set_link_state(&self, name: &InterfaceName, up: bool) -> Result<()>;
}

/// Allocator backed by the native Linux TUN/TAP driver
pub struct TunTapAllocator {
    device_path: String,
    packet_info: bool,
    apply_link_state: bool,
}

impl TunTapAllocator {
    /// Create an allocator for the configured clone device node
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            device_path: config.device_path.clone(),
            packet_info: config.packet_info,
            apply_link_state: true,
        }
    }

    /// Create an allocator that only tracks link-state transitions
    /// without invoking the system `ip` tool
    pub fn without_link_state(config: &DeviceConfig) -> Self {
        Self {
            apply_link_state: false,
            ..Self::new(config)
        }
    }

    /// Check whether the clone device node exists
    pub fn device_available(&self) -> bool {
        Path::new(&self.device_path).exists()
    }

    fn open_device(&self) -> Result<RawFd> {
        let path = CString::new(self.device_path.as_str())
            .map_err(|_| IfaceError::Config(format!("Invalid device path: {}", self.device_path)))?;

        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(classify_open_error(
                io::Error::last_os_error(),
                &self.device_path,
            ));
        }
        Ok(fd)
    }

    /// Issue the creation/attach control request and read back the name
    /// the kernel assigned
    fn attach(&self, fd: RawFd, request: &InterfaceRequest) -> Result<String> {
        let mut ifr = IfReq::zeroed();
        ifr.ifr_flags = request_flags(request.kind, self.packet_info);
        if let Some(ref preferred) = request.preferred_name {
            encode_name(&mut ifr.ifr_name, preferred.as_str());
        }

        let result = unsafe { libc::ioctl(fd, TUNSETIFF, &mut ifr as *mut _ as *mut c_void) };
        if result < 0 {
            return Err(classify_attach_error(
                io::Error::last_os_error(),
                request,
            ));
        }

        Ok(decode_name(&ifr.ifr_name))
    }
}

impl DeviceAllocator for TunTapAllocator {
    fn allocate(&self, request: &InterfaceRequest) -> Result<(DeviceHandle, InterfaceName)> {
        let fd = self.open_device()?;

        let negotiated = self
            .attach(fd, request)
            .and_then(|assigned| name::reconcile(request.preferred_name.as_ref(), &assigned));

        match negotiated {
            Ok(final_name) => {
                log::info!("Created {} interface {}", request.kind, final_name);
                let handle =
                    DeviceHandle::new(fd, request.kind, final_name.clone(), self.packet_info);
                Ok((handle, final_name))
            }
            Err(e) => {
                // Release the partially opened descriptor before surfacing
                // the error.
                unsafe {
                    libc::close(fd);
                }
                Err(e)
            }
        }
    }

    fn set_link_state(&self, name: &InterfaceName, up: bool) -> Result<()> {
        if !self.apply_link_state {
            return Ok(());
        }

        let state = if up { "up" } else { "down" };
        let output = Command::new("ip")
            .args(["link", "set", "dev", name.as_str(), state])
            .output()
            .map_err(|e| IfaceError::SystemConfig(format!("Failed to run ip link: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IfaceError::SystemConfig(format!(
                "ip link set dev {name} {state} failed: {}",
                stderr.trim()
            )));
        }

        log::info!("Interface {name} set {state}");
        Ok(())
    }
}

fn request_flags(kind: InterfaceKind, packet_info: bool) -> c_short {
    let mut flags = match kind {
        InterfaceKind::Tun => IFF_TUN,
        InterfaceKind::Tap => IFF_TAP,
    };
    if !packet_info {
        flags |= IFF_NO_PI;
    }
    flags
}

fn encode_name(buf: &mut [c_char; IFNAMSIZ], name: &str) {
    // Length was validated by InterfaceName; the trailing NUL always fits.
    for (dst, src) in buf.iter_mut().zip(name.as_bytes()) {
        *dst = *src as c_char;
    }
}

fn decode_name(buf: &[c_char; IFNAMSIZ]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).to_string()
}

fn classify_open_error(err: io::Error, path: &str) -> IfaceError {
    match err.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENXIO) | Some(libc::ENODEV) => {
            IfaceError::DeviceNodeUnavailable(format!("{path}: {err}"))
        }
        Some(libc::EACCES) | Some(libc::EPERM) => {
            IfaceError::InsufficientPrivilege(format!("open {path}: {err}"))
        }
        _ => IfaceError::Io(err),
    }
}

fn classify_attach_error(err: io::Error, request: &InterfaceRequest) -> IfaceError {
    match err.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => {
            IfaceError::InsufficientPrivilege(format!("TUNSETIFF: {err}"))
        }
        Some(libc::EBUSY) => {
            let requested = request
                .preferred_name
                .as_ref()
                .map_or(String::new(), |n| n.as_str().to_string());
            IfaceError::NameCollision(requested)
        }
        _ => IfaceError::Io(err),
    }
}
