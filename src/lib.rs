//! viface - Virtual network interface manager
//!
//! This library allocates, names, and tears down Linux TUN/TAP devices on
//! behalf of a larger networking tool (a VPN client, namespace bridge, or
//! packet-capture pipeline).
//!
//! ## What This Library Provides
//! - Device allocation: one open of the clone device node plus one
//!   `TUNSETIFF` control request per interface
//! - Name negotiation: bounds-validated preferred names, reconciled with
//!   the name the kernel actually assigns
//! - Lifecycle tracking: an `Allocated -> Up <-> Down -> Destroyed` state
//!   machine over a mutex-guarded interface table
//! - Configuration parsing and validation (TOML format)
//!
//! ## What Your Application Must Implement
//! - Packet processing on the allocated device handles
//! - Address assignment, routing, and DNS configuration
//! - Privilege acquisition (`CAP_NET_ADMIN`)
//!
//! Every failure is returned as a typed error; the library never exits
//! the process. Abort-or-retry policy belongs to the caller.

pub mod alloc;
pub mod config;
pub mod error;
pub mod handle;
pub mod manager;
pub mod name;

// Re-export core types for the caller-facing interface
pub use alloc::{DeviceAllocator, InterfaceRequest, TunTapAllocator};
pub use config::Config;
pub use error::{IfaceError, Result};
pub use handle::{DeviceHandle, InterfaceKind};
pub use manager::{InterfaceManager, InterfaceState};
pub use name::InterfaceName;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
