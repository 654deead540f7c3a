//! Interface lifecycle management
//!
//! Owns the set of allocated interfaces and tracks each one through the
//! `Allocated -> Up <-> Down -> Destroyed` state machine. The name->record
//! table is guarded by a mutex; every operation takes the guard for the
//! duration of its table access so concurrent callers observe a consistent
//! view. Packet I/O on the handles is not serialized here.

use crate::alloc::{DeviceAllocator, InterfaceRequest, TunTapAllocator};
use crate::config::Config;
use crate::error::{IfaceError, Result};
use crate::handle::DeviceHandle;
use crate::name::InterfaceName;
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::{Mutex, MutexGuard};

/// Administrative state of a managed interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    /// Created but not yet brought up
    Allocated,
    /// Administratively up
    Up,
    /// Administratively down after having been up
    Down,
    /// Terminal; the record is removed from the table
    Destroyed,
}

impl fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceState::Allocated => f.write_str("allocated"),
            InterfaceState::Up => f.write_str("up"),
            InterfaceState::Down => f.write_str("down"),
            InterfaceState::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// One managed interface: its name, handle, and current state
struct InterfaceRecord {
    name: InterfaceName,
    handle: DeviceHandle,
    state: InterfaceState,
}

/// Lifecycle manager for virtual interfaces.
///
/// Generic over the allocator so tests can run against a fake backend;
/// production code uses [`TunTapAllocator`].
pub struct InterfaceManager<A: DeviceAllocator = TunTapAllocator> {
    allocator: A,
    // Vec keeps insertion order for list_interfaces; the table stays
    // small enough that linear lookup is fine.
    table: Mutex<Vec<InterfaceRecord>>,
}

impl InterfaceManager<TunTapAllocator> {
    /// Create a manager backed by the native TUN/TAP driver
    pub fn new(config: &Config) -> Self {
        let allocator = if config.manager.apply_link_state {
            TunTapAllocator::new(&config.device)
        } else {
            TunTapAllocator::without_link_state(&config.device)
        };
        Self::with_allocator(allocator)
    }
}

impl<A: DeviceAllocator> InterfaceManager<A> {
    /// Create a manager over a caller-supplied allocator
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            allocator,
            table: Mutex::new(Vec::new()),
        }
    }

    /// Allocate a new interface and register it in the Allocated state.
    ///
    /// A preferred name that is already a key in the local table is
    /// rejected with `NameCollision` before any system call is made.
    pub fn create(&self, request: &InterfaceRequest) -> Result<InterfaceName> {
        let mut table = self.table();

        if let Some(ref preferred) = request.preferred_name {
            if table.iter().any(|r| &r.name == preferred) {
                return Err(IfaceError::NameCollision(preferred.as_str().to_string()));
            }
        }

        let (mut handle, name) = self.allocator.allocate(request)?;

        // A kernel-assigned name can still clash with a tracked record;
        // at most one record may exist per name.
        if table.iter().any(|r| r.name == name) {
            handle.close();
            return Err(IfaceError::NameCollision(name.as_str().to_string()));
        }

        log::info!("Registered {} interface {name}", request.kind);
        table.push(InterfaceRecord {
            name: name.clone(),
            handle,
            state: InterfaceState::Allocated,
        });

        Ok(name)
    }

    /// Bring an interface administratively up
    pub fn bring_up(&self, name: &str) -> Result<()> {
        let target = {
            let mut table = self.table();
            let record = Self::find(&mut table, name)?;
            if record.state == InterfaceState::Up {
                return Err(IfaceError::AlreadyUp(name.to_string()));
            }
            record.name.clone()
        };

        // The administrative step runs a subprocess; the table guard is
        // released around it so other manager operations are not blocked.
        self.allocator.set_link_state(&target, true)?;

        let mut table = self.table();
        let record = Self::find(&mut table, name)?;
        if record.state == InterfaceState::Up {
            return Err(IfaceError::AlreadyUp(name.to_string()));
        }
        record.state = InterfaceState::Up;
        log::debug!("Interface {name} transitioned to up");
        Ok(())
    }

    /// Bring an interface administratively down
    pub fn bring_down(&self, name: &str) -> Result<()> {
        let target = {
            let mut table = self.table();
            let record = Self::find(&mut table, name)?;
            if record.state != InterfaceState::Up {
                return Err(IfaceError::AlreadyDown(name.to_string()));
            }
            record.name.clone()
        };

        self.allocator.set_link_state(&target, false)?;

        let mut table = self.table();
        let record = Self::find(&mut table, name)?;
        if record.state != InterfaceState::Up {
            return Err(IfaceError::AlreadyDown(name.to_string()));
        }
        record.state = InterfaceState::Down;
        log::debug!("Interface {name} transitioned to down");
        Ok(())
    }

    /// Destroy an interface: close its handle and drop it from the table.
    /// A second call for the same name returns `NotFound`.
    pub fn destroy(&self, name: &str) -> Result<()> {
        let mut table = self.table();
        let index = table
            .iter()
            .position(|r| r.name.as_str() == name)
            .ok_or_else(|| IfaceError::NotFound(name.to_string()))?;

        let mut record = table.remove(index);
        record.handle.close();
        log::info!("Destroyed interface {name}");
        Ok(())
    }

    /// Snapshot of the live interfaces in insertion order
    pub fn list_interfaces(&self) -> Vec<(InterfaceName, InterfaceState)> {
        self.table()
            .iter()
            .map(|r| (r.name.clone(), r.state))
            .collect()
    }

    /// Run a short closure against the handle of a live interface, e.g.
    /// an address configuration step.
    ///
    /// The closure runs with the table guard held: it must not block and
    /// must not call back into the manager (the guard is non-reentrant).
    /// For long-lived packet I/O use [`InterfaceManager::dup_fd`] instead.
    pub fn with_handle<R>(&self, name: &str, f: impl FnOnce(&DeviceHandle) -> R) -> Result<R> {
        let mut table = self.table();
        let record = Self::find(&mut table, name)?;
        Ok(f(&record.handle))
    }

    /// Duplicate the descriptor of a live interface for packet I/O that
    /// outlives the table guard.
    ///
    /// The duplicate stays readable and writable after [`destroy`] closes
    /// the manager's descriptor; the kernel removes a non-persistent
    /// interface only once every descriptor is closed.
    ///
    /// [`destroy`]: InterfaceManager::destroy
    pub fn dup_fd(&self, name: &str) -> Result<OwnedFd> {
        let mut table = self.table();
        let record = Self::find(&mut table, name)?;
        record.handle.try_clone_fd()
    }

    fn find<'t>(
        table: &'t mut MutexGuard<'_, Vec<InterfaceRecord>>,
        name: &str,
    ) -> Result<&'t mut InterfaceRecord> {
        table
            .iter_mut()
            .find(|r| r.name.as_str() == name)
            .ok_or_else(|| IfaceError::NotFound(name.to_string()))
    }

    fn table(&self) -> MutexGuard<'_, Vec<InterfaceRecord>> {
        // Recover the table on a poisoned lock; records stay consistent
        // because every mutation completes before the guard is released.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::InterfaceKind;
    use crate::name::MAX_NAME_LEN;
    use std::ffi::CString;
    use std::os::unix::io::AsRawFd;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    /// Allocator fake: hands out /dev/null descriptors and counts how
    /// often it was invoked.
    struct FakeAllocator {
        allocations: AtomicUsize,
        fail_link_state: bool,
        fixed_name: Option<InterfaceName>,
    }

    impl FakeAllocator {
        fn new() -> Self {
            Self {
                allocations: AtomicUsize::new(0),
                fail_link_state: false,
                fixed_name: None,
            }
        }

        fn with_failing_link_state() -> Self {
            Self {
                fail_link_state: true,
                ..Self::new()
            }
        }

        /// Always assigns the given kernel name, regardless of request
        fn with_fixed_kernel_name(name: &str) -> Self {
            Self {
                fixed_name: Some(InterfaceName::new(name).unwrap()),
                ..Self::new()
            }
        }

        fn allocation_count(&self) -> usize {
            self.allocations.load(Ordering::SeqCst)
        }

        fn open_null() -> std::os::unix::io::RawFd {
            let path = CString::new("/dev/null").unwrap();
            let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
            assert!(fd >= 0);
            fd
        }
    }

    impl DeviceAllocator for FakeAllocator {
        fn allocate(&self, request: &InterfaceRequest) -> Result<(DeviceHandle, InterfaceName)> {
            let n = self.allocations.fetch_add(1, Ordering::SeqCst);
            let name = match (&self.fixed_name, &request.preferred_name) {
                (Some(fixed), _) => fixed.clone(),
                (None, Some(preferred)) => preferred.clone(),
                (None, None) => InterfaceName::new(&format!("tap{n}")).unwrap(),
            };
            let handle = DeviceHandle::new(Self::open_null(), request.kind, name.clone(), false);
            Ok((handle, name))
        }

        fn set_link_state(&self, name: &InterfaceName, up: bool) -> Result<()> {
            if self.fail_link_state {
                return Err(IfaceError::SystemConfig(format!(
                    "link state change refused for {name} (up={up})"
                )));
            }
            Ok(())
        }
    }

    /// Allocator fake whose link-state changes block on barriers, so a
    /// test can observe the manager while a change is in flight.
    struct BlockingLinkAllocator {
        inner: FakeAllocator,
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl DeviceAllocator for BlockingLinkAllocator {
        fn allocate(&self, request: &InterfaceRequest) -> Result<(DeviceHandle, InterfaceName)> {
            self.inner.allocate(request)
        }

        fn set_link_state(&self, _name: &InterfaceName, _up: bool) -> Result<()> {
            self.entered.wait();
            self.release.wait();
            Ok(())
        }
    }

    fn manager() -> InterfaceManager<FakeAllocator> {
        InterfaceManager::with_allocator(FakeAllocator::new())
    }

    fn tap_request(name: &str) -> InterfaceRequest {
        InterfaceRequest::new(InterfaceKind::Tap, name).unwrap()
    }

    #[test]
    fn test_create_with_kernel_assigned_name() {
        let mgr = manager();
        let name = mgr
            .create(&InterfaceRequest::unnamed(InterfaceKind::Tun))
            .unwrap();
        assert!(!name.as_str().is_empty());
        assert!(name.as_str().len() <= MAX_NAME_LEN);
    }

    #[test]
    fn test_local_collision_skips_allocator() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();
        assert_eq!(mgr.allocator.allocation_count(), 1);

        let err = mgr.create(&tap_request("tap0")).unwrap_err();
        assert!(matches!(err, IfaceError::NameCollision(name) if name == "tap0"));
        // The fast local check must reject before reaching the allocator.
        assert_eq!(mgr.allocator.allocation_count(), 1);
    }

    #[test]
    fn test_destroy_twice() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();
        mgr.destroy("tap0").unwrap();
        let err = mgr.destroy("tap0").unwrap_err();
        assert!(matches!(err, IfaceError::NotFound(_)));
    }

    #[test]
    fn test_bring_up_unknown_interface() {
        let mgr = manager();
        let err = mgr.bring_up("tap9").unwrap_err();
        assert!(matches!(err, IfaceError::NotFound(_)));
    }

    #[test]
    fn test_bring_up_twice() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();
        mgr.bring_up("tap0").unwrap();
        let err = mgr.bring_up("tap0").unwrap_err();
        assert!(matches!(err, IfaceError::AlreadyUp(_)));
    }

    #[test]
    fn test_up_down_cycle() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();

        mgr.bring_up("tap0").unwrap();
        mgr.bring_down("tap0").unwrap();
        mgr.bring_up("tap0").unwrap();

        let interfaces = mgr.list_interfaces();
        assert_eq!(interfaces[0].1, InterfaceState::Up);
    }

    #[test]
    fn test_bring_down_when_never_up() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();
        let err = mgr.bring_down("tap0").unwrap_err();
        assert!(matches!(err, IfaceError::AlreadyDown(_)));
    }

    #[test]
    fn test_list_reflects_destroy() {
        let mgr = manager();
        mgr.create(&tap_request("a")).unwrap();
        mgr.create(&tap_request("b")).unwrap();
        mgr.destroy("a").unwrap();

        let interfaces = mgr.list_interfaces();
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].0.as_str(), "b");
        assert_eq!(interfaces[0].1, InterfaceState::Allocated);
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let mgr = manager();
        for name in ["c", "a", "b"] {
            mgr.create(&tap_request(name)).unwrap();
        }
        let interfaces = mgr.list_interfaces();
        let names: Vec<&str> = interfaces.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn test_name_reusable_after_destroy() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();
        mgr.destroy("tap0").unwrap();
        mgr.create(&tap_request("tap0")).unwrap();
        assert_eq!(mgr.list_interfaces().len(), 1);
    }

    #[test]
    fn test_failed_link_state_keeps_state() {
        let mgr = InterfaceManager::with_allocator(FakeAllocator::with_failing_link_state());
        mgr.create(&tap_request("tap0")).unwrap();

        let err = mgr.bring_up("tap0").unwrap_err();
        assert!(matches!(err, IfaceError::SystemConfig(_)));
        assert_eq!(mgr.list_interfaces()[0].1, InterfaceState::Allocated);
    }

    #[test]
    fn test_kernel_assigned_name_clashing_with_record() {
        let mgr = InterfaceManager::with_allocator(FakeAllocator::with_fixed_kernel_name("tap0"));
        mgr.create(&InterfaceRequest::unnamed(InterfaceKind::Tap))
            .unwrap();

        let err = mgr
            .create(&InterfaceRequest::unnamed(InterfaceKind::Tap))
            .unwrap_err();
        assert!(matches!(err, IfaceError::NameCollision(name) if name == "tap0"));

        // The allocator ran (no local name to check), but the clashing
        // allocation was rejected and the first record kept.
        assert_eq!(mgr.allocator.allocation_count(), 2);
        assert_eq!(mgr.list_interfaces().len(), 1);
    }

    #[test]
    fn test_table_stays_usable_during_link_state_change() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let mgr = Arc::new(InterfaceManager::with_allocator(BlockingLinkAllocator {
            inner: FakeAllocator::new(),
            entered: entered.clone(),
            release: release.clone(),
        }));
        mgr.create(&tap_request("tap0")).unwrap();

        let worker = {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || mgr.bring_up("tap0"))
        };

        // The link-state change is now in flight; the table guard must be
        // free, so a snapshot completes and still shows the old state.
        entered.wait();
        assert_eq!(mgr.list_interfaces()[0].1, InterfaceState::Allocated);
        release.wait();

        worker.join().unwrap().unwrap();
        assert_eq!(mgr.list_interfaces()[0].1, InterfaceState::Up);
    }

    #[test]
    fn test_dup_fd_outlives_destroy() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();

        let dup = mgr.dup_fd("tap0").unwrap();
        mgr.destroy("tap0").unwrap();
        assert!(matches!(mgr.dup_fd("tap0"), Err(IfaceError::NotFound(_))));

        // The duplicated descriptor stays writable after the manager's
        // own descriptor was closed.
        let written = unsafe {
            libc::write(
                dup.as_raw_fd(),
                b"x".as_ptr() as *const libc::c_void,
                1,
            )
        };
        assert_eq!(written, 1);
    }

    #[test]
    fn test_with_handle_exposes_live_handle() {
        let mgr = manager();
        mgr.create(&tap_request("tap0")).unwrap();
        let kind = mgr.with_handle("tap0", |h| h.kind()).unwrap();
        assert_eq!(kind, InterfaceKind::Tap);

        mgr.destroy("tap0").unwrap();
        assert!(mgr.with_handle("tap0", |h| h.kind()).is_err());
    }
}
