//! Linux implementation of foreign process memory access.
//!
//! Reads and writes go through `process_vm_readv` / `process_vm_writev`, which
//! transfer bytes between the address spaces without stopping the target.
//! Linux has no counterpart to `VirtualAllocEx`: reserving memory inside another
//! process requires code injection, so [`allocate`] and [`free`] only serve a
//! handle that names the calling process.

use std::sync::OnceLock;

/// Identifies the target process (its pid).
///
/// The handle is a plain value: copying it does not duplicate any OS resource and
/// dropping it releases nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pid: libc::pid_t,
}

impl ProcessHandle {
    /// Wraps an externally obtained pid.
    pub fn from_raw(pid: libc::pid_t) -> ProcessHandle {
        ProcessHandle { pid }
    }

    /// The calling process.
    pub fn current() -> ProcessHandle {
        ProcessHandle {
            pid: unsafe { libc::getpid() },
        }
    }

    pub fn as_raw(&self) -> libc::pid_t {
        self.pid
    }

    pub fn is_current(&self) -> bool {
        self.pid == unsafe { libc::getpid() }
    }
}

/// Reads `buf.len()` bytes at `address` in the target process.
///
/// Issues exactly one `process_vm_readv` call. A short transfer (the tail of the
/// range is unmapped) is reported as `UnexpectedEof`.
pub fn read(handle: ProcessHandle, address: u64, buf: &mut [u8]) -> std::io::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    let local = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };
    let remote = libc::iovec {
        iov_base: address as usize as *mut libc::c_void,
        iov_len: buf.len(),
    };
    let res = unsafe { libc::process_vm_readv(handle.pid, &local, 1, &remote, 1, 0) };
    check_transfer(res, buf.len())
}

/// Writes `data` at `address` in the target process.
///
/// Issues exactly one `process_vm_writev` call; see [`read`] for partial transfers.
pub fn write(handle: ProcessHandle, address: u64, data: &[u8]) -> std::io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let local = libc::iovec {
        iov_base: data.as_ptr() as *mut libc::c_void,
        iov_len: data.len(),
    };
    let remote = libc::iovec {
        iov_base: address as usize as *mut libc::c_void,
        iov_len: data.len(),
    };
    let res = unsafe { libc::process_vm_writev(handle.pid, &local, 1, &remote, 1, 0) };
    check_transfer(res, data.len())
}

fn check_transfer(res: libc::ssize_t, expected: usize) -> std::io::Result<()> {
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if res as usize != expected {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("partial transfer: {res} of {expected} bytes"),
        ));
    }
    Ok(())
}

/// Reserves a readable, writable and executable region of at least `size` bytes.
///
/// # Returns
///
/// `Ok((address, capacity))`, where `capacity` is `size` rounded up to the page size.
///
/// # Errors
///
/// `ErrorKind::Unsupported` when `handle` is not the calling process, otherwise
/// the `mmap` failure.
pub fn allocate(handle: ProcessHandle, size: usize) -> std::io::Result<(u64, usize)> {
    if !handle.is_current() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "allocation in a foreign process is not supported on Linux",
        ));
    }
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr as usize as u64, capacity))
}

/// Releases a region obtained from [`allocate`].
///
/// # Safety
///
/// - `address` and `capacity` must come from a previous call to [`allocate`]
///   with the same `handle`
/// - the region must not have been released already
/// - nothing in the target process may still use the region
pub unsafe fn free(handle: ProcessHandle, address: u64, capacity: usize) -> std::io::Result<()> {
    if !handle.is_current() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "allocation in a foreign process is not supported on Linux",
        ));
    }
    let res = unsafe { libc::munmap(address as usize as *mut libc::c_void, capacity) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Gets the system's standard page size in bytes.
///
/// The value is cached after the first call. Falls back to 4KB if
/// `sysconf(_SC_PAGESIZE)` fails.
pub fn get_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    if let Some(&size) = SIZE.get() {
        size
    } else {
        match read_page_size() {
            Ok(size) => {
                let _ = SIZE.set(size);
                size
            }
            Err(_) => 4 * 1024,
        }
    }
}

fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    assert!(res < i32::MAX as _);
    Ok(res as usize)
}
