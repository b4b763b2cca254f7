//! Windows implementation of foreign process memory access.

use std::sync::OnceLock;
use windows_sys::Win32::{
    Foundation::{GetLastError, HANDLE},
    System::{
        Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory},
        Memory::{
            MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE, VirtualAllocEx,
            VirtualFreeEx,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
        Threading::{GetCurrentProcess, GetCurrentProcessId, GetProcessId},
    },
};

/// Identifies the target process by an open process `HANDLE`.
///
/// The handle is borrowed: it must carry `PROCESS_VM_READ`, `PROCESS_VM_WRITE` and
/// `PROCESS_VM_OPERATION` access, and whoever opened it keeps the responsibility of
/// closing it after every backend derived from it is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    raw: HANDLE,
}

// A process HANDLE is a kernel object reference, usable from any thread.
unsafe impl Send for ProcessHandle {}
unsafe impl Sync for ProcessHandle {}

impl ProcessHandle {
    /// Wraps an externally opened process handle.
    pub fn from_raw(raw: HANDLE) -> ProcessHandle {
        ProcessHandle { raw }
    }

    /// The calling process (the `GetCurrentProcess` pseudo-handle).
    pub fn current() -> ProcessHandle {
        ProcessHandle {
            raw: unsafe { GetCurrentProcess() },
        }
    }

    pub fn as_raw(&self) -> HANDLE {
        self.raw
    }

    pub fn is_current(&self) -> bool {
        unsafe { GetProcessId(self.raw) == GetCurrentProcessId() }
    }
}

/// Reads `buf.len()` bytes at `address` in the target process.
///
/// Issues exactly one `ReadProcessMemory` call. A short transfer is reported as
/// `UnexpectedEof`.
pub fn read(handle: ProcessHandle, address: u64, buf: &mut [u8]) -> std::io::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    let mut transferred = 0usize;
    unsafe {
        let result = ReadProcessMemory(
            handle.raw,
            address as usize as *const std::ffi::c_void,
            buf.as_mut_ptr() as *mut std::ffi::c_void,
            buf.len(),
            &mut transferred,
        );
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    check_transfer(transferred, buf.len())
}

/// Writes `data` at `address` in the target process.
///
/// Issues exactly one `WriteProcessMemory` call; see [`read`] for partial transfers.
pub fn write(handle: ProcessHandle, address: u64, data: &[u8]) -> std::io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut transferred = 0usize;
    unsafe {
        let result = WriteProcessMemory(
            handle.raw,
            address as usize as *const std::ffi::c_void,
            data.as_ptr() as *const std::ffi::c_void,
            data.len(),
            &mut transferred,
        );
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    check_transfer(transferred, data.len())
}

fn check_transfer(transferred: usize, expected: usize) -> std::io::Result<()> {
    if transferred != expected {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("partial transfer: {transferred} of {expected} bytes"),
        ));
    }
    Ok(())
}

/// Reserves and commits a region of at least `size` bytes in the target process
/// with `PAGE_EXECUTE_READWRITE` protection.
///
/// # Returns
///
/// `Ok((address, capacity))`, where `capacity` is `size` rounded up to the page size.
///
/// # References
///
/// <https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualallocex>
pub fn allocate(handle: ProcessHandle, size: usize) -> std::io::Result<(u64, usize)> {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    unsafe {
        let ptr = VirtualAllocEx(
            handle.raw,
            std::ptr::null(),
            capacity,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        );

        if ptr.is_null() {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }

        Ok((ptr as usize as u64, capacity))
    }
}

/// Releases a region obtained from [`allocate`].
///
/// `MEM_RELEASE` frees the whole reservation, so `capacity` is only checked.
///
/// # Safety
///
/// - `address` and `capacity` must come from a previous call to [`allocate`]
///   with the same `handle`
/// - the region must not have been released already
/// - nothing in the target process may still use the region
pub unsafe fn free(handle: ProcessHandle, address: u64, capacity: usize) -> std::io::Result<()> {
    assert!(capacity.is_multiple_of(get_page_size()));
    unsafe {
        let result = VirtualFreeEx(
            handle.raw,
            address as usize as *mut std::ffi::c_void,
            0,
            MEM_RELEASE,
        );
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    Ok(())
}

/// Gets the system's standard page size in bytes.
///
/// The value is cached after the first call.
pub fn get_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| unsafe {
        let mut system_info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut system_info);
        system_info.dwPageSize as usize
    })
}
