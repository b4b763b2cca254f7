//! Placeholder for targets without a foreign memory API: every access is
//! reported as `Unsupported`.

/// Identifies the target process by an opaque id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    id: u32,
}

impl ProcessHandle {
    pub fn from_raw(id: u32) -> ProcessHandle {
        ProcessHandle { id }
    }

    pub fn current() -> ProcessHandle {
        ProcessHandle {
            id: std::process::id(),
        }
    }

    pub fn as_raw(&self) -> u32 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.id == std::process::id()
    }
}

fn unsupported() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "foreign process memory access is not available on this target",
    )
}

pub fn read(_handle: ProcessHandle, _address: u64, _buf: &mut [u8]) -> std::io::Result<()> {
    Err(unsupported())
}

pub fn write(_handle: ProcessHandle, _address: u64, _data: &[u8]) -> std::io::Result<()> {
    Err(unsupported())
}

pub fn allocate(_handle: ProcessHandle, _size: usize) -> std::io::Result<(u64, usize)> {
    Err(unsupported())
}

/// # Safety
///
/// Never releases anything; present for signature parity.
pub unsafe fn free(_handle: ProcessHandle, _address: u64, _capacity: usize) -> std::io::Result<()> {
    Err(unsupported())
}

/// Returns the "standard page" size in bytes.
pub fn get_page_size() -> usize {
    4 * 1024
}
