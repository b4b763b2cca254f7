//! Backends: the byte ranges views are built on.
//!
//! A [`Backend`] is a closed set of storage strategies sharing one contract:
//! an address, a size, and raw reads and writes at an offset. External backends
//! describe memory of another process and are the only place where foreign I/O
//! is issued; the local buffer backend keeps its bytes in this process and exists
//! for tests and fixtures.
//!
//! Offsets are checked with `assert!`: an out-of-range access is a bug in the
//! layer above, not an environmental condition.

use std::sync::{Arc, Mutex, PoisonError};

use xmem_common::{Result, error::Error};
use xmem_process::ProcessHandle;

use crate::allocator::AllocatorId;

/// The storage strategy of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Foreign memory handed out by an allocator of this process.
    OwnedExternal,
    /// Foreign memory reached by address; never released by this process.
    UnownedExternal,
    /// Bytes held in a local buffer.
    LocalBuffer,
}

impl BackendKind {
    /// The kind a backend of this kind hands to memory it reaches indirectly
    /// (pointer targets, embedded sub-objects).
    ///
    /// Ownership is never inherited, and a local buffer has nothing to propagate to.
    pub const fn propagation(self) -> Option<BackendKind> {
        match self {
            BackendKind::OwnedExternal | BackendKind::UnownedExternal => {
                Some(BackendKind::UnownedExternal)
            }
            BackendKind::LocalBuffer => None,
        }
    }
}

/// A range of foreign memory: process, base address and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalRegion {
    process: ProcessHandle,
    address: u64,
    size: usize,
}

impl ExternalRegion {
    pub fn new(process: ProcessHandle, address: u64, size: usize) -> ExternalRegion {
        assert!(
            address.checked_add(size as u64).is_some(),
            "region of {size} bytes at {address:#x} wraps the address space"
        );
        ExternalRegion {
            process,
            address,
            size,
        }
    }

    pub fn process(&self) -> ProcessHandle {
        self.process
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let address = self.address + offset as u64;
        log::trace!("read {} bytes at {address:#x}", buf.len());
        xmem_process::read(self.process, address, buf)
            .map_err(|e| Error::access(address, buf.len(), e))
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let address = self.address + offset as u64;
        log::trace!("write {} bytes at {address:#x}", data.len());
        xmem_process::write(self.process, address, data)
            .map_err(|e| Error::access(address, data.len(), e))
    }
}

/// Bytes kept in this process, shared between clones of the backend.
///
/// `base` is the address the buffer pretends to live at; it only affects
/// `address()` and `end_address()`.
#[derive(Debug, Clone)]
pub struct LocalBuffer {
    base: u64,
    bytes: Arc<Mutex<Vec<u8>>>,
    size: usize,
}

impl LocalBuffer {
    pub fn new(base: u64, bytes: Vec<u8>) -> LocalBuffer {
        let size = bytes.len();
        LocalBuffer {
            base,
            bytes: Arc::new(Mutex::new(bytes)),
            size,
        }
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }
}

#[derive(Debug, Clone)]
pub enum Backend {
    /// Produced only by an allocator; carries the id of that allocator.
    OwnedExternal {
        region: ExternalRegion,
        allocator: AllocatorId,
    },
    UnownedExternal(ExternalRegion),
    Local(LocalBuffer),
}

impl Backend {
    /// Describes foreign memory at `address` without taking ownership of it.
    pub fn unowned(process: ProcessHandle, address: u64, size: usize) -> Backend {
        Backend::UnownedExternal(ExternalRegion::new(process, address, size))
    }

    pub(crate) fn owned(
        process: ProcessHandle,
        address: u64,
        size: usize,
        allocator: AllocatorId,
    ) -> Backend {
        Backend::OwnedExternal {
            region: ExternalRegion::new(process, address, size),
            allocator,
        }
    }

    /// A local buffer based at address 0.
    pub fn local(bytes: Vec<u8>) -> Backend {
        Backend::Local(LocalBuffer::new(0, bytes))
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::OwnedExternal { .. } => BackendKind::OwnedExternal,
            Backend::UnownedExternal(_) => BackendKind::UnownedExternal,
            Backend::Local(_) => BackendKind::LocalBuffer,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Backend::OwnedExternal { .. })
    }

    /// The allocator that produced this backend, if it is owned.
    pub fn allocator(&self) -> Option<AllocatorId> {
        match self {
            Backend::OwnedExternal { allocator, .. } => Some(*allocator),
            _ => None,
        }
    }

    /// The process an external backend belongs to.
    pub fn process(&self) -> Option<ProcessHandle> {
        match self {
            Backend::OwnedExternal { region, .. } | Backend::UnownedExternal(region) => {
                Some(region.process)
            }
            Backend::Local(_) => None,
        }
    }

    pub fn address(&self) -> u64 {
        match self {
            Backend::OwnedExternal { region, .. } | Backend::UnownedExternal(region) => {
                region.address
            }
            Backend::Local(buffer) => buffer.base,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Backend::OwnedExternal { region, .. } | Backend::UnownedExternal(region) => {
                region.size
            }
            Backend::Local(buffer) => buffer.size,
        }
    }

    pub fn end_address(&self) -> u64 {
        self.address() + self.size() as u64
    }

    pub fn propagation_kind(&self) -> Option<BackendKind> {
        self.kind().propagation()
    }

    /// Builds the backend describing `size` bytes at `address` that this backend
    /// hands to memory it does not own.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` if this backend has no propagation target, `Access`
    /// if the range wraps the address space (`address` usually comes from
    /// foreign memory).
    pub fn propagate(&self, address: u64, size: usize) -> Result<Backend> {
        match (self.propagation_kind(), self.process()) {
            (Some(BackendKind::UnownedExternal), Some(process)) => {
                if address.checked_add(size as u64).is_none() {
                    return Err(Error::access(
                        address,
                        size,
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            "range wraps the address space",
                        ),
                    ));
                }
                Ok(Backend::unowned(process, address, size))
            }
            _ => Err(Error::unsupported(format!(
                "materializing memory at {address:#x} through a {:?} backend",
                self.kind()
            ))),
        }
    }

    /// Fills `buf` from `offset`.
    ///
    /// # Panics
    ///
    /// If `offset + buf.len()` exceeds `size()`.
    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(offset, buf.len());
        match self {
            Backend::OwnedExternal { region, .. } | Backend::UnownedExternal(region) => {
                region.read(offset, buf)
            }
            Backend::Local(buffer) => {
                buffer.read(offset, buf);
                Ok(())
            }
        }
    }

    /// Reads `count` bytes at `offset`.
    ///
    /// # Panics
    ///
    /// If `offset + count` exceeds `size()`.
    pub fn read_bytes(&self, offset: usize, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Writes `data` at `offset`.
    ///
    /// # Panics
    ///
    /// If `offset + data.len()` exceeds `size()`.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_bounds(offset, data.len());
        match self {
            Backend::OwnedExternal { region, .. } | Backend::UnownedExternal(region) => {
                region.write(offset, data)
            }
            Backend::Local(buffer) => {
                buffer.write(offset, data);
                Ok(())
            }
        }
    }

    #[inline]
    fn check_bounds(&self, offset: usize, count: usize) {
        let size = self.size();
        assert!(
            offset.checked_add(count).is_some_and(|end| end <= size),
            "access of {count} bytes at offset {offset} exceeds backend size {size}"
        );
    }
}
