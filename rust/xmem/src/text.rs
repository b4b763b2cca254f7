//! Text stored in foreign memory: NUL-terminated strings and MSVC `std::string`.

use xmem_common::{Result, error::Error, verify_data};

use crate::{
    allocator::{Allocation, Allocator},
    shape::Shape,
    view::View,
};

fn decode_utf8(element: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::invalid_format(element, e.to_string()))
}

impl View {
    /// Reads a NUL-terminated string starting at `offset`.
    ///
    /// At most `max_len` bytes are read, clamped to the end of the view; the
    /// string ends at the first NUL or at the end of what was read. Bytes are
    /// fetched one page of the target at a time and the read stops at the page
    /// holding the NUL, so a string ending just before unmapped memory reads
    /// fine.
    pub fn read_cstring(&self, offset: usize, max_len: usize) -> Result<String> {
        assert!(offset <= self.size(), "offset {offset} is past the view");
        let end = offset + max_len.min(self.size() - offset);
        let page = xmem_process::get_page_size() as u64;
        let mut bytes = Vec::new();
        let mut pos = offset;
        while pos < end {
            let address = self.address().wrapping_add(pos as u64);
            let chunk = ((page - address % page) as usize).min(end - pos);
            let start = bytes.len();
            bytes.resize(start + chunk, 0);
            self.read_into(pos, &mut bytes[start..])?;
            if let Some(nul) = bytes[start..].iter().position(|&b| b == 0) {
                bytes.truncate(start + nul);
                break;
            }
            pos += chunk;
        }
        decode_utf8("c string", bytes)
    }

    /// Writes `text` followed by a NUL at `offset`.
    ///
    /// # Panics
    ///
    /// If the text and its terminator do not fit in the view.
    pub fn write_cstring(&self, offset: usize, text: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.write_bytes(offset, &bytes)
    }
}

/// MSVC x64 `std::string`.
///
/// | offset | field                                     |
/// |--------|-------------------------------------------|
/// | 0      | 16-byte inline buffer, or heap pointer    |
/// | 16     | length (`u64`)                            |
/// | 24     | capacity (`u64`), inline while below 16   |
#[derive(Debug, Clone)]
pub struct CppString {
    view: View,
}

impl CppString {
    /// Longest text kept in the inline buffer (one byte stays for the NUL).
    pub const INLINE_CAPACITY: usize = 15;

    /// Longest heap text [`CppString::read`] accepts. A larger stored length is
    /// treated as corrupt rather than allocated.
    pub const MAX_LEN: u64 = 16 * 1024 * 1024;

    const LENGTH: usize = 16;
    const CAPACITY: usize = 24;

    pub fn len(&self) -> Result<u64> {
        self.view.read(Self::LENGTH)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn capacity(&self) -> Result<u64> {
        self.view.read(Self::CAPACITY)
    }

    pub fn is_inline(&self) -> Result<bool> {
        Ok(self.capacity()? <= Self::INLINE_CAPACITY as u64)
    }

    pub fn read(&self) -> Result<String> {
        let len = self.len()?;
        let capacity = self.capacity()?;
        if len > capacity {
            return Err(Error::invalid_format(
                "std::string",
                format!("length {len} exceeds capacity {capacity}"),
            ));
        }
        verify_data!(std_string_length, len <= Self::MAX_LEN);
        let len = len as usize;
        let bytes = if capacity <= Self::INLINE_CAPACITY as u64 {
            self.view.read_bytes(0, len)?
        } else {
            self.view.view_at_pointer(0, len)?.read_bytes(0, len)?
        };
        decode_utf8("std::string", bytes)
    }

    /// Stores `text` in the inline buffer.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `text` is longer than [`CppString::INLINE_CAPACITY`].
    pub fn write_inline(&self, text: &str) -> Result<()> {
        if text.len() > Self::INLINE_CAPACITY {
            return Err(Error::invalid_arg(
                "text",
                format!(
                    "{} bytes do not fit the inline buffer of {}",
                    text.len(),
                    Self::INLINE_CAPACITY
                ),
            ));
        }
        let mut buf = [0u8; 16];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        self.view.write_bytes(0, &buf)?;
        self.view.write(Self::LENGTH, text.len() as u64)?;
        self.view.write(Self::CAPACITY, Self::INLINE_CAPACITY as u64)
    }

    /// Stores `text`, placing it in a fresh allocation from `allocator` when it
    /// does not fit inline.
    ///
    /// The returned allocation, if any, now backs the string; the caller frees it
    /// once the foreign process no longer references it.
    pub fn write_with<A: Allocator + ?Sized>(
        &self,
        allocator: &mut A,
        text: &str,
    ) -> Result<Option<Allocation>> {
        if text.len() <= Self::INLINE_CAPACITY {
            self.write_inline(text)?;
            return Ok(None);
        }
        let allocation = allocator.allocate(text.len() + 1)?;
        if let Err(e) = self.write_heap(&allocation, text) {
            let address = allocation.address();
            if let Err(free_err) = allocator.free(allocation) {
                log::warn!("failed to release string buffer at {address:#x}: {free_err}");
            }
            return Err(e);
        }
        Ok(Some(allocation))
    }

    fn write_heap(&self, buffer: &View, text: &str) -> Result<()> {
        buffer.write_cstring(0, text)?;
        self.view.write_address(0, buffer)?;
        self.view.write(Self::LENGTH, text.len() as u64)?;
        self.view.write(Self::CAPACITY, text.len() as u64)
    }
}

impl Shape for CppString {
    const SIZE: usize = 32;

    fn from_view(view: View) -> Self {
        CppString { view }
    }

    fn view(&self) -> &View {
        &self.view
    }

    fn into_view(self) -> View {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use xmem_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_cstring_round_trip() {
        let view = View::local(vec![0xaa; 16]);
        view.write_cstring(2, "hello").unwrap();
        assert_eq!(view.read_cstring(2, 16).unwrap(), "hello");
        assert_eq!(view.read_bytes(7, 2).unwrap(), [0, 0xaa]);
    }

    #[test]
    fn test_cstring_max_len() {
        let view = View::local(b"abcdef\0\0".to_vec());
        assert_eq!(view.read_cstring(0, 3).unwrap(), "abc");
        assert_eq!(view.read_cstring(4, 100).unwrap(), "ef");
        assert_eq!(view.read_cstring(8, 100).unwrap(), "");
    }

    #[test]
    fn test_cstring_invalid_utf8() {
        let view = View::local(vec![0xff, 0xfe, 0]);
        assert!(view.read_cstring(0, 3).is_err());
    }

    #[test]
    #[should_panic]
    fn test_cstring_too_long_panics() {
        let view = View::local(vec![0; 4]);
        let _ = view.write_cstring(0, "four");
    }

    #[test]
    fn test_cpp_string_inline() {
        let s = CppString::from_view(View::local(vec![0; CppString::SIZE]));
        s.write_inline("test12345").unwrap();
        assert_eq!(s.len().unwrap(), 9);
        assert!(s.is_inline().unwrap());
        assert_eq!(s.read().unwrap(), "test12345");

        s.write_inline("").unwrap();
        assert!(s.is_empty().unwrap());
        assert_eq!(s.read().unwrap(), "");
    }

    #[test]
    fn test_cpp_string_inline_limit() {
        let s = CppString::from_view(View::local(vec![0; CppString::SIZE]));
        s.write_inline("exactly15bytes!").unwrap();
        assert_eq!(s.read().unwrap(), "exactly15bytes!");
        assert!(s.write_inline("sixteen bytes!!!").is_err());
    }

    #[test]
    fn test_cpp_string_length_bound() {
        let s = CppString::from_view(View::local(vec![0; CppString::SIZE]));
        s.view().write::<u64>(16, 1 << 40).unwrap();
        s.view().write::<u64>(24, 1 << 41).unwrap();
        let err = s.read().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidFormat { .. }));

        s.view().write::<u64>(16, u64::MAX - 8).unwrap();
        s.view().write::<u64>(24, u64::MAX).unwrap();
        assert!(s.read().is_err());
    }

    #[test]
    fn test_cstring_spans_pages() {
        let page = xmem_process::get_page_size();
        let mut bytes = vec![b'x'; page + 8];
        bytes[page + 3] = 0;
        let view = View::local(bytes);
        let text = view.read_cstring(2, page + 6).unwrap();
        assert_eq!(text.len(), page + 1);
        assert!(text.bytes().all(|b| b == b'x'));
    }

    #[test]
    fn test_cpp_string_corrupt_length() {
        let s = CppString::from_view(View::local(vec![0; CppString::SIZE]));
        s.view().write::<u64>(16, 40).unwrap();
        s.view().write::<u64>(24, 15).unwrap();
        assert!(s.read().is_err());
    }
}
