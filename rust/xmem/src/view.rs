//! Typed access to a backend's bytes.
//!
//! A [`View`] translates offset-based typed reads and writes into backend byte
//! operations and materializes nested structure, either embedded at an offset or
//! reached through a pointer. Nested views always get the backend kind the parent
//! backend propagates, so ownership is never inherited.
//!
//! Views cache nothing: the foreign process changes its memory on its own, and
//! every read goes back to it.

use xmem_common::{Result, error::Error};
use xmem_process::ProcessHandle;

use crate::{
    backend::Backend,
    codec::{self, Orient, Pointer, Primitive, PrimitiveType, Rect, Value, Xyz},
    shape::Shape,
};

#[derive(Debug, Clone)]
pub struct View {
    backend: Backend,
}

impl View {
    pub fn new(backend: Backend) -> View {
        View { backend }
    }

    /// A view of `size` bytes at `address` in `process`, without ownership.
    pub fn unowned(process: ProcessHandle, address: u64, size: usize) -> View {
        View::new(Backend::unowned(process, address, size))
    }

    /// A view over a local buffer.
    pub fn local(bytes: Vec<u8>) -> View {
        View::new(Backend::local(bytes))
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn into_backend(self) -> Backend {
        self.backend
    }

    pub fn address(&self) -> u64 {
        self.backend.address()
    }

    pub fn size(&self) -> usize {
        self.backend.size()
    }

    pub fn end_address(&self) -> u64 {
        self.backend.end_address()
    }

    pub fn is_owned(&self) -> bool {
        self.backend.is_owned()
    }

    pub fn read_bytes(&self, offset: usize, count: usize) -> Result<Vec<u8>> {
        self.backend.read_bytes(offset, count)
    }

    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.backend.read_into(offset, buf)
    }

    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.backend.write_bytes(offset, data)
    }

    /// Reads one `ty` at `offset`.
    ///
    /// # Panics
    ///
    /// If `offset + ty.width()` exceeds the view.
    pub fn read_primitive(&self, ty: PrimitiveType, offset: usize) -> Result<Value> {
        self.check_span(offset, ty.width());
        let bytes = self.backend.read_bytes(offset, ty.width())?;
        Ok(codec::decode(ty, &bytes))
    }

    pub fn write_primitive(&self, ty: PrimitiveType, value: &Value, offset: usize) -> Result<()> {
        self.check_span(offset, ty.width());
        self.backend.write_bytes(offset, &codec::encode(ty, value))
    }

    pub fn read_primitive_array(
        &self,
        ty: PrimitiveType,
        count: usize,
        offset: usize,
    ) -> Result<Vec<Value>> {
        let len = Self::array_len(ty, count);
        self.check_span(offset, len);
        let bytes = self.backend.read_bytes(offset, len)?;
        Ok(codec::decode_array(ty, &bytes, count))
    }

    pub fn write_primitive_array(
        &self,
        ty: PrimitiveType,
        values: &[Value],
        offset: usize,
    ) -> Result<()> {
        self.check_span(offset, Self::array_len(ty, values.len()));
        self.backend
            .write_bytes(offset, &codec::encode_array(ty, values))
    }

    pub fn read<T: Primitive>(&self, offset: usize) -> Result<T> {
        let width = T::TYPE.width();
        self.check_span(offset, width);
        let mut buf = [0u8; 16];
        let buf = &mut buf[..width];
        self.backend.read_into(offset, buf)?;
        Ok(T::decode_le(buf))
    }

    pub fn write<T: Primitive>(&self, offset: usize, value: T) -> Result<()> {
        let width = T::TYPE.width();
        self.check_span(offset, width);
        let mut buf = [0u8; 16];
        let buf = &mut buf[..width];
        value.encode_le(buf);
        self.backend.write_bytes(offset, buf)
    }

    pub fn read_array<T: Primitive>(&self, offset: usize, count: usize) -> Result<Vec<T>> {
        let width = T::TYPE.width();
        let len = Self::array_len(T::TYPE, count);
        self.check_span(offset, len);
        let bytes = self.backend.read_bytes(offset, len)?;
        Ok(bytes.chunks_exact(width).map(T::decode_le).collect())
    }

    pub fn write_array<T: Primitive>(&self, offset: usize, values: &[T]) -> Result<()> {
        let width = T::TYPE.width();
        let mut bytes = vec![0u8; Self::array_len(T::TYPE, values.len())];
        self.check_span(offset, bytes.len());
        for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(width)) {
            value.encode_le(chunk);
        }
        self.backend.write_bytes(offset, &bytes)
    }

    pub fn read_xyz(&self, offset: usize) -> Result<Xyz> {
        self.read(offset)
    }

    pub fn write_xyz(&self, offset: usize, value: Xyz) -> Result<()> {
        self.write(offset, value)
    }

    pub fn read_orient(&self, offset: usize) -> Result<Orient> {
        self.read(offset)
    }

    pub fn write_orient(&self, offset: usize, value: Orient) -> Result<()> {
        self.write(offset, value)
    }

    pub fn read_rect(&self, offset: usize) -> Result<Rect> {
        self.read(offset)
    }

    pub fn write_rect(&self, offset: usize, value: Rect) -> Result<()> {
        self.write(offset, value)
    }

    pub fn read_pointer(&self, offset: usize) -> Result<u64> {
        self.read::<Pointer>(offset).map(|p| p.0)
    }

    pub fn write_pointer(&self, offset: usize, address: u64) -> Result<()> {
        self.write(offset, Pointer(address))
    }

    /// Stores the address of `target` at `offset`.
    pub fn write_address(&self, offset: usize, target: &View) -> Result<()> {
        self.write_pointer(offset, target.address())
    }

    /// Reads an `int32`-backed enum.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` if the stored value is not a discriminant of `E`.
    pub fn read_enum<E: TryFrom<i32>>(&self, offset: usize) -> Result<E> {
        let raw = self.read::<i32>(offset)?;
        E::try_from(raw).map_err(|_| {
            Error::invalid_format(
                std::any::type_name::<E>(),
                format!("unknown discriminant {raw} at offset {offset}"),
            )
        })
    }

    pub fn write_enum<E: Into<i32>>(&self, offset: usize, value: E) -> Result<()> {
        self.write::<i32>(offset, value.into())
    }

    /// A view of `size` bytes embedded at `offset`.
    ///
    /// # Panics
    ///
    /// If the embedded range does not lie inside this view.
    pub fn view_at(&self, offset: usize, size: usize) -> Result<View> {
        self.check_span(offset, size);
        self.view_at_address(self.address() + offset as u64, size)
    }

    /// Follows the pointer stored at `offset` to a view of `size` bytes.
    ///
    /// The target is not touched; an unreadable target fails on first access.
    pub fn view_at_pointer(&self, offset: usize, size: usize) -> Result<View> {
        let address = self.read_pointer(offset)?;
        self.view_at_address(address, size)
    }

    /// A view of `size` bytes at an arbitrary `address` of the same process.
    pub fn view_at_address(&self, address: u64, size: usize) -> Result<View> {
        Ok(View::new(self.backend.propagate(address, size)?))
    }

    /// Materializes a shape embedded at `offset`.
    pub fn embedded<S: Shape>(&self, offset: usize) -> Result<S> {
        self.view_at(offset, S::SIZE).map(S::from_view)
    }

    /// Reads the pointer at `offset` and materializes the shape it points to.
    pub fn follow<S: Shape>(&self, offset: usize) -> Result<S> {
        self.view_at_pointer(offset, S::SIZE).map(S::from_view)
    }

    /// Like [`View::follow`], but a null pointer yields `None`.
    pub fn follow_nullable<S: Shape>(&self, offset: usize) -> Result<Option<S>> {
        match self.read_pointer(offset)? {
            0 => Ok(None),
            address => self.from_address(address).map(Some),
        }
    }

    /// Materializes a shape at an arbitrary `address` of the same process.
    pub fn from_address<S: Shape>(&self, address: u64) -> Result<S> {
        self.view_at_address(address, S::SIZE).map(S::from_view)
    }

    #[inline]
    fn check_span(&self, offset: usize, len: usize) {
        let size = self.size();
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= size),
            "{len} bytes at offset {offset} exceed view size {size}"
        );
    }

    #[inline]
    fn array_len(ty: PrimitiveType, count: usize) -> usize {
        ty.width()
            .checked_mul(count)
            .unwrap_or_else(|| panic!("{count} x {ty} overflows"))
    }
}
