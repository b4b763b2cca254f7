//! Typed views and allocators over the memory of another process.
//!
//! A [`View`] is a window of bytes in some address space, backed by a [`Backend`]:
//! the memory of a foreign process, owned or not, or a local buffer. Views read and
//! write primitives ([`codec`]), follow pointers, and materialize fixed layouts
//! ([`Shape`], [`memory_shape!`]). Allocators ([`allocator`]) reserve foreign
//! memory and hand it out as owned [`Allocation`]s.
//!
//! Every read and write is a single transfer into or out of the target process.
//! Nothing is cached, and nothing synchronizes with the target's own threads.

pub mod allocator;
pub mod backend;
pub mod codec;
pub mod list;
pub mod shape;
pub mod text;
pub mod view;

pub use allocator::{
    Allocation, Allocator, AllocatorId, CaveAllocator, CaveRegion, ProcessAllocator,
};
pub use backend::{Backend, BackendKind};
pub use codec::{Char, Orient, Pointer, Primitive, PrimitiveType, Rect, Value, Xyz};
pub use list::StdList;
pub use shape::{Field, Shape};
pub use text::CppString;
pub use view::View;
pub use xmem_common::{
    Result,
    error::{Error, ErrorKind},
};
pub use xmem_process::ProcessHandle;

#[doc(hidden)]
pub use paste as __paste;
