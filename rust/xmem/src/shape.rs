//! Static layouts of foreign objects.
//!
//! A [`Shape`] declares a total size and binds to one [`View`]; its fields live at
//! fixed offsets inside that view. Fields are either declared one by one with
//! [`Field`] or all at once with [`memory_shape!`](crate::memory_shape).

use std::marker::PhantomData;

use xmem_common::Result;

use crate::{codec::Primitive, view::View};

/// A fixed-size foreign object layout bound to a view.
///
/// Several shapes may describe the same bytes; nothing checks that the
/// interpretations agree.
pub trait Shape: Sized {
    /// Size of the object in bytes.
    const SIZE: usize;

    fn from_view(view: View) -> Self;

    fn view(&self) -> &View;

    fn into_view(self) -> View;

    fn address(&self) -> u64 {
        self.view().address()
    }
}

/// A primitive of type `T` at a fixed offset.
pub struct Field<T> {
    offset: usize,
    _t: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("offset", &self.offset)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Primitive> Field<T> {
    pub const fn new(offset: usize) -> Field<T> {
        Field {
            offset,
            _t: PhantomData,
        }
    }

    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Offset one past the last byte of the field.
    pub const fn end(&self) -> usize {
        self.offset + T::TYPE.width()
    }

    pub fn read(&self, view: &View) -> Result<T> {
        view.read(self.offset)
    }

    pub fn write(&self, view: &View, value: T) -> Result<()> {
        view.write(self.offset, value)
    }
}

/// Declares a [`Shape`] with primitive fields.
///
/// ```
/// xmem::memory_shape! {
///     /// A 2D sprite record.
///     pub struct Sprite[24] {
///         id @ 0: u32,
///         visible @ 4: bool,
///         bounds @ 8: xmem::codec::Rect,
///     }
/// }
///
/// use xmem::{Shape, View};
///
/// let sprite = Sprite::from_view(View::local(vec![0; Sprite::SIZE]));
/// sprite.set_id(7).unwrap();
/// assert_eq!(sprite.id().unwrap(), 7);
/// assert!(!sprite.visible().unwrap());
/// ```
///
/// Each `name @ offset: Type` generates `name()` and `set_name()`.
#[macro_export]
macro_rules! memory_shape {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident [$size:expr] {
            $(
                $(#[$fmeta:meta])*
                $field:ident @ $offset:literal : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            view: $crate::view::View,
        }

        impl $crate::shape::Shape for $name {
            const SIZE: usize = $size;

            fn from_view(view: $crate::view::View) -> Self {
                $name { view }
            }

            fn view(&self) -> &$crate::view::View {
                &self.view
            }

            fn into_view(self) -> $crate::view::View {
                self.view
            }
        }

        impl $name {
            $(
                $(#[$fmeta])*
                pub fn $field(&self) -> $crate::Result<$ty> {
                    self.view.read::<$ty>($offset)
                }

                $crate::__paste::paste! {
                    pub fn [<set_ $field>](&self, value: $ty) -> $crate::Result<()> {
                        self.view.write::<$ty>($offset, value)
                    }
                }
            )*
        }
    };
}
