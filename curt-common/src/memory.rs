//! General purpose data structures
//!
//! The main citizen here is `Array<I, T>`: a non-growable vector with
//! strongly-typed indexing. The first template argument requires to specify
//! the type that will be used for indexing, which prevents us from
//! accidentally using an index of the wrong type. Bounds checking can be
//! disabled for release builds.

use crate::config;
use std::{
    convert::TryFrom,
    marker::PhantomData,
    mem::size_of,
    ops::{Deref, DerefMut, Index, IndexMut, Range},
};

/// Trait for types that can be used as an array index.
pub trait Offset {
    fn as_offset(&self) -> usize;
}

impl Offset for usize {
    fn as_offset(&self) -> usize {
        *self
    }
}

impl Offset for u64 {
    fn as_offset(&self) -> usize {
        requires!(usize::try_from(*self).is_ok());
        *self as usize
    }
}

impl Offset for i32 {
    fn as_offset(&self) -> usize {
        requires!(usize::try_from(*self).is_ok());
        *self as usize
    }
}

/// A trait for objects that can report their memory usage on the heap
pub trait HeapSpace {
    /// The number of bytes allocated on the heap that this owns.
    fn heap_space(&self) -> usize;
}

/// Inline values own no heap memory.
macro_rules! impl_heap_space_for_inline {
    ($($type:ty),*) => {
        $(
            impl HeapSpace for $type {
                fn heap_space(&self) -> usize {
                    0
                }
            }
        )*
    };
}

impl_heap_space_for_inline!(bool, u32, u64, i32, usize);

impl<T: HeapSpace> HeapSpace for Vec<T> {
    fn heap_space(&self) -> usize {
        self.capacity() * size_of::<T>()
            + self.iter().fold(0, |sum, item| sum + item.heap_space())
    }
}

/// Check if an offset is contained in a half-open range.
/// # Panics
/// Panic if bounds checking is enabled and the index is out of the given bounds.
pub fn assert_in_bounds(bounds: Range<usize>, offset: usize) {
    if config::ENABLE_BOUNDS_CHECKING {
        assert!(
            bounds.contains(&offset),
            "array index out of bounds: {} (range is {:?})",
            offset,
            bounds,
        );
    }
}

/// A contiguous non-growable array type with strongly-typed indexing.
///
/// An `Array` can be used as a fixed size map or set data structure.
/// The maximum index must be set at construction time, which will allocate
/// an area of memory of that size. As a result, this can be quite
/// memory-consuming for sparse maps or sets, but it is as efficient as it
/// gets for fast lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Array<I: Offset, T> {
    /// The vector of elements
    data: Vec<T>,
    /// Zero-sized field to appease the compiler, since `I` is not used in any other field
    phantom: PhantomData<I>,
}

impl<I: Offset, T: Clone> Array<I, T> {
    /// Create a new array of size `size` with all elements set to `value`.
    pub fn new(value: T, size: usize) -> Array<I, T> {
        Array {
            data: vec![value; size],
            phantom: PhantomData,
        }
    }
}

impl<I: Offset, T> Array<I, T> {
    /// Create a new array by taking ownership of a `Vec`.
    pub fn from(data: Vec<T>) -> Array<I, T> {
        Array {
            data,
            phantom: PhantomData,
        }
    }
    /// Returns the size of the array.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl<I: Offset, T> Default for Array<I, T> {
    fn default() -> Array<I, T> {
        Array {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }
}

impl<I: Offset, T> Deref for Array<I, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<I: Offset, T> DerefMut for Array<I, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<I: Offset, T> Index<I> for Array<I, T> {
    type Output = T;
    fn index(&self, key: I) -> &T {
        assert_in_bounds(0..self.size(), key.as_offset());
        unsafe { self.data.get_unchecked(key.as_offset()) }
    }
}

impl<I: Offset, T> IndexMut<I> for Array<I, T> {
    fn index_mut(&mut self, key: I) -> &mut T {
        assert_in_bounds(0..self.size(), key.as_offset());
        unsafe { self.data.get_unchecked_mut(key.as_offset()) }
    }
}

impl<I: Offset, T: HeapSpace> HeapSpace for Array<I, T> {
    fn heap_space(&self) -> usize {
        self.data.heap_space()
    }
}

/// Convert bytes to  megabytes for readability.
pub fn format_memory_usage(bytes: usize) -> String {
    format!("{:12}", bytes >> 20) // MB
}
