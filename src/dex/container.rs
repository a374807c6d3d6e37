//! Abstraction over how DEX bytes are owned. The engine only ever borrows
//! `(pointer, length)` views through this trait; loading the bytes (from a
//! file, a byte array handed across an FFI boundary, or a memory map) is the
//! embedder's concern.

use std::ops::Deref;

/// A borrowed or owned byte buffer backing one DEX image.
pub trait DexContainer<'a>: AsRef<[u8]> + Deref<Target = [u8]> + 'a {
    fn data(&'a self) -> &'a [u8] {
        self.as_ref()
    }

    fn file_size(&'a self) -> usize {
        self.data().len()
    }
}

impl<'a> DexContainer<'a> for &'a [u8] {}
impl DexContainer<'_> for Vec<u8> {}

#[cfg(feature = "mmap")]
impl DexContainer<'_> for memmap2::Mmap {}

/// A plain borrowed view, for callers who already own the bytes elsewhere
/// (the common case when images arrive as `(pointer, length)` pairs).
pub struct InMemoryDexContainer<'a>(&'a [u8]);

impl<'a> InMemoryDexContainer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(data)
    }
}

impl<'a> Deref for InMemoryDexContainer<'a> {
    type Target = [u8];
    fn deref(&self) -> &'a Self::Target {
        self.0
    }
}

impl<'a> AsRef<[u8]> for InMemoryDexContainer<'a> {
    fn as_ref(&self) -> &'a [u8] {
        self.0
    }
}

impl<'a> DexContainer<'a> for InMemoryDexContainer<'a> {}
