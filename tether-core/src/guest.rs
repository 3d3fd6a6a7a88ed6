//! Seams between the bridge and a concrete guest engine.
//!
//! The engine layer (wasmtime in `tether-runtime`, an in-process mock in
//! [`crate::testing`]) implements these traits; everything else in this crate
//! is written against them.

use crate::error::{BridgeError, Result};
use crate::view::{TypedView, ViewCache};

/// A region of guest memory: pointer plus byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuestSlice {
    /// Offset within guest linear memory.
    pub ptr: u32,
    /// Length in bytes.
    pub len: u32,
}

impl GuestSlice {
    /// Create a new slice descriptor.
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    /// The empty slice, `(0, 0)`.
    pub const fn empty() -> Self {
        Self { ptr: 0, len: 0 }
    }

    /// Whether the slice holds no bytes.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte.
    pub fn end(&self) -> Result<u32> {
        offset(self.ptr, self.len)
    }
}

/// `ptr + delta` for a guest-supplied pointer, failing instead of wrapping.
pub fn offset(ptr: u32, delta: u32) -> Result<u32> {
    ptr.checked_add(delta).ok_or(BridgeError::OutOfBounds {
        offset: u64::from(ptr),
        size: u64::from(delta),
        buffer_len: u64::from(u32::MAX),
    })
}

/// Guest linear memory plus the guest's allocator exports.
pub trait GuestMemory {
    /// Borrow the current memory buffer together with the view cache tracking it.
    fn memory_and_views(&mut self) -> (&mut [u8], &mut ViewCache);

    /// Call the guest allocator (`__wbindgen_malloc`).
    fn malloc(&mut self, size: u32) -> Result<u32>;

    /// Call the guest reallocator (`__wbindgen_realloc`).
    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32) -> Result<u32>;

    /// Call the guest deallocator (`__wbindgen_free`).
    fn free(&mut self, ptr: u32, size: u32) -> Result<()>;

    /// Whether the guest exports a reallocator.
    fn supports_realloc(&self) -> bool {
        true
    }

    /// Byte view over the current buffer.
    fn bytes(&mut self) -> TypedView<'_, u8> {
        let (mem, views) = self.memory_and_views();
        views.bytes(mem)
    }

    /// 32-bit integer view over the current buffer.
    fn ints32(&mut self) -> TypedView<'_, i32> {
        let (mem, views) = self.memory_and_views();
        views.ints32(mem)
    }

    /// 32-bit float view over the current buffer.
    fn floats32(&mut self) -> TypedView<'_, f32> {
        let (mem, views) = self.memory_and_views();
        views.floats32(mem)
    }

    /// 64-bit float view over the current buffer.
    fn floats64(&mut self) -> TypedView<'_, f64> {
        let (mem, views) = self.memory_and_views();
        views.floats64(mem)
    }

    /// Write a `(ptr, len)` pair into a two-word return area, the way
    /// wasm-bindgen returns strings and vectors through a `retptr`.
    fn write_slice_return(&mut self, retptr: u32, slice: GuestSlice) -> Result<()> {
        let len_ptr = offset(retptr, 4)?;
        let mut ints = self.ints32();
        // Higher word first: if it fits, so does `retptr`.
        ints.set_at(len_ptr, slice.len as i32)?;
        ints.set_at(retptr, slice.ptr as i32)
    }

    /// Copy `data` into freshly allocated guest memory.
    fn copy_to_guest(&mut self, data: &[u8]) -> Result<GuestSlice> {
        if data.is_empty() {
            return Ok(GuestSlice::empty());
        }
        let len = u32::try_from(data.len()).map_err(|_| crate::error::BridgeError::GuestAlloc {
            requested: data.len() as u64,
            cause: "exceeds 32-bit address space".to_string(),
        })?;
        let ptr = self.malloc(len)?;
        self.bytes().write(ptr, data)?;
        Ok(GuestSlice::new(ptr, len))
    }

    /// Copy a guest byte range out to the host.
    fn copy_from_guest(&mut self, slice: GuestSlice) -> Result<Vec<u8>> {
        if slice.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.bytes().slice(slice.ptr, slice.len)?.to_vec())
    }
}

/// A single argument word passed to a guest trampoline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Word {
    /// 32-bit integer (also used for handles and pointers).
    I32(i32),
    /// 64-bit float.
    F64(f64),
}

impl From<u32> for Word {
    fn from(value: u32) -> Self {
        Self::I32(value as i32)
    }
}

impl From<i32> for Word {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<f64> for Word {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

/// Guest entry points used by closure adapters.
pub trait ClosureGuest {
    /// Invoke a trampoline export with the closure environment and arguments.
    fn invoke_trampoline(
        &mut self,
        trampoline: &str,
        env_ptr: u32,
        env_extra: u32,
        args: &[Word],
    ) -> Result<()>;

    /// Invoke the guest destructor registered at `destructor`.
    fn destroy_closure(&mut self, destructor: u32, env_ptr: u32, env_extra: u32) -> Result<()>;
}

impl<G: ClosureGuest + ?Sized> ClosureGuest for &mut G {
    fn invoke_trampoline(
        &mut self,
        trampoline: &str,
        env_ptr: u32,
        env_extra: u32,
        args: &[Word],
    ) -> Result<()> {
        (**self).invoke_trampoline(trampoline, env_ptr, env_extra, args)
    }

    fn destroy_closure(&mut self, destructor: u32, env_ptr: u32, env_extra: u32) -> Result<()> {
        (**self).destroy_closure(destructor, env_ptr, env_extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_slice_basics() {
        let slice = GuestSlice::new(100, 50);
        assert_eq!(slice.end().unwrap(), 150);
        assert_eq!(GuestSlice::new(u32::MAX, 2).end().unwrap_err().code(), "E201");
        assert!(!slice.is_empty());
        assert!(GuestSlice::empty().is_empty());
    }

    #[test]
    fn words_from_primitives() {
        assert_eq!(Word::from(132u32), Word::I32(132));
        assert_eq!(Word::from(u32::MAX), Word::I32(-1));
        assert_eq!(Word::from(0.5), Word::F64(0.5));
    }
}
