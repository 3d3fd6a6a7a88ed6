//! Typed view cache over guest linear memory.
//!
//! Guest memory can be replaced or resized by any call into the guest, so a
//! view is only valid while the buffer it was built over keeps the same base
//! address and length. Views are always built over the buffer passed in and
//! never outlive the borrow. [`ViewCache`] records the last buffer identity
//! seen per access width and counts hits and rebuilds against it.

use crate::error::{BridgeError, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::marker::PhantomData;

/// An element type that can be read from and written to guest memory.
pub trait Element: Copy {
    /// Width in bytes.
    const WIDTH: usize;
    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Decode from exactly `WIDTH` little-endian bytes.
    fn read(bytes: &[u8]) -> Self;
    /// Encode into exactly `WIDTH` little-endian bytes.
    fn write(self, bytes: &mut [u8]);
}

impl Element for u8 {
    const WIDTH: usize = 1;
    const NAME: &'static str = "u8";

    fn read(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write(self, bytes: &mut [u8]) {
        bytes[0] = self;
    }
}

impl Element for i32 {
    const WIDTH: usize = 4;
    const NAME: &'static str = "i32";

    fn read(bytes: &[u8]) -> Self {
        LittleEndian::read_i32(bytes)
    }

    fn write(self, bytes: &mut [u8]) {
        LittleEndian::write_i32(bytes, self);
    }
}

impl Element for f32 {
    const WIDTH: usize = 4;
    const NAME: &'static str = "f32";

    fn read(bytes: &[u8]) -> Self {
        LittleEndian::read_f32(bytes)
    }

    fn write(self, bytes: &mut [u8]) {
        LittleEndian::write_f32(bytes, self);
    }
}

impl Element for f64 {
    const WIDTH: usize = 8;
    const NAME: &'static str = "f64";

    fn read(bytes: &[u8]) -> Self {
        LittleEndian::read_f64(bytes)
    }

    fn write(self, bytes: &mut [u8]) {
        LittleEndian::write_f64(bytes, self);
    }
}

/// Identity of the buffer a view was built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BufferIdentity {
    base: usize,
    len: usize,
}

impl BufferIdentity {
    fn of(mem: &[u8]) -> Self {
        Self {
            base: mem.as_ptr() as usize,
            len: mem.len(),
        }
    }
}

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewStats {
    /// Accesses served by a still-valid view.
    pub hits: u64,
    /// Views rebuilt after invalidation or buffer change.
    pub rebuilds: u64,
    /// Explicit invalidations.
    pub invalidations: u64,
}

/// Per-width record of the buffer identity views were last built over.
///
/// This is bookkeeping only: every accessor builds its [`TypedView`] from the
/// `mem` it is given, and the recorded identity decides whether the access
/// counts as a hit or a rebuild in [`ViewStats`].
#[derive(Debug, Default)]
pub struct ViewCache {
    u8_view: Option<BufferIdentity>,
    i32_view: Option<BufferIdentity>,
    f32_view: Option<BufferIdentity>,
    f64_view: Option<BufferIdentity>,
    stats: ViewStats,
}

impl ViewCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte view over `mem`.
    pub fn bytes<'m>(&mut self, mem: &'m mut [u8]) -> TypedView<'m, u8> {
        let stats = &mut self.stats;
        refresh(&mut self.u8_view, stats, mem, "u8");
        TypedView::new(mem)
    }

    /// 32-bit integer view over `mem`.
    pub fn ints32<'m>(&mut self, mem: &'m mut [u8]) -> TypedView<'m, i32> {
        let stats = &mut self.stats;
        refresh(&mut self.i32_view, stats, mem, "i32");
        TypedView::new(mem)
    }

    /// 32-bit float view over `mem`.
    pub fn floats32<'m>(&mut self, mem: &'m mut [u8]) -> TypedView<'m, f32> {
        let stats = &mut self.stats;
        refresh(&mut self.f32_view, stats, mem, "f32");
        TypedView::new(mem)
    }

    /// 64-bit float view over `mem`.
    pub fn floats64<'m>(&mut self, mem: &'m mut [u8]) -> TypedView<'m, f64> {
        let stats = &mut self.stats;
        refresh(&mut self.f64_view, stats, mem, "f64");
        TypedView::new(mem)
    }

    /// Forget every recorded identity so the next access per width counts as a rebuild.
    pub fn invalidate(&mut self) {
        self.u8_view = None;
        self.i32_view = None;
        self.f32_view = None;
        self.f64_view = None;
        self.stats.invalidations += 1;
        tracing::trace!("view cache invalidated");
    }

    /// Whether any width has a recorded identity.
    pub fn is_populated(&self) -> bool {
        self.u8_view.is_some()
            || self.i32_view.is_some()
            || self.f32_view.is_some()
            || self.f64_view.is_some()
    }

    /// Cache counters.
    pub fn stats(&self) -> ViewStats {
        self.stats
    }
}

fn refresh(slot: &mut Option<BufferIdentity>, stats: &mut ViewStats, mem: &[u8], width: &str) {
    let current = BufferIdentity::of(mem);
    // A zero-length buffer is what a detached buffer looks like after growth.
    if *slot == Some(current) && current.len != 0 {
        stats.hits += 1;
        return;
    }
    tracing::trace!(width, len = current.len, "rebuilding guest memory view");
    stats.rebuilds += 1;
    *slot = Some(current);
}

/// A view over guest memory addressed in units of `E`.
pub struct TypedView<'m, E> {
    mem: &'m mut [u8],
    _element: PhantomData<E>,
}

impl<'m, E: Element> TypedView<'m, E> {
    fn new(mem: &'m mut [u8]) -> Self {
        Self {
            mem,
            _element: PhantomData,
        }
    }

    /// Number of whole elements in the buffer.
    pub fn len(&self) -> usize {
        self.mem.len() / E::WIDTH
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the underlying buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.mem.len()
    }

    /// Read the element at `index`.
    pub fn get(&self, index: usize) -> Result<E> {
        let range = self.element_range(index)?;
        Ok(E::read(&self.mem[range]))
    }

    /// Write the element at `index`.
    pub fn set(&mut self, index: usize, value: E) -> Result<()> {
        let range = self.element_range(index)?;
        value.write(&mut self.mem[range]);
        Ok(())
    }

    /// Read the element at byte pointer `ptr`, which must be aligned to the width.
    pub fn get_at(&self, ptr: u32) -> Result<E> {
        self.get(aligned_index::<E>(ptr)?)
    }

    /// Write the element at byte pointer `ptr`, which must be aligned to the width.
    pub fn set_at(&mut self, ptr: u32, value: E) -> Result<()> {
        self.set(aligned_index::<E>(ptr)?, value)
    }

    /// Copy `len` elements starting at byte pointer `ptr` out of guest memory.
    pub fn array(&self, ptr: u32, len: u32) -> Result<Vec<E>> {
        aligned_index::<E>(ptr)?;
        let bytes = self.byte_range(ptr as usize, len as usize * E::WIDTH)?;
        Ok(self.mem[bytes].chunks_exact(E::WIDTH).map(E::read).collect())
    }

    fn element_range(&self, index: usize) -> Result<std::ops::Range<usize>> {
        self.byte_range(index * E::WIDTH, E::WIDTH)
    }

    fn byte_range(&self, offset: usize, size: usize) -> Result<std::ops::Range<usize>> {
        let end = offset.checked_add(size);
        match end {
            Some(end) if end <= self.mem.len() => Ok(offset..end),
            _ => Err(BridgeError::OutOfBounds {
                offset: offset as u64,
                size: size as u64,
                buffer_len: self.mem.len() as u64,
            }),
        }
    }
}

impl<'m> TypedView<'m, u8> {
    /// Borrow `len` bytes starting at `ptr`.
    pub fn slice(&self, ptr: u32, len: u32) -> Result<&[u8]> {
        let range = self.byte_range(ptr as usize, len as usize)?;
        Ok(&self.mem[range])
    }

    /// Mutably borrow `len` bytes starting at `ptr`.
    pub fn slice_mut(&mut self, ptr: u32, len: u32) -> Result<&mut [u8]> {
        let range = self.byte_range(ptr as usize, len as usize)?;
        Ok(&mut self.mem[range])
    }

    /// Copy `data` into guest memory at `ptr`.
    pub fn write(&mut self, ptr: u32, data: &[u8]) -> Result<()> {
        self.slice_mut(ptr, data.len() as u32)?.copy_from_slice(data);
        Ok(())
    }
}

fn aligned_index<E: Element>(ptr: u32) -> Result<usize> {
    if ptr as usize % E::WIDTH != 0 {
        return Err(BridgeError::Misaligned {
            ptr,
            width: E::WIDTH,
        });
    }
    Ok(ptr as usize / E::WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_hit_while_buffer_unchanged() {
        let mut mem = vec![0u8; 64];
        let mut cache = ViewCache::new();

        cache.bytes(&mut mem);
        cache.bytes(&mut mem);
        cache.ints32(&mut mem);

        let stats = cache.stats();
        assert_eq!(stats.rebuilds, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn replaced_buffer_rebuilds_view() {
        let mut cache = ViewCache::new();
        let mut small = vec![0u8; 16];
        assert_eq!(cache.bytes(&mut small).len(), 16);

        let mut grown = vec![0u8; 64];
        assert_eq!(cache.bytes(&mut grown).len(), 64);
        assert_eq!(cache.stats().rebuilds, 2);
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let mut mem = vec![0u8; 32];
        let mut cache = ViewCache::new();
        cache.floats64(&mut mem);
        assert!(cache.is_populated());

        cache.invalidate();
        assert!(!cache.is_populated());
        cache.floats64(&mut mem);
        assert_eq!(cache.stats().rebuilds, 2);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn typed_access_is_little_endian() {
        let mut mem = vec![0u8; 32];
        let mut cache = ViewCache::new();

        cache.ints32(&mut mem).set_at(4, -2).unwrap();
        assert_eq!(&mem[4..8], &(-2i32).to_le_bytes());

        cache.floats64(&mut mem).set(2, 1.5).unwrap();
        assert_eq!(cache.floats64(&mut mem).get_at(16).unwrap(), 1.5);
        assert_eq!(cache.ints32(&mut mem).len(), 8);
    }

    #[test]
    fn float32_arrays_copy_out() {
        let mut mem = vec![0u8; 16];
        let mut cache = ViewCache::new();
        {
            let mut view = cache.floats32(&mut mem);
            view.set(1, 0.25).unwrap();
            view.set(2, -4.0).unwrap();
        }
        let values = cache.floats32(&mut mem).array(4, 2).unwrap();
        assert_eq!(values, vec![0.25, -4.0]);
    }

    #[test]
    fn out_of_bounds_and_misaligned() {
        let mut mem = vec![0u8; 8];
        let mut cache = ViewCache::new();
        assert!(matches!(
            cache.ints32(&mut mem).get(2),
            Err(BridgeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            cache.ints32(&mut mem).get_at(3),
            Err(BridgeError::Misaligned { ptr: 3, width: 4 })
        ));
        assert!(cache.bytes(&mut mem).slice(6, 4).is_err());
    }

    #[test]
    fn byte_slices_read_and_write() {
        let mut mem = vec![0u8; 8];
        let mut cache = ViewCache::new();
        cache.bytes(&mut mem).write(2, b"abc").unwrap();
        assert_eq!(cache.bytes(&mut mem).slice(2, 3).unwrap(), b"abc");
    }
}
