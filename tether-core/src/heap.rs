//! Host object table.
//!
//! The guest cannot hold host values directly, so it holds integer handles into
//! this table instead. The layout follows the wasm-bindgen heap convention:
//!
//! ```text
//! 0 ........... 127 | 128        129   130   131   | 132 ...
//! borrowed stack    | undefined  null  true  false | dynamic slots
//! ```
//!
//! Vacant dynamic slots form a singly linked free list: each vacant slot stores
//! the index of the next vacant one, and the list ends at the table length.
//! Handles below [`HEAP_RESERVED`] are never recycled.

use crate::error::{BridgeError, Result};

/// Number of slots reserved for borrowed (stack-scoped) objects.
pub const HEAP_STACK_SLOTS: u32 = 128;

/// Handle of the `undefined` sentinel.
pub const UNDEFINED: u32 = HEAP_STACK_SLOTS;
/// Handle of the `null` sentinel.
pub const NULL: u32 = HEAP_STACK_SLOTS + 1;
/// Handle of the `true` sentinel.
pub const TRUE: u32 = HEAP_STACK_SLOTS + 2;
/// Handle of the `false` sentinel.
pub const FALSE: u32 = HEAP_STACK_SLOTS + 3;

/// First handle that can be allocated and released.
pub const HEAP_RESERVED: u32 = HEAP_STACK_SLOTS + 4;

/// Values that can fill the permanent sentinel slots.
pub trait SentinelValues: Sized {
    /// The absent value.
    fn undefined() -> Self;
    /// The null value.
    fn null() -> Self;
    /// A boolean value.
    fn boolean(value: bool) -> Self;
}

#[derive(Debug)]
enum Slot<T> {
    Occupied(T),
    Vacant { next: u32 },
}

/// Slot table mapping integer handles to host values.
#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    next_free: u32,
    stack_pointer: u32,
    live: usize,
}

impl<T: SentinelValues> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SentinelValues> SlotTable<T> {
    /// Create a table holding only the stack region and the four sentinels.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(HEAP_RESERVED as usize * 2);
        slots.extend((0..HEAP_STACK_SLOTS).map(|_| Slot::Occupied(T::undefined())));
        slots.push(Slot::Occupied(T::undefined()));
        slots.push(Slot::Occupied(T::null()));
        slots.push(Slot::Occupied(T::boolean(true)));
        slots.push(Slot::Occupied(T::boolean(false)));

        Self {
            slots,
            next_free: HEAP_RESERVED,
            stack_pointer: HEAP_STACK_SLOTS,
            live: 0,
        }
    }

    /// Store `value` and return its handle.
    ///
    /// Reuses the free-list head when one exists, otherwise appends.
    pub fn allocate(&mut self, value: T) -> u32 {
        if self.next_free as usize == self.slots.len() {
            self.slots.push(Slot::Vacant {
                next: self.next_free + 1,
            });
        }

        let handle = self.next_free;
        let slot = &mut self.slots[handle as usize];
        self.next_free = match slot {
            Slot::Vacant { next } => *next,
            // The free list only ever points at vacant slots.
            Slot::Occupied(_) => unreachable!("free list head {handle} is occupied"),
        };
        *slot = Slot::Occupied(value);
        self.live += 1;

        tracing::trace!(handle, next_free = self.next_free, "heap slot allocated");
        handle
    }

    /// Borrow the value behind `handle`.
    pub fn resolve(&self, handle: u32) -> Result<&T> {
        match self.slots.get(handle as usize) {
            Some(Slot::Occupied(value)) => Ok(value),
            Some(Slot::Vacant { .. }) => Err(BridgeError::InvalidHandle {
                handle,
                cause: "slot has been released".to_string(),
            }),
            None => Err(BridgeError::InvalidHandle {
                handle,
                cause: format!("beyond table length {}", self.slots.len()),
            }),
        }
    }

    /// Retire `handle`, pushing its slot onto the free list.
    ///
    /// Handles below [`HEAP_RESERVED`] are permanent and ignored.
    pub fn release(&mut self, handle: u32) -> Result<()> {
        self.vacate(handle).map(|_| ())
    }

    /// Return the value behind `handle` and retire the handle.
    pub fn take(&mut self, handle: u32) -> Result<T>
    where
        T: Clone,
    {
        if handle < HEAP_RESERVED {
            return self.resolve(handle).cloned();
        }
        match self.vacate(handle)? {
            Some(value) => Ok(value),
            None => unreachable!("dynamic handle {handle} vacated without a value"),
        }
    }

    /// Allocate a second handle to the value behind `handle`.
    pub fn clone_ref(&mut self, handle: u32) -> Result<u32>
    where
        T: Clone,
    {
        let value = self.resolve(handle)?.clone();
        Ok(self.allocate(value))
    }

    /// Place a borrowed value on the stack region for the duration of a call.
    pub fn borrow(&mut self, value: T) -> Result<u32> {
        if self.stack_pointer <= 1 {
            return Err(BridgeError::StackExhausted {
                depth: HEAP_STACK_SLOTS - self.stack_pointer,
            });
        }
        self.stack_pointer -= 1;
        self.slots[self.stack_pointer as usize] = Slot::Occupied(value);
        Ok(self.stack_pointer)
    }

    /// Pop the most recently borrowed value, restoring the slot to undefined.
    pub fn unborrow(&mut self) -> Result<()> {
        if self.stack_pointer >= HEAP_STACK_SLOTS {
            return Err(BridgeError::StackUnderflow);
        }
        self.slots[self.stack_pointer as usize] = Slot::Occupied(T::undefined());
        self.stack_pointer += 1;
        Ok(())
    }

    /// Number of borrowed values currently on the stack.
    pub fn borrowed_depth(&self) -> u32 {
        HEAP_STACK_SLOTS - self.stack_pointer
    }

    /// Number of live dynamic handles.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total number of slots, reserved ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no dynamic handle has ever been allocated.
    pub fn is_empty(&self) -> bool {
        self.slots.len() == HEAP_RESERVED as usize
    }

    /// Number of vacant dynamic slots waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.slots.len() - HEAP_RESERVED as usize - self.live
    }

    /// Head of the free list.
    pub fn next_free(&self) -> u32 {
        self.next_free
    }

    fn vacate(&mut self, handle: u32) -> Result<Option<T>> {
        if handle < HEAP_RESERVED {
            return Ok(None);
        }
        let next = self.next_free;
        let slot = self
            .slots
            .get_mut(handle as usize)
            .ok_or_else(|| BridgeError::InvalidHandle {
                handle,
                cause: "beyond table length".to_string(),
            })?;

        match std::mem::replace(slot, Slot::Vacant { next }) {
            Slot::Occupied(value) => {
                self.next_free = handle;
                self.live -= 1;
                tracing::trace!(handle, "heap slot released");
                Ok(Some(value))
            }
            vacant @ Slot::Vacant { .. } => {
                *slot = vacant;
                Err(BridgeError::DoubleRelease { handle })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostValue;

    fn table() -> SlotTable<HostValue> {
        SlotTable::new()
    }

    #[test]
    fn sentinels_are_preloaded() {
        let heap = table();
        assert!(matches!(heap.resolve(UNDEFINED), Ok(HostValue::Undefined)));
        assert!(matches!(heap.resolve(NULL), Ok(HostValue::Null)));
        assert!(matches!(heap.resolve(TRUE), Ok(HostValue::Bool(true))));
        assert!(matches!(heap.resolve(FALSE), Ok(HostValue::Bool(false))));
        assert_eq!(heap.len(), HEAP_RESERVED as usize);
        assert!(heap.is_empty());
    }

    #[test]
    fn first_allocation_is_first_dynamic_slot() {
        let mut heap = table();
        assert_eq!(heap.allocate("a".into()), 132);
        assert_eq!(heap.allocate("b".into()), 133);
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn released_handle_is_reused() {
        let mut heap = table();
        let a = heap.allocate("A".into());
        heap.release(a).unwrap();
        let b = heap.allocate("B".into());
        assert_eq!(a, b);
        assert_eq!(heap.resolve(b).unwrap().as_str(), Some("B"));
    }

    #[test]
    fn free_list_is_lifo_and_exhausted_before_growth() {
        let mut heap = table();
        let handles: Vec<u32> = (0..4u8).map(|i| heap.allocate(f64::from(i).into())).collect();
        heap.release(handles[1]).unwrap();
        heap.release(handles[3]).unwrap();
        let len = heap.len();

        assert_eq!(heap.allocate(HostValue::Null), handles[3]);
        assert_eq!(heap.allocate(HostValue::Null), handles[1]);
        assert_eq!(heap.len(), len);
        assert_eq!(heap.allocate(HostValue::Null), len as u32);
    }

    #[test]
    fn sentinel_release_is_noop() {
        let mut heap = table();
        heap.release(NULL).unwrap();
        heap.release(5).unwrap();
        assert!(matches!(heap.resolve(NULL), Ok(HostValue::Null)));
        assert_eq!(heap.allocate(HostValue::Undefined), HEAP_RESERVED);
    }

    #[test]
    fn take_of_sentinel_keeps_it() {
        let mut heap = table();
        assert!(matches!(heap.take(TRUE), Ok(HostValue::Bool(true))));
        assert!(matches!(heap.resolve(TRUE), Ok(HostValue::Bool(true))));
    }

    #[test]
    fn take_retires_handle() {
        let mut heap = table();
        let h = heap.allocate(3.0.into());
        assert_eq!(heap.take(h).unwrap().as_number(), Some(3.0));
        assert!(matches!(
            heap.resolve(h),
            Err(BridgeError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn double_release_is_rejected_without_corruption() {
        let mut heap = table();
        let a = heap.allocate("a".into());
        let b = heap.allocate("b".into());
        heap.release(a).unwrap();
        let head = heap.next_free();

        assert!(matches!(
            heap.release(a),
            Err(BridgeError::DoubleRelease { handle }) if handle == a
        ));
        assert_eq!(heap.next_free(), head);
        assert_eq!(heap.resolve(b).unwrap().as_str(), Some("b"));

        let c = heap.allocate("c".into());
        let d = heap.allocate("d".into());
        assert_eq!(c, a);
        assert_ne!(d, a);
        assert_ne!(d, b);
    }

    #[test]
    fn unknown_handles_fail() {
        let mut heap = table();
        assert!(heap.resolve(10_000).is_err());
        assert!(heap.release(10_000).is_err());
    }

    #[test]
    fn clone_ref_shares_value() {
        let mut heap = table();
        let a = heap.allocate("shared".into());
        let b = heap.clone_ref(a).unwrap();
        assert_ne!(a, b);
        heap.release(a).unwrap();
        assert_eq!(heap.resolve(b).unwrap().as_str(), Some("shared"));
    }

    #[test]
    fn borrowed_stack_push_pop() {
        let mut heap = table();
        let first = heap.borrow("x".into()).unwrap();
        let second = heap.borrow("y".into()).unwrap();
        assert_eq!(first, 127);
        assert_eq!(second, 126);
        assert_eq!(heap.borrowed_depth(), 2);

        heap.unborrow().unwrap();
        heap.unborrow().unwrap();
        assert!(matches!(heap.resolve(first), Ok(HostValue::Undefined)));
        assert!(matches!(heap.unborrow(), Err(BridgeError::StackUnderflow)));
    }

    #[test]
    fn borrowed_stack_exhaustion() {
        let mut heap = table();
        for _ in 0..(HEAP_STACK_SLOTS - 1) {
            heap.borrow(HostValue::Null).unwrap();
        }
        assert!(matches!(
            heap.borrow(HostValue::Null),
            Err(BridgeError::StackExhausted { .. })
        ));
    }

    #[test]
    fn counters_track_churn() {
        let mut heap = table();
        let a = heap.allocate(HostValue::Null);
        let _b = heap.allocate(HostValue::Null);
        heap.release(a).unwrap();
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.free_count(), 1);
    }
}
