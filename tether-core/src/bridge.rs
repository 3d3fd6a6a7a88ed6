//! Per-instance bridge state.

use crate::closure::Closure;
use crate::error::{BridgeError, Result};
use crate::exception::ExceptionRegister;
use crate::guest::GuestMemory;
use crate::heap::SlotTable;
use crate::value::HostValue;
use crate::view::ViewCache;

/// Everything the host keeps for one guest instance.
#[derive(Debug, Default)]
pub struct Bridge {
    heap: SlotTable<HostValue>,
    views: ViewCache,
    exceptions: ExceptionRegister,
}

impl Bridge {
    /// Fresh state: sentinels only, no cached views, nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// The host object table.
    pub fn heap(&self) -> &SlotTable<HostValue> {
        &self.heap
    }

    /// Mutable access to the host object table.
    pub fn heap_mut(&mut self) -> &mut SlotTable<HostValue> {
        &mut self.heap
    }

    /// The typed view cache.
    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    /// Mutable access to the typed view cache.
    pub fn views_mut(&mut self) -> &mut ViewCache {
        &mut self.views
    }

    /// The exception register.
    pub fn exceptions(&self) -> &ExceptionRegister {
        &self.exceptions
    }

    /// Mutable access to the exception register.
    pub fn exceptions_mut(&mut self) -> &mut ExceptionRegister {
        &mut self.exceptions
    }

    /// Store a value and hand out its handle.
    pub fn add(&mut self, value: impl Into<HostValue>) -> u32 {
        self.heap.allocate(value.into())
    }

    /// Borrow the value behind `handle`.
    pub fn get(&self, handle: u32) -> Result<&HostValue> {
        self.heap.resolve(handle)
    }

    /// Take the value behind `handle`, retiring the handle.
    pub fn take(&mut self, handle: u32) -> Result<HostValue> {
        self.heap.take(handle)
    }

    /// The closure behind `handle`.
    pub fn closure(&self, handle: u32) -> Result<Closure> {
        match self.heap.resolve(handle)? {
            HostValue::Closure(closure) => Ok(closure.clone()),
            other => Err(BridgeError::UnexpectedValue {
                handle,
                expected: "function",
                actual: other.kind(),
            }),
        }
    }
}

/// A guest whose host calls can reach the bridge state.
pub trait HostContext: GuestMemory {
    /// The bridge state for this instance.
    fn bridge(&mut self) -> &mut Bridge;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HEAP_RESERVED;

    #[test]
    fn add_and_take() {
        let mut bridge = Bridge::new();
        let h = bridge.add("value");
        assert_eq!(h, HEAP_RESERVED);
        assert_eq!(bridge.get(h).unwrap().as_str(), Some("value"));
        assert_eq!(bridge.take(h).unwrap().as_str(), Some("value"));
        assert!(bridge.get(h).is_err());
    }

    #[test]
    fn closure_lookup_checks_kind() {
        let mut bridge = Bridge::new();
        let f = bridge.add(Closure::repeatable(16, 0, 3, "invoke"));
        let n = bridge.add(1.0);
        assert_eq!(bridge.closure(f).unwrap().destructor(), 3);
        assert!(matches!(
            bridge.closure(n),
            Err(BridgeError::UnexpectedValue {
                expected: "function",
                actual: "number",
                ..
            })
        ));
    }
}
