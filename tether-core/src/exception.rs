//! Capturing host failures for the guest.
//!
//! Host calls made on behalf of the guest must not unwind into guest frames.
//! A failure is instead turned into a heap value and its handle parked in a
//! single-slot register, from where the engine layer forwards it to the
//! guest's exception store export.

use crate::bridge::HostContext;
use crate::value::{HostError, HostValue};

/// Single-slot register holding the handle of the last captured failure.
#[derive(Debug, Default)]
pub struct ExceptionRegister {
    pending: Option<u32>,
}

impl ExceptionRegister {
    /// Create an empty register.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `handle`, returning whatever was pending before.
    pub fn store(&mut self, handle: u32) -> Option<u32> {
        self.pending.replace(handle)
    }

    /// Remove and return the pending handle.
    pub fn take(&mut self) -> Option<u32> {
        self.pending.take()
    }

    /// The pending handle, if any.
    pub fn peek(&self) -> Option<u32> {
        self.pending
    }

    /// Whether a failure is waiting to be delivered.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Run a host call, capturing a failure into the exception register.
///
/// Returns `None` when the call failed; the error is then reachable through the
/// register as a [`HostValue::Error`] handle.
pub fn handle_error<C, T, E, F>(cx: &mut C, f: F) -> Option<T>
where
    C: HostContext + ?Sized,
    E: Into<HostError>,
    F: FnOnce(&mut C) -> std::result::Result<T, E>,
{
    match f(cx) {
        Ok(value) => Some(value),
        Err(err) => {
            let err: HostError = err.into();
            tracing::debug!(error = %err, "host call failed, storing exception");

            let bridge = cx.bridge();
            let handle = bridge.heap_mut().allocate(HostValue::Error(err));
            if let Some(stale) = bridge.exceptions_mut().store(handle) {
                // Never delivered; nothing else references it.
                if let Err(e) = bridge.heap_mut().release(stale) {
                    tracing::warn!(handle = stale, error = %e, "failed to release stale exception");
                }
            }
            None
        }
    }
}
